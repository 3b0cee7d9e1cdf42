use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use serde_json::json;

use crate::AppState;
use crate::constants::SERVICE_NAME;
use crate::models::ConnectionReport;
use crate::services::error::ApiError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/test-connection", get(test_connection))
}

#[derive(Serialize)]
struct ConfigurationStatus {
    azure_openai_endpoint: bool,
    azure_openai_api_key: bool,
    azure_openai_deployment: bool,
    ai_analyzer_initialized: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    configuration: ConfigurationStatus,
    message: &'static str,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let azure = &state.config.azure;
    let initialized = state.analyzer.is_some();

    Json(HealthResponse {
        status: if initialized { "healthy" } else { "degraded" },
        service: SERVICE_NAME,
        configuration: ConfigurationStatus {
            azure_openai_endpoint: azure.endpoint.is_some(),
            azure_openai_api_key: azure.api_key.is_some(),
            azure_openai_deployment: azure.deployment.is_some(),
            ai_analyzer_initialized: initialized,
        },
        message: if initialized {
            "Service is ready"
        } else {
            "Azure OpenAI configuration incomplete"
        },
    })
}

/// Round-trip a trivial prompt through the inference service.
async fn test_connection(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConnectionReport>, ApiError> {
    let Some(analyzer) = state.analyzer.as_ref() else {
        return Err(ApiError::internal("Azure AI analyzer not initialized")
            .with("success", json!(false))
            .with(
                "help",
                json!("Set AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_API_KEY and AZURE_OPENAI_DEPLOYMENT_NAME"),
            ));
    };

    let report = analyzer.test_connection().await;
    if !report.success {
        log::warn!(
            "[health] Connection test failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(Json(report))
}
