pub mod analyzer;
pub mod config;
pub mod constants;
pub mod ffmpeg;
pub mod frames;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod services;
pub mod storage;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tower_http::cors::CorsLayer;

use analyzer::Analyzer;
use config::Config;
use ffmpeg::FfmpegDecoder;
use frames::VideoDecoder;
use pipeline::Pipeline;
use services::error::ApiError;
use services::vision::AzureOpenAiClient;

/// Shared, request-independent dependencies.
///
/// `analyzer` is `None` when the inference client could not be configured;
/// the server keeps running and analysis routes answer 500.
pub struct AppState {
    pub config: Config,
    pub decoder: Arc<dyn VideoDecoder>,
    pub analyzer: Option<Arc<Analyzer>>,
}

impl AppState {
    /// Production wiring: ffmpeg decoding and the Azure OpenAI client.
    pub fn from_config(config: Config) -> Self {
        let analyzer = match AzureOpenAiClient::from_config(&config.azure) {
            Ok(client) => {
                log::info!(
                    "[startup] Azure AI analyzer initialized (endpoint {}, deployment {})",
                    config.azure.endpoint.as_deref().unwrap_or_default(),
                    config.azure.deployment_name()
                );
                Some(Arc::new(Analyzer::new(Arc::new(client))))
            }
            Err(e) => {
                log::error!("[startup] Failed to initialize Azure AI analyzer: {}", e);
                log::error!(
                    "[startup] Set AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_API_KEY and AZURE_OPENAI_DEPLOYMENT_NAME"
                );
                None
            }
        };

        Self {
            decoder: Arc::new(FfmpegDecoder::new(config.ffmpeg_threads)),
            analyzer,
            config,
        }
    }

    pub fn pipeline(&self) -> Result<Pipeline<'_>, ApiError> {
        let analyzer = self.analyzer.as_deref().ok_or_else(ApiError::not_configured)?;
        Ok(Pipeline {
            decoder: self.decoder.as_ref(),
            analyzer,
            max_frames: self.config.max_frames,
        })
    }
}

/// Build the application router with its middleware.
pub fn build_app(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;
    routes::build_routes()
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
