use std::sync::Arc;

use video_anomaly::config::Config;
use video_anomaly::{AppState, build_app, logging};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    logging::init();

    let config = Config::from_env();
    if let Err(e) = tokio::fs::create_dir_all(&config.upload_dir).await {
        log::error!(
            "[startup] Failed to create upload folder {:?}: {}",
            config.upload_dir,
            e
        );
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::from_config(config));
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", addr, e));

    log::info!("[startup] Listening on http://{}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        log::error!("[startup] Server failed: {}", e);
    }
}
