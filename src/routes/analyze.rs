use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Multipart, State,
        multipart::MultipartError,
        rejection::JsonRejection,
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::models::AnomalyQuery;
use crate::pipeline::AnalysisReport;
use crate::services::error::{ApiError, LogErr};
use crate::storage::{self, StorageError};

const NO_VIDEO: &str = "No video file selected";
const NO_PROMPT: &str = "Please enter the anomaly types to detect";
const UNSUPPORTED_FORMAT: &str =
    "Unsupported file format. Please upload MP4, AVI, MOV, MKV or WEBM video files";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(upload_video))
        .route("/analyze-demo", post(analyze_demo))
        .route("/demo-videos", get(list_demo_videos))
}

#[derive(Serialize)]
struct AnalysisResponse {
    success: bool,
    #[serde(flatten)]
    report: AnalysisReport,
}

impl From<AnalysisReport> for AnalysisResponse {
    fn from(report: AnalysisReport) -> Self {
        Self {
            success: true,
            report,
        }
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    log::warn!("[upload] Multipart error: {}", e);
    ApiError::new(e.status(), format!("Upload failed: {}", e.body_text()))
}

/// Upload a video (multipart field `video`) and analyze it for the
/// anomalies described in `anomaly_prompt`. The upload is always deleted.
async fn upload_video(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let mut video: Option<(String, Bytes)> = None;
    let mut prompt = String::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                video = Some((filename, data));
            }
            "anomaly_prompt" => {
                prompt = field.text().await.map_err(multipart_error)?;
            }
            _ => {}
        }
    }

    let (filename, data) = video
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request(NO_VIDEO))?;
    let query = AnomalyQuery::parse(&prompt).ok_or_else(|| ApiError::bad_request(NO_PROMPT))?;
    if !storage::has_allowed_extension(&filename) {
        return Err(ApiError::bad_request(UNSUPPORTED_FORMAT));
    }

    let pipeline = state.pipeline()?;
    let path = match storage::save_upload(&state.config.upload_dir, &filename, &data).await {
        Ok(path) => path,
        Err(StorageError::InvalidName(_)) => return Err(ApiError::bad_request(UNSUPPORTED_FORMAT)),
        Err(e) => return Err(e).log_500("Failed to store upload"),
    };

    log::info!("[upload] Analyzing {} for: {}", filename, query);
    let report = pipeline
        .run(&path, &query, false)
        .await
        .log_500("Video processing failed")?;

    Ok(Json(report.into()))
}

#[derive(Debug, Deserialize)]
struct DemoRequest {
    #[serde(default)]
    video_name: String,
    #[serde(default)]
    anomaly_prompt: String,
}

/// Analyze one of the bundled demo videos. The file is left in place.
async fn analyze_demo(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DemoRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::new(e.status(), e.body_text()))?;

    if req.video_name.trim().is_empty() {
        return Err(ApiError::bad_request("Please select a demo video"));
    }
    let query =
        AnomalyQuery::parse(&req.anomaly_prompt).ok_or_else(|| ApiError::bad_request(NO_PROMPT))?;

    let path = match storage::resolve_demo(&state.config.demo_dir, &req.video_name).await {
        Ok(path) => path,
        Err(StorageError::InvalidName(name)) => {
            return Err(ApiError::bad_request(format!("Invalid demo video name: {}", name)));
        }
        Err(StorageError::NotFound(name)) => {
            return Err(ApiError::not_found(format!("Demo video not found: {}", name)));
        }
        Err(e) => return Err(e).log_500("Failed to locate demo video"),
    };

    let pipeline = state.pipeline()?;
    log::info!("[demo] Analyzing {} for: {}", req.video_name, query);
    let report = pipeline
        .run(&path, &query, true)
        .await
        .log_500("Video processing failed")?;

    Ok(Json(report.into()))
}

#[derive(Serialize)]
struct DemoVideosResponse {
    videos: Vec<String>,
}

async fn list_demo_videos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DemoVideosResponse>, ApiError> {
    let videos = storage::list_demo_videos(&state.config.demo_dir)
        .await
        .log_500("Failed to list demo videos")?;
    Ok(Json(DemoVideosResponse { videos }))
}
