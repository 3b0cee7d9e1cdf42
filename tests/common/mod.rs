#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use http_body_util::BodyExt;
use image::RgbImage;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use video_anomaly::analyzer::Analyzer;
use video_anomaly::config::Config;
use video_anomaly::frames::{FrameSource, SamplerError, VideoDecoder};
use video_anomaly::services::vision::{InferenceError, VisionClient, VisionRequest};
use video_anomaly::{AppState, build_app};

pub const BOUNDARY: &str = "x-test-boundary";

/// A fixed 90-frame, 30 fps clip. Files whose content is `corrupt` fail to open.
pub struct StubDecoder;

struct StubSource {
    position: u64,
}

#[async_trait]
impl FrameSource for StubSource {
    fn total_frames(&self) -> u64 {
        90
    }

    fn fps(&self) -> f64 {
        30.0
    }

    async fn next_frame(&mut self) -> Result<Option<RgbImage>, SamplerError> {
        if self.position >= 90 {
            return Ok(None);
        }
        self.position += 1;
        Ok(Some(RgbImage::from_pixel(8, 8, image::Rgb([40, 80, 120]))))
    }
}

#[async_trait]
impl VideoDecoder for StubDecoder {
    async fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, SamplerError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|_| SamplerError::Unreadable(path.display().to_string()))?;
        if data == b"corrupt" {
            return Err(SamplerError::Unreadable(path.display().to_string()));
        }
        Ok(Box::new(StubSource { position: 0 }))
    }
}

/// Replies with a canned text, or fails every call when `reply` is `None`.
pub struct StubClient {
    pub reply: Option<String>,
    pub calls: AtomicUsize,
    pub images_seen: AtomicUsize,
}

impl StubClient {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            images_seen: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
            images_seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VisionClient for StubClient {
    async fn complete(&self, request: &VisionRequest) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images_seen
            .store(request.image_count(), Ordering::SeqCst);
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(InferenceError::Api {
                status: 503,
                body: "service unavailable".to_string(),
            }),
        }
    }

    fn model_id(&self) -> &str {
        "stub-vision"
    }

    fn api_version(&self) -> &str {
        "2024-02-15-preview"
    }

    fn endpoint(&self) -> &str {
        "https://stub.openai.azure.com/"
    }
}

pub struct TestApp {
    pub router: Router,
    pub upload_dir: TempDir,
    pub demo_dir: TempDir,
}

fn test_config(upload_dir: &Path, demo_dir: &Path, max_upload_bytes: usize) -> Config {
    let upload = upload_dir.display().to_string();
    let demo = demo_dir.display().to_string();
    let limit = max_upload_bytes.to_string();
    Config::from_lookup(|key| match key {
        "UPLOAD_FOLDER" => Some(upload.clone()),
        "DEMO_FOLDER" => Some(demo.clone()),
        "MAX_CONTENT_LENGTH" => Some(limit.clone()),
        "AZURE_OPENAI_ENDPOINT" => Some("https://stub.openai.azure.com/".to_string()),
        "AZURE_OPENAI_API_KEY" => Some("test-key".to_string()),
        "AZURE_OPENAI_DEPLOYMENT_NAME" => Some("stub-vision".to_string()),
        _ => None,
    })
}

/// Build the full router with stubbed decoding and inference. `client: None`
/// mimics a server whose analyzer failed to initialise.
pub fn build_test_app(client: Option<Arc<StubClient>>) -> TestApp {
    build_test_app_with_limit(client, 1024 * 1024)
}

pub fn build_test_app_with_limit(
    client: Option<Arc<StubClient>>,
    max_upload_bytes: usize,
) -> TestApp {
    let upload_dir = tempfile::tempdir().unwrap();
    let demo_dir = tempfile::tempdir().unwrap();

    let state = AppState {
        config: test_config(upload_dir.path(), demo_dir.path(), max_upload_bytes),
        decoder: Arc::new(StubDecoder),
        analyzer: client.map(|c| Arc::new(Analyzer::new(c as Arc<dyn VisionClient>))),
    };

    TestApp {
        router: build_app(Arc::new(state)),
        upload_dir,
        demo_dir,
    }
}

/// Assemble a multipart body from text fields and an optional video file.
pub fn multipart_body(fields: &[(&str, &str)], video: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, data)) = video {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(app: Router, uri: &str, body: Vec<u8>) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, json: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}
