//! Vision-language inference client.
//!
//! The analyzer only needs "request in, reply text out"; [`VisionClient`]
//! is that seam. [`AzureOpenAiClient`] implements it against an Azure OpenAI
//! chat-completions deployment.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::{AzureConfig, ConfigError};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("inference service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected response envelope: {0}")]
    MalformedEnvelope(String),
    #[error("inference service reply has no content")]
    EmptyReply,
}

/// One element of the ordered message content.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    /// Base64-encoded JPEG
    Jpeg(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisionRequest {
    pub parts: Vec<ContentPart>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
}

impl VisionRequest {
    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, ContentPart::Jpeg(_)))
            .count()
    }
}

#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Send one request and return the model's reply text.
    async fn complete(&self, request: &VisionRequest) -> Result<String, InferenceError>;

    /// Model or deployment identifier used for calls.
    fn model_id(&self) -> &str;

    fn api_version(&self) -> &str;

    fn endpoint(&self) -> &str;
}

#[derive(Clone)]
pub struct AzureOpenAiClient {
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
    http: Client,
}

impl std::fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl AzureOpenAiClient {
    pub fn from_config(config: &AzureConfig) -> Result<Self, ConfigError> {
        let endpoint = config.validated_endpoint()?;
        let api_key = config.validated_api_key()?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            deployment: config.deployment_name().to_string(),
            api_version: config.api_version.clone(),
            http,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }
}

#[async_trait]
impl VisionClient for AzureOpenAiClient {
    async fn complete(&self, request: &VisionRequest) -> Result<String, InferenceError> {
        let resp = self
            .http
            .post(self.completions_url())
            .header("api-key", &self.api_key)
            .json(&chat_body(request))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = resp.json().await?;
        reply_text(completion)
    }

    fn model_id(&self) -> &str {
        &self.deployment
    }

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Chat-completions request body: one user message carrying every part in order.
pub fn chat_body(request: &VisionRequest) -> Value {
    let content: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({ "type": "text", "text": text }),
            ContentPart::Jpeg(data) => json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:image/jpeg;base64,{}", data),
                    "detail": "high"
                }
            }),
        })
        .collect();

    // A lone text part goes out as a plain string
    let content = match request.parts.as_slice() {
        [ContentPart::Text(text)] => Value::String(text.clone()),
        _ => Value::Array(content),
    };

    let mut body = json!({
        "messages": [{ "role": "user", "content": content }],
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    });
    if let Some(top_p) = request.top_p {
        body["top_p"] = json!(top_p);
    }
    body
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn reply_text(completion: ChatCompletion) -> Result<String, InferenceError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::MalformedEnvelope("no choices".into()))?;
    // empty content is still a reply
    choice.message.content.ok_or(InferenceError::EmptyReply)
}
