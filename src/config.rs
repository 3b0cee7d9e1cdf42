//! Environment-driven configuration.
//!
//! Read once at startup. Numeric values that fail to parse, or are zero,
//! fall back to their defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::constants::{
    DEFAULT_API_VERSION, DEFAULT_DEMO_FOLDER, DEFAULT_DEPLOYMENT_NAME, DEFAULT_FFMPEG_THREADS,
    DEFAULT_MAX_FRAMES, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_UPLOAD_FOLDER, PLACEHOLDER_ENDPOINTS,
};

/// Raised when the inference client cannot be built from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{0} still holds a placeholder value")]
    Placeholder(&'static str),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Connection settings for the Azure OpenAI deployment.
///
/// Values are kept exactly as found so the health endpoint can report
/// which ones were supplied.
#[derive(Debug, Clone, Default)]
pub struct AzureConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub deployment: Option<String>,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl AzureConfig {
    pub fn deployment_name(&self) -> &str {
        self.deployment.as_deref().unwrap_or(DEFAULT_DEPLOYMENT_NAME)
    }

    /// Endpoint, rejecting unset and template values.
    pub fn validated_endpoint(&self) -> Result<&str, ConfigError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or(ConfigError::Missing("AZURE_OPENAI_ENDPOINT"))?;
        let bare = endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        if PLACEHOLDER_ENDPOINTS.contains(&bare) {
            return Err(ConfigError::Placeholder("AZURE_OPENAI_ENDPOINT"));
        }
        Ok(endpoint)
    }

    pub fn validated_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::Missing("AZURE_OPENAI_API_KEY"))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub upload_dir: PathBuf,
    pub demo_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub max_frames: usize,
    pub ffmpeg_threads: usize,
    pub azure: AzureConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            port: parse_positive(get("PORT"), DEFAULT_PORT),
            upload_dir: get("UPLOAD_FOLDER")
                .unwrap_or_else(|| DEFAULT_UPLOAD_FOLDER.to_string())
                .into(),
            demo_dir: get("DEMO_FOLDER")
                .unwrap_or_else(|| DEFAULT_DEMO_FOLDER.to_string())
                .into(),
            max_upload_bytes: parse_positive(get("MAX_CONTENT_LENGTH"), DEFAULT_MAX_UPLOAD_BYTES),
            max_frames: parse_positive(get("MAX_FRAMES"), DEFAULT_MAX_FRAMES),
            ffmpeg_threads: parse_positive(get("FFMPEG_THREADS"), DEFAULT_FFMPEG_THREADS),
            azure: AzureConfig {
                endpoint: get("AZURE_OPENAI_ENDPOINT"),
                api_key: get("AZURE_OPENAI_API_KEY"),
                deployment: get("AZURE_OPENAI_DEPLOYMENT_NAME"),
                api_version: get("AZURE_OPENAI_API_VERSION")
                    .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
                timeout_secs: parse_positive(
                    get("AZURE_OPENAI_TIMEOUT_SECS"),
                    DEFAULT_REQUEST_TIMEOUT_SECS,
                ),
            },
        }
    }
}

fn parse_positive<T>(value: Option<String>, default: T) -> T
where
    T: FromStr + PartialOrd + Default,
{
    value
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default)
}
