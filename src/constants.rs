//! Application constants

/// Service name reported by the health endpoint
pub const SERVICE_NAME: &str = "video-anomaly-detector";

/// Default upload ceiling (50 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Container formats accepted for upload and demo analysis
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "webm"];

/// Default number of frames the sampler keeps per video
pub const DEFAULT_MAX_FRAMES: usize = 10;

/// Hard ceiling on frames attached to a single inference request
pub const MAX_FRAMES_FOR_ANALYSIS: usize = 10;

/// JPEG quality for sampled frames
pub const JPEG_QUALITY: u8 = 95;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_UPLOAD_FOLDER: &str = "uploads";
pub const DEFAULT_DEMO_FOLDER: &str = "demo_videos";
pub const DEFAULT_FFMPEG_THREADS: usize = 1;

pub const DEFAULT_DEPLOYMENT_NAME: &str = "gpt-4-vision-preview";
pub const DEFAULT_API_VERSION: &str = "2024-02-15-preview";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Sampling settings for the analysis request. Kept low so repeated runs
/// over similar input converge on similar output.
pub const ANALYSIS_MAX_TOKENS: u32 = 2000;
pub const ANALYSIS_TEMPERATURE: f32 = 0.1;
pub const ANALYSIS_TOP_P: f32 = 0.9;

pub const CONNECTION_TEST_MAX_TOKENS: u32 = 50;

/// Endpoint values shipped in the sample `.env` that must not be treated as real
pub const PLACEHOLDER_ENDPOINTS: [&str; 2] =
    ["your_endpoint_here", "your-resource-name.openai.azure.com"];
