//! Shared data models used across modules

use serde::Serialize;
use serde_json::{Map, Value};

/// Free-text description of the anomalies a caller is looking for.
/// Never blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnomalyQuery(String);

impl AnomalyQuery {
    /// Trims `raw`; `None` when nothing is left.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AnomalyQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Details of the inference call attached to every result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisMetadata {
    pub frames_analyzed: usize,
    pub total_frames_available: usize,
    pub model_used: String,
    pub api_version: String,
}

/// Normalized anomaly report.
///
/// Built from a validated model reply, a keyword fallback when the reply
/// was not structured, or an error record when the call failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub has_anomaly: bool,
    /// Always within `[0.0, 1.0]`.
    pub confidence_score: f64,
    pub anomaly_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    pub detected_frames: Vec<u64>,
    pub timestamps: Vec<f64>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub false_positive_risk: Option<f64>,
    /// Set when the fallback interpretation was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_note: Option<String>,
    /// Set when the inference call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_metadata: Option<AnalysisMetadata>,
    /// Keys the model returned beyond the known schema.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of a minimal round trip to the inference service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub endpoint: String,
}
