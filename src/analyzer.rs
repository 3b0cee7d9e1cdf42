//! Anomaly analysis over sampled frames.
//!
//! Builds the instruction + image payload, makes one inference call and
//! turns whatever comes back into an [`AnalysisResult`]. Replies that parse
//! as a JSON object are validated field by field; anything else goes through
//! a keyword fallback. A failed call becomes an error record, never an `Err`.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::constants::{
    ANALYSIS_MAX_TOKENS, ANALYSIS_TEMPERATURE, ANALYSIS_TOP_P, CONNECTION_TEST_MAX_TOKENS,
    MAX_FRAMES_FOR_ANALYSIS,
};
use crate::frames::{SampledFrame, VideoMetadata};
use crate::models::{AnalysisMetadata, AnalysisResult, AnomalyQuery, ConnectionReport};
use crate::services::vision::{ContentPart, VisionClient, VisionRequest};

const NO_ANOMALY: &str = "No anomaly detected";
const DEFAULT_DESCRIPTION: &str = "Analysis completed";
const DEFAULT_RECOMMENDATIONS: &str = "No special recommendations";
const FALLBACK_CONFIDENCE: f64 = 0.5;
const FALLBACK_RECOMMENDATIONS: &str = "Please review the analysis result manually";
const FALLBACK_NOTE: &str =
    "The model reply was not in the expected format; automatic fallback formatting was applied";
const FALLBACK_KEYWORDS: [&str; 2] = ["anomaly", "abnormal"];
const ERROR_ANOMALY_TYPE: &str = "Analysis failed";
const ERROR_RECOMMENDATIONS: &str = "Please check the configuration and retry";
const CONNECTION_TEST_PROMPT: &str = "Hello, please reply 'connection test succeeded'";

/// Reply keys the service owns; a model echoing them is ignored.
const RESERVED_KEYS: [&str; 3] = ["analysis_metadata", "analysis_note", "error"];

pub struct Analyzer {
    client: Arc<dyn VisionClient>,
}

impl Analyzer {
    pub fn new(client: Arc<dyn VisionClient>) -> Self {
        Self { client }
    }

    pub fn model_id(&self) -> &str {
        self.client.model_id()
    }

    /// Analyze up to [`MAX_FRAMES_FOR_ANALYSIS`] of `frames` for `query`.
    pub async fn analyze(
        &self,
        frames: &[SampledFrame],
        query: &AnomalyQuery,
        video: &VideoMetadata,
    ) -> AnalysisResult {
        let selected = &frames[..frames.len().min(MAX_FRAMES_FOR_ANALYSIS)];
        let request = build_request(query, video, selected);

        let mut result = match self.client.complete(&request).await {
            Ok(reply) => {
                log::info!(
                    "[analyzer] Received analysis result: {}...",
                    reply.chars().take(200).collect::<String>()
                );
                interpret_reply(&reply, query)
            }
            Err(e) => {
                log::error!("[analyzer] Error during video analysis: {}", e);
                error_result(&e.to_string())
            }
        };

        result.analysis_metadata = Some(AnalysisMetadata {
            frames_analyzed: selected.len(),
            total_frames_available: frames.len(),
            model_used: self.client.model_id().to_string(),
            api_version: self.client.api_version().to_string(),
        });
        result
    }

    /// One minimal text-only round trip.
    pub async fn test_connection(&self) -> ConnectionReport {
        let request = VisionRequest {
            parts: vec![ContentPart::Text(CONNECTION_TEST_PROMPT.to_string())],
            max_tokens: CONNECTION_TEST_MAX_TOKENS,
            temperature: ANALYSIS_TEMPERATURE,
            top_p: None,
        };
        let endpoint = self.client.endpoint().to_string();

        match self.client.complete(&request).await {
            Ok(reply) => ConnectionReport {
                success: true,
                response: Some(reply),
                error: None,
                model: Some(self.client.model_id().to_string()),
                endpoint,
            },
            Err(e) => {
                log::warn!("[analyzer] Connection test failed: {}", e);
                ConnectionReport {
                    success: false,
                    response: None,
                    error: Some(e.to_string()),
                    model: None,
                    endpoint,
                }
            }
        }
    }
}

pub fn build_prompt(query: &AnomalyQuery, video: &VideoMetadata) -> String {
    format!(
        r#"You are a professional surveillance video anomaly detection expert. Analyze the following video frame sequence and determine whether it contains the anomalous situations specified by the user.

**Target Anomaly Types to Detect:** {query}

**Video Information:**
- Total Frames: {total}
- Frame Rate: {fps:.2} FPS
- Video Duration: {duration:.2} seconds
- Analyzed Frames: {extracted}

**Analysis Requirements:**
1. Carefully observe the content of each frame
2. Identify whether any of the user-specified anomaly types are present
3. Evaluate the severity and confidence of each anomaly
4. Determine the specific time points at which anomalies occur

**Output Format (must be valid JSON):**
{{
    "has_anomaly": true/false,
    "confidence_score": 0.0-1.0,
    "anomaly_type": "detected anomaly type",
    "severity": "low/medium/high",
    "detected_frames": [1, 3, 5],
    "timestamps": [1.2, 3.4, 5.6],
    "description": "detailed description of the detected anomalies, including their manifestation, location and characteristics",
    "evidence": "specific visual evidence supporting the judgment",
    "recommendations": "recommended response measures",
    "false_positive_risk": 0.0-1.0
}}

If the anomaly description is written in another language, reply in that language.

Base the analysis strictly and objectively on the video frames."#,
        query = query,
        total = video.total_frames,
        fps = video.fps,
        duration = video.duration_secs,
        extracted = video.extracted_frames,
    )
}

/// Instruction first, then each frame followed by its caption.
pub fn build_request(
    query: &AnomalyQuery,
    video: &VideoMetadata,
    frames: &[SampledFrame],
) -> VisionRequest {
    let mut parts = Vec::with_capacity(1 + frames.len() * 2);
    parts.push(ContentPart::Text(build_prompt(query, video)));

    for (i, frame) in frames.iter().enumerate() {
        parts.push(ContentPart::Jpeg(frame.to_base64()));
        parts.push(ContentPart::Text(format!(
            "Frame {}/{} - Timestamp: {:.2}s",
            i + 1,
            frames.len(),
            frame.timestamp_secs
        )));
    }

    VisionRequest {
        parts,
        max_tokens: ANALYSIS_MAX_TOKENS,
        temperature: ANALYSIS_TEMPERATURE,
        top_p: Some(ANALYSIS_TOP_P),
    }
}

pub fn interpret_reply(reply: &str, query: &AnomalyQuery) -> AnalysisResult {
    match parse_structured(reply) {
        Some(object) => validate_reply(object),
        None => {
            log::warn!("[analyzer] Reply is not a JSON object, using fallback format");
            fallback_result(reply, query)
        }
    }
}

/// The reply as a JSON object. The text is parsed as is, so a reply
/// wrapped in a markdown code fence is not structured.
fn parse_structured(reply: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(reply).ok()? {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

/// Fill defaults and repair types on a parsed reply.
pub fn validate_reply(mut object: Map<String, Value>) -> AnalysisResult {
    let mut take = |key: &str| object.remove(key).filter(|v| !v.is_null());

    let has_anomaly = take("has_anomaly").is_some_and(|v| truthy(&v));
    let confidence_score = take("confidence_score")
        .and_then(|v| as_f64(&v))
        .map(clamp_unit)
        .unwrap_or(0.0);
    let anomaly_type = take("anomaly_type")
        .map(into_text)
        .unwrap_or_else(|| NO_ANOMALY.to_string());
    let severity = take("severity").map(into_text);
    let detected_frames = take("detected_frames").map(frame_indices).unwrap_or_default();
    let timestamps = take("timestamps").map(seconds).unwrap_or_default();
    let description = take("description")
        .map(into_text)
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
    let evidence = take("evidence").map(into_text);
    let recommendations = take("recommendations")
        .map(into_text)
        .unwrap_or_else(|| DEFAULT_RECOMMENDATIONS.to_string());
    let false_positive_risk = take("false_positive_risk").and_then(|v| as_f64(&v));

    for key in RESERVED_KEYS {
        object.remove(key);
    }

    AnalysisResult {
        has_anomaly,
        confidence_score,
        anomaly_type,
        severity,
        detected_frames,
        timestamps,
        description,
        evidence,
        recommendations: Some(recommendations),
        false_positive_risk,
        analysis_note: None,
        error: None,
        analysis_metadata: None,
        extra: object,
    }
}

/// Best-effort record for a reply that is not structured.
pub fn fallback_result(reply: &str, query: &AnomalyQuery) -> AnalysisResult {
    let lowered = reply.to_lowercase();
    AnalysisResult {
        has_anomaly: FALLBACK_KEYWORDS.iter().any(|k| lowered.contains(k)),
        confidence_score: FALLBACK_CONFIDENCE,
        anomaly_type: query.as_str().to_string(),
        severity: None,
        detected_frames: Vec::new(),
        timestamps: Vec::new(),
        description: reply.to_string(),
        evidence: None,
        recommendations: Some(FALLBACK_RECOMMENDATIONS.to_string()),
        false_positive_risk: None,
        analysis_note: Some(FALLBACK_NOTE.to_string()),
        error: None,
        analysis_metadata: None,
        extra: Map::new(),
    }
}

pub fn error_result(message: &str) -> AnalysisResult {
    AnalysisResult {
        has_anomaly: false,
        confidence_score: 0.0,
        anomaly_type: ERROR_ANOMALY_TYPE.to_string(),
        severity: None,
        detected_frames: Vec::new(),
        timestamps: Vec::new(),
        description: format!("An error occurred during analysis: {}", message),
        evidence: None,
        recommendations: Some(ERROR_RECOMMENDATIONS.to_string()),
        false_positive_risk: None,
        analysis_note: None,
        error: Some(message.to_string()),
        analysis_metadata: None,
        extra: Map::new(),
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Numbers, or strings holding a number.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        // any non-empty string counts, "false" included
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Null => false,
    }
}

fn into_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Non-array values become empty; non-index elements are dropped.
fn frame_indices(value: Value) -> Vec<u64> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            item.as_u64().or_else(|| {
                item.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
        })
        .collect()
}

fn seconds(value: Value) -> Vec<f64> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items.iter().filter_map(Value::as_f64).collect()
}
