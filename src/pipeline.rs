//! Video → frames → analysis, for uploads and demo assets alike.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::analyzer::Analyzer;
use crate::frames::{SamplerError, VideoDecoder, VideoMetadata, sample_video};
use crate::models::{AnalysisResult, AnomalyQuery};
use crate::storage;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Sampler(#[from] SamplerError),
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub video_info: VideoMetadata,
    pub analysis: AnalysisResult,
    pub prompt_used: String,
}

pub struct Pipeline<'a> {
    pub decoder: &'a dyn VideoDecoder,
    pub analyzer: &'a Analyzer,
    pub max_frames: usize,
}

impl Pipeline<'_> {
    /// Sample `source` and analyze it for `query`.
    ///
    /// Unless `retain_source` is set the file is deleted afterwards, on
    /// success and on failure.
    pub async fn run(
        &self,
        source: &Path,
        query: &AnomalyQuery,
        retain_source: bool,
    ) -> Result<AnalysisReport, PipelineError> {
        let outcome = self.analyze_file(source, query).await;

        if !retain_source {
            storage::remove_best_effort(source).await;
        }
        outcome
    }

    async fn analyze_file(
        &self,
        source: &Path,
        query: &AnomalyQuery,
    ) -> Result<AnalysisReport, PipelineError> {
        log::info!("[pipeline] Processing video: {}", source.display());
        let (frames, video_info) = sample_video(self.decoder, source, self.max_frames).await?;

        log::info!(
            "[pipeline] Starting analysis of {} frames with {}",
            frames.len(),
            self.analyzer.model_id()
        );
        let analysis = self.analyzer.analyze(&frames, query, &video_info).await;

        Ok(AnalysisReport {
            video_info,
            analysis,
            prompt_used: query.as_str().to_string(),
        })
    }
}
