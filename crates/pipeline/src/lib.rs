//! Analysis pipeline orchestrator
//!
//! Runs one job end to end: normalize the source link, transcribe audio and
//! describe visuals concurrently, repair malformed visual output, reconcile
//! both streams through the comparison engine and persist the final report.
//! Either adapter failing fails the whole run; there are no partial reports.

pub mod worker;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use video_recon_common::link::normalize_source_url;
use video_recon_common::{Report, TranscriptSegment, VisualScene};
use video_recon_comparison::ComparisonEngine;
use video_recon_transcription::{TranscriptionClient, TranscriptionError};
use video_recon_visual::{VisualAnalysis, VisualClient, VisualError};

/// Fatal pipeline errors, tagged with the stage that produced them
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transcription stage failed: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("visual stage failed: {0}")]
    Visual(#[from] VisualError),

    #[error("failed to persist report: {0}")]
    Persist(#[from] std::io::Error),
}

/// Seam for the transcription stage; stubbed in tests
#[async_trait]
pub trait TranscribeStage: Send + Sync {
    async fn transcribe(
        &self,
        video_url: &str,
        job_id: i64,
    ) -> Result<Vec<TranscriptSegment>, TranscriptionError>;
}

#[async_trait]
impl TranscribeStage for TranscriptionClient {
    async fn transcribe(
        &self,
        video_url: &str,
        job_id: i64,
    ) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        TranscriptionClient::transcribe(self, video_url, job_id).await
    }
}

/// Seam for the visual stage; stubbed in tests
#[async_trait]
pub trait VisualStage: Send + Sync {
    async fn analyze(&self, video_url: &str) -> Result<VisualAnalysis, VisualError>;
}

#[async_trait]
impl VisualStage for VisualClient {
    async fn analyze(&self, video_url: &str) -> Result<VisualAnalysis, VisualError> {
        VisualClient::analyze(self, video_url).await
    }
}

/// Orchestrates one analysis run across the adapters
pub struct Pipeline {
    transcriber: Arc<dyn TranscribeStage>,
    visual: Arc<dyn VisualStage>,
    comparison: ComparisonEngine,
    reports_dir: PathBuf,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn TranscribeStage>,
        visual: Arc<dyn VisualStage>,
        comparison: ComparisonEngine,
        reports_dir: &Path,
    ) -> Self {
        Self {
            transcriber,
            visual,
            comparison,
            reports_dir: reports_dir.to_path_buf(),
        }
    }

    /// Run the full pipeline for one job and persist its report
    ///
    /// Returns the assembled report and the path it was written to.
    pub async fn run(
        &self,
        job_id: i64,
        source: &str,
    ) -> Result<(Report, PathBuf), PipelineError> {
        let video_url = normalize_source_url(source);
        info!(job_id, "pipeline run started");

        // The two adapters are independent; the visual pass gets its own
        // task so both are in flight before either is awaited.
        let visual_task = {
            let visual = Arc::clone(&self.visual);
            let url = video_url.clone();
            tokio::spawn(async move { visual.analyze(&url).await })
        };
        let (transcript, visual) = tokio::join!(
            self.transcriber.transcribe(&video_url, job_id),
            visual_task,
        );
        let transcript = transcript?;
        let visual = visual
            .map_err(|e| VisualError::Unavailable(format!("visual task aborted: {e}")))??;

        self.persist_visual(job_id, &visual).await;

        let scenes = match visual {
            VisualAnalysis::Scenes(scenes) => scenes,
            VisualAnalysis::Degraded { raw_output } => {
                warn!(job_id, "visual output malformed, attempting repair");
                self.comparison.repair_scenes(&raw_output).await
            }
        };

        self.persist_combined(job_id, &transcript, &scenes).await;

        let comparison = self.comparison.compare(&transcript, &scenes).await;

        let report = Report {
            job_id,
            input: video_url.clone(),
            transcription: transcript,
            visual_analysis: scenes,
            comparison,
        };

        let path = self.persist_report(&report).await?;
        info!(job_id, path = %path.display(), "pipeline run finished");
        Ok((report, path))
    }

    /// Raw visual outcome as its own artifact, mirroring the transcript
    /// side-channel; best effort
    async fn persist_visual(&self, job_id: i64, visual: &VisualAnalysis) {
        let body = match visual {
            VisualAnalysis::Scenes(scenes) => {
                match serde_json::to_string_pretty(&serde_json::json!({ "scenes": scenes })) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("failed to serialize visual artifact: {}", e);
                        return;
                    }
                }
            }
            VisualAnalysis::Degraded { raw_output } => raw_output.clone(),
        };
        let path = self.reports_dir.join(format!("{job_id}_visual.json"));
        if let Err(e) = tokio::fs::create_dir_all(&self.reports_dir).await {
            warn!("failed to create reports dir: {}", e);
            return;
        }
        if let Err(e) = tokio::fs::write(&path, body).await {
            warn!("failed to persist visual artifact: {}", e);
        }
    }

    /// Intermediate artifact with both streams side by side; best effort
    async fn persist_combined(
        &self,
        job_id: i64,
        transcript: &[TranscriptSegment],
        scenes: &[VisualScene],
    ) {
        let blob = serde_json::json!({
            "transcription": transcript,
            "visual_analysis": scenes,
        });
        let path = self.reports_dir.join(format!("{job_id}_combined.json"));
        if let Err(e) = tokio::fs::create_dir_all(&self.reports_dir).await {
            warn!("failed to create reports dir: {}", e);
            return;
        }
        match serde_json::to_string_pretty(&blob) {
            Ok(body) => {
                if let Err(e) = tokio::fs::write(&path, body).await {
                    warn!("failed to persist combined artifact: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize combined artifact: {}", e),
        }
    }

    /// Write the final report atomically via a temp file and rename, so a
    /// download can never observe a half-written report.
    async fn persist_report(&self, report: &Report) -> Result<PathBuf, PipelineError> {
        tokio::fs::create_dir_all(&self.reports_dir).await?;

        let body = serde_json::to_string_pretty(report)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let final_path = self
            .reports_dir
            .join(format!("{}_final_report.json", report.job_id));
        let tmp_path = self
            .reports_dir
            .join(format!("{}_final_report.json.tmp", report.job_id));

        tokio::fs::write(&tmp_path, body).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        debug!("report written to {}", final_path.display());
        Ok(final_path)
    }

    /// Path where a completed job's report lives
    #[must_use]
    pub fn report_path(&self, job_id: i64) -> PathBuf {
        self.reports_dir.join(format!("{job_id}_final_report.json"))
    }
}
