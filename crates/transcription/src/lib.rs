//! Transcription adapter
//!
//! Submits a video reference to the external speech-to-text service and
//! returns the timed transcript segments. The remote service performs
//! transcription and segmentation server-side; this adapter validates the
//! response shape, converts upstream second offsets to `H:MM:SS` timestamps
//! and persists the raw response as a debugging artifact.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use video_recon_common::config::TranscriptionConfig;
use video_recon_common::{format_timestamp, TranscriptSegment};

/// Transcription stage errors; all fatal to the enclosing pipeline run
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// The service answered with a non-success status
    #[error("transcription rejected upstream: status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Network failure or timeout before a response arrived
    #[error("transcription service unavailable: {0}")]
    Unavailable(String),

    /// Response arrived but did not have the expected segment shape
    #[error("malformed transcription response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    segments: Vec<RawSegment>,
}

/// Client for the external speech-to-text HTTP service
#[derive(Debug, Clone)]
pub struct TranscriptionClient {
    config: TranscriptionConfig,
    reports_dir: PathBuf,
}

impl TranscriptionClient {
    /// Create a client from service settings and the artifact directory
    #[must_use]
    pub fn new(config: TranscriptionConfig, reports_dir: &Path) -> Self {
        Self {
            config,
            reports_dir: reports_dir.to_path_buf(),
        }
    }

    /// Transcribe a video reference into timed segments
    ///
    /// The request is bounded by the configured timeout (the remote operation
    /// is long-running and its latency is not under this system's control).
    /// No partial transcript is ever produced.
    pub async fn transcribe(
        &self,
        video_url: &str,
        job_id: i64,
    ) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        info!(job_id, "submitting transcription request");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| TranscriptionError::Unavailable(e.to_string()))?;

        let response = client
            .post(format!(
                "{}/transcribe",
                self.config.base_url.trim_end_matches('/')
            ))
            .json(&serde_json::json!({ "video_url": video_url }))
            .send()
            .await
            .map_err(|e| TranscriptionError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::Unavailable(e.to_string()))?;

        // Side-channel artifact for debugging, kept whether or not the run
        // succeeds downstream.
        self.persist_raw_response(job_id, &body).await;

        if !status.is_success() {
            return Err(TranscriptionError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let segments = parse_segments(&body)?;
        info!(job_id, segments = segments.len(), "transcription complete");
        Ok(segments)
    }

    async fn persist_raw_response(&self, job_id: i64, body: &str) {
        let path = self.reports_dir.join(format!("{job_id}_transcript.json"));
        if let Err(e) = tokio::fs::create_dir_all(&self.reports_dir).await {
            warn!("failed to create reports dir: {}", e);
            return;
        }
        match tokio::fs::write(&path, body).await {
            Ok(()) => debug!("raw transcript saved to {}", path.display()),
            Err(e) => warn!("failed to persist raw transcript: {}", e),
        }
    }
}

/// Validate the response shape and convert to timestamped segments
fn parse_segments(body: &str) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
    let response: TranscribeResponse =
        serde_json::from_str(body).map_err(|e| TranscriptionError::Malformed(e.to_string()))?;

    Ok(response
        .segments
        .into_iter()
        .map(|seg| TranscriptSegment {
            start: format_timestamp(seg.start),
            end: format_timestamp(seg.end),
            text: seg.text,
        })
        .collect())
}
