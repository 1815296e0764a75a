//! Common types and utilities for the video reconciliation backend
//!
//! Shared between the analysis adapters, the pipeline orchestrator, the job
//! store and the API server:
//! - Report building blocks (transcript segments, visual scenes, comparison
//!   verdicts)
//! - Job status enumeration
//! - Link normalization for share-style video URLs
//! - Process-wide configuration loaded once at startup

use serde::{Deserialize, Serialize};

pub mod config;
pub mod link;

pub use config::AppConfig;
pub use link::normalize_source_url;

/// Status of an analysis job
///
/// `Processing` is the initial state; `Completed` and `Failed` are terminal.
/// The job store enforces that terminal states are never overwritten.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Pipeline run is in flight
    Processing,
    /// Run finished and a report was persisted
    Completed,
    /// Run aborted; no report exists
    Failed,
}

impl JobStatus {
    /// Database column representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the database column representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One timed fragment of the audio transcription
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptSegment {
    /// Segment start, formatted `H:MM:SS`
    pub start: String,
    /// Segment end, formatted `H:MM:SS`
    pub end: String,
    /// Spoken text
    pub text: String,
}

/// One time-bounded visual description produced by the visual analysis stage
///
/// The upstream service is expected to emit non-overlapping scenes with
/// monotonically increasing start times, but that is not enforced here;
/// downstream consumers tolerate violations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisualScene {
    /// Scene start in whole seconds
    pub start_time: i64,
    /// Scene end in whole seconds
    pub end_time: i64,
    /// Visual description of the interval
    pub visual: String,
}

/// A spoken-versus-shown discrepancy found by the comparison step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mismatch {
    /// Timestamp of the discrepancy
    pub time: String,
    /// What was said versus what was shown
    pub detail: String,
}

/// An on-screen spelling error found by the comparison step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpellingError {
    /// Timestamp where the word appears
    pub time: String,
    /// The misspelled word
    pub word: String,
}

/// Verdict of the language-model comparison step
///
/// The comparison step never fails: when the model's reply does not parse as
/// the structured shape, the literal text is carried in `Raw` so the report is
/// still complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ComparisonResult {
    /// Parsed verdict
    Structured {
        mismatches: Vec<Mismatch>,
        spelling_errors: Vec<SpellingError>,
    },
    /// Unparsable model output, passed through verbatim
    Raw { raw_output: String },
}

impl ComparisonResult {
    /// Degraded result used when no language model is configured
    #[must_use]
    pub fn not_configured() -> Self {
        Self::Raw {
            raw_output: "LLM not configured; cannot process.".to_string(),
        }
    }
}

/// The final report persisted for a completed job
///
/// Assembled once, atomically, at the end of a successful pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Report {
    /// Job this report belongs to
    pub job_id: i64,
    /// Canonical (normalized) input reference
    pub input: String,
    /// Timed transcript segments, chronological
    pub transcription: Vec<TranscriptSegment>,
    /// Visual scene descriptions, chronological
    pub visual_analysis: Vec<VisualScene>,
    /// Reconciliation verdict
    pub comparison: ComparisonResult,
}

/// Format a second count as `H:MM:SS` (hours unpadded)
#[must_use]
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours}:{minutes:02}:{secs:02}")
}
