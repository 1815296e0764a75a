//! Request and response types for API endpoints

use serde::{Deserialize, Serialize};

/// Where the video to analyze comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaSource {
    /// Remote video URL, including Google Drive share links
    Url { location: String },
    /// Server-visible path of a previously uploaded file
    Upload { location: String },
}

impl MediaSource {
    /// The reference handed to the pipeline
    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::Url { location } | Self::Upload { location } => location,
        }
    }
}

/// Body of `POST /api/v1/analyze`
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub source: MediaSource,
}

/// Accepted-analysis response
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub job_id: i64,
    pub status: String,
}

/// Job status response; `result` is present once the job is terminal
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// One entry in the caller's job history
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: i64,
    pub input: String,
    pub status: String,
    pub created_at: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
