//! Language-model comparison engine and self-healing repair step
//!
//! The comparison engine reconciles the transcript with the visual scene
//! descriptions through a single text-generation call and parses the model's
//! structured verdict. It never fails: unparsable output degrades to a raw
//! passthrough. The repair step re-submits malformed visual output with a
//! "fix this JSON" instruction; when repair fails too the pipeline continues
//! with an empty scene list.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use video_recon_common::config::LlmConfig;
use video_recon_common::{ComparisonResult, TranscriptSegment, VisualScene};

/// Text-generation service errors
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network failure or timeout before a response arrived
    #[error("text generation service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a non-success status
    #[error("text generation rejected: status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Seam for the text-generation collaborator; stubbed in tests
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate free text for a prompt (non-streaming)
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// HTTP client for the external text-generation service
#[derive(Debug, Clone)]
pub struct HttpTextGenerator {
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

impl HttpTextGenerator {
    /// Build a generator from configuration; `None` when no API key is
    /// present, so the absence is decided once at startup rather than per
    /// call.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        let response = client
            .post(format!("{}/generate", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Rejected {
                status: status.as_u16(),
                body: format!("undecodable response ({e}): {body}"),
            })?;
        Ok(decoded.text)
    }
}

/// Reconciles transcript and scenes through one language-model call
#[derive(Clone)]
pub struct ComparisonEngine {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl ComparisonEngine {
    /// Engine backed by a generator
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// Disabled stub used when no credential is configured at startup
    #[must_use]
    pub fn disabled() -> Self {
        Self { generator: None }
    }

    /// Whether a language model is available
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    /// Compare spoken content against shown content
    ///
    /// Always returns a result: structured when the model's reply parses,
    /// otherwise the literal reply text.
    pub async fn compare(
        &self,
        transcript: &[TranscriptSegment],
        scenes: &[VisualScene],
    ) -> ComparisonResult {
        let Some(generator) = &self.generator else {
            return ComparisonResult::not_configured();
        };

        let prompt = build_comparison_prompt(transcript, scenes);
        let reply = match generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("comparison call failed: {}", e);
                return ComparisonResult::Raw {
                    raw_output: e.to_string(),
                };
            }
        };

        parse_verdict(&reply)
    }

    /// Re-submit malformed visual output for repair
    ///
    /// Returns the repaired scene list, or an empty list when the model is
    /// unavailable or the repaired text still fails to parse. Never fatal.
    pub async fn repair_scenes(&self, raw_output: &str) -> Vec<VisualScene> {
        let Some(generator) = &self.generator else {
            warn!("no language model configured; dropping unparsable visual output");
            return Vec::new();
        };

        let prompt = build_repair_prompt(raw_output);
        let reply = match generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("repair call failed: {}", e);
                return Vec::new();
            }
        };

        match parse_repaired_scenes(&reply) {
            Some(scenes) => {
                info!(scenes = scenes.len(), "repaired malformed visual output");
                scenes
            }
            None => {
                warn!("repaired visual output still unparsable; continuing with no scenes");
                Vec::new()
            }
        }
    }
}

fn build_comparison_prompt(transcript: &[TranscriptSegment], scenes: &[VisualScene]) -> String {
    let transcript_json =
        serde_json::to_string_pretty(transcript).unwrap_or_else(|_| "[]".to_string());
    let scenes_json = serde_json::to_string_pretty(scenes).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"You are analyzing a video.

- Transcription (spoken words): {transcript_json}
- Visual descriptions: {scenes_json}

Tasks:
1. Identify mismatches between what is spoken and what is shown, with timestamps.
2. Identify any spelling mistakes in on-screen text (from visual analysis).

Return output in strict JSON with fields:
{{
  "mismatches": [
    {{"time": "...", "detail": "..."}}
  ],
  "spelling_errors": [
    {{"time": "...", "word": "..."}}
  ]
}}
"#
    )
}

fn build_repair_prompt(raw_output: &str) -> String {
    format!(
        r#"The following text was supposed to be strict JSON of the shape
{{"scenes": [{{"start_time": <int>, "end_time": <int>, "visual": "<description>"}}]}}
but is malformed. Fix it and return only the corrected JSON, nothing else.

{raw_output}
"#
    )
}

/// Remove a Markdown code fence wrapper if present
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let inner = trimmed.trim_matches('`').trim();
    inner.strip_prefix("json").unwrap_or(inner).trim().to_string()
}

#[derive(Debug, Deserialize)]
struct Verdict {
    mismatches: Vec<video_recon_common::Mismatch>,
    spelling_errors: Vec<video_recon_common::SpellingError>,
}

fn parse_verdict(reply: &str) -> ComparisonResult {
    let cleaned = strip_code_fences(reply);
    match serde_json::from_str::<Verdict>(&cleaned) {
        Ok(verdict) => ComparisonResult::Structured {
            mismatches: verdict.mismatches,
            spelling_errors: verdict.spelling_errors,
        },
        Err(_) => ComparisonResult::Raw {
            raw_output: reply.to_string(),
        },
    }
}

#[derive(Debug, Deserialize)]
struct RepairedScenes {
    scenes: Vec<VisualScene>,
}

fn parse_repaired_scenes(reply: &str) -> Option<Vec<VisualScene>> {
    let cleaned = strip_code_fences(reply);
    serde_json::from_str::<RepairedScenes>(&cleaned)
        .map(|r| r.scenes)
        .ok()
}
