//! Visual analysis adapter
//!
//! Drives the external video-indexing service through one invocation:
//! create a uniquely named index, submit the video as an indexing task, poll
//! until the task is ready, stream back a scene-segmented description, and
//! delete the index again. Malformed model output is returned as a degraded
//! result rather than an error so the pipeline can attempt repair.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;
use video_recon_common::config::VisualConfig;
use video_recon_common::VisualScene;

/// Instruction template for the streaming analysis call
const ANALYZE_PROMPT: &str = r#"
Analyze the entire video in 25-second intervals strictly.
Only provide detailed visual analysis for each segment.
Do not include audio.

Return JSON strictly as:
{
  "scenes": [
    {"start_time": <int>, "end_time": <int>, "visual": "<detailed visual description>"}
  ]
}
"#;

/// Visual stage errors; all fatal to the enclosing pipeline run
#[derive(Debug, Error)]
pub enum VisualError {
    /// No API key was configured for the indexing service
    #[error("visual analysis service not configured (missing API key)")]
    NotConfigured,

    /// Network failure or timeout before a response arrived
    #[error("visual analysis service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a non-success status
    #[error("visual analysis rejected upstream: status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The indexing task reached a terminal non-ready status
    #[error("indexing failed with status {status}")]
    IndexingFailed { status: String },

    /// The bounded poll budget was exhausted before the task settled
    #[error("indexing did not settle after {attempts} polls (last status: {last_status})")]
    IndexingTimedOut { last_status: String, attempts: u32 },
}

/// Outcome of one visual analysis invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisualAnalysis {
    /// Parsed scene descriptions
    Scenes(Vec<VisualScene>),
    /// The accumulated model output did not parse; raw text kept for repair
    Degraded { raw_output: String },
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    status: String,
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeEvent {
    event_type: String,
    #[serde(default)]
    text: String,
}

/// Client for the external video-indexing / visual-understanding service
#[derive(Debug, Clone)]
pub struct VisualClient {
    config: VisualConfig,
}

impl VisualClient {
    /// Create a client from service settings
    #[must_use]
    pub fn new(config: VisualConfig) -> Self {
        Self { config }
    }

    /// Run the full indexing + analysis state machine for one video
    ///
    /// Index creation, task submission and polling failures are fatal; a
    /// parse failure of the streamed description is returned as
    /// [`VisualAnalysis::Degraded`] so the caller can attempt repair. Index
    /// deletion is attempted regardless of the parse outcome and never masks
    /// the primary result.
    pub async fn analyze(&self, video_url: &str) -> Result<VisualAnalysis, VisualError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(VisualError::NotConfigured)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| VisualError::Unavailable(e.to_string()))?;

        // Unique per-request index name so concurrent jobs never collide.
        let index_name = format!(
            "video_analysis_index_{}",
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let index_id = self.create_index(&client, api_key, &index_name).await?;
        info!(index_id = %index_id, "created analysis index");

        // Everything after index creation runs inside a helper so the index
        // can be deleted on both the success and the error path.
        let outcome = self
            .index_and_analyze(&client, api_key, &index_id, video_url)
            .await;

        self.delete_index(&client, api_key, &index_id).await;

        outcome
    }

    async fn index_and_analyze(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        index_id: &str,
        video_url: &str,
    ) -> Result<VisualAnalysis, VisualError> {
        let task_id = self
            .create_task(client, api_key, index_id, video_url)
            .await?;
        info!(task_id = %task_id, "submitted indexing task");

        let video_id = self.await_indexing(client, api_key, &task_id).await?;

        let raw_output = self.stream_analysis(client, api_key, &video_id).await?;
        debug!(bytes = raw_output.len(), "accumulated analysis stream");

        Ok(parse_scene_blob(&raw_output))
    }

    async fn create_index(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        index_name: &str,
    ) -> Result<String, VisualError> {
        let response = client
            .post(format!("{}/indexes", self.base_url()))
            .header("x-api-key", api_key)
            .json(&serde_json::json!({
                "index_name": index_name,
                "models": [
                    {"model_name": "pegasus1.2", "model_options": ["visual"]}
                ]
            }))
            .send()
            .await
            .map_err(|e| VisualError::Unavailable(e.to_string()))?;

        let created: CreatedResource = Self::decode(response).await?;
        Ok(created.id)
    }

    async fn create_task(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        index_id: &str,
        video_url: &str,
    ) -> Result<String, VisualError> {
        let response = client
            .post(format!("{}/tasks", self.base_url()))
            .header("x-api-key", api_key)
            .json(&serde_json::json!({
                "index_id": index_id,
                "video_url": video_url,
            }))
            .send()
            .await
            .map_err(|e| VisualError::Unavailable(e.to_string()))?;

        let created: CreatedResource = Self::decode(response).await?;
        Ok(created.id)
    }

    /// Poll the indexing task under the configured bounded retry policy
    async fn await_indexing(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        task_id: &str,
    ) -> Result<String, VisualError> {
        let mut last_status = String::from("unknown");

        for attempt in 1..=self.config.poll_max_attempts {
            let response = client
                .get(format!("{}/tasks/{}", self.base_url(), task_id))
                .header("x-api-key", api_key)
                .send()
                .await
                .map_err(|e| VisualError::Unavailable(e.to_string()))?;

            let task: TaskStatus = Self::decode(response).await?;
            info!(task_id = %task_id, status = %task.status, attempt, "indexing status");
            last_status = task.status.clone();

            match task.status.as_str() {
                "ready" => {
                    return task.video_id.ok_or_else(|| VisualError::IndexingFailed {
                        status: "ready without video_id".to_string(),
                    });
                }
                "failed" | "error" => {
                    return Err(VisualError::IndexingFailed {
                        status: task.status,
                    });
                }
                _ => {
                    tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                }
            }
        }

        Err(VisualError::IndexingTimedOut {
            last_status,
            attempts: self.config.poll_max_attempts,
        })
    }

    /// Request the streaming scene description and accumulate it into one blob
    async fn stream_analysis(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        video_id: &str,
    ) -> Result<String, VisualError> {
        let response = client
            .post(format!("{}/analyze", self.base_url()))
            .header("x-api-key", api_key)
            .json(&serde_json::json!({
                "video_id": video_id,
                "prompt": ANALYZE_PROMPT,
                "stream": true,
            }))
            .send()
            .await
            .map_err(|e| VisualError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisualError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let mut response = response;
        let mut raw = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| VisualError::Unavailable(e.to_string()))?
        {
            raw.extend_from_slice(&chunk);
        }

        Ok(extract_generated_text(&String::from_utf8_lossy(&raw)))
    }

    /// Best-effort index cleanup; failure is logged, never propagated
    async fn delete_index(&self, client: &reqwest::Client, api_key: &str, index_id: &str) {
        let result = client
            .delete(format!("{}/indexes/{}", self.base_url(), index_id))
            .header("x-api-key", api_key)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(index_id = %index_id, "deleted analysis index");
            }
            Ok(response) => {
                warn!(index_id = %index_id, status = %response.status(), "index cleanup rejected");
            }
            Err(e) => warn!(index_id = %index_id, "index cleanup failed: {}", e),
        }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, VisualError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VisualError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(VisualError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| VisualError::Rejected {
            status: status.as_u16(),
            body: format!("undecodable response ({e}): {body}"),
        })
    }
}

/// Pull generated text out of the accumulated event stream
///
/// The service emits one JSON event per line; only `text_generation` events
/// carry description text. Bodies that are not event-framed at all are
/// passed through verbatim so a non-streaming upstream still works.
fn extract_generated_text(raw: &str) -> String {
    let mut text = String::new();
    let mut saw_event = false;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(event) = serde_json::from_str::<AnalyzeEvent>(line) {
            saw_event = true;
            if event.event_type == "text_generation" {
                text.push_str(&event.text);
            }
        }
    }

    if saw_event {
        text
    } else {
        raw.to_string()
    }
}

/// Parse the accumulated description blob into scenes
///
/// A blob that is not valid JSON becomes a degraded result carrying the raw
/// text; valid JSON without a `scenes` field yields an empty scene list.
fn parse_scene_blob(raw_output: &str) -> VisualAnalysis {
    let value: serde_json::Value = match serde_json::from_str(raw_output.trim()) {
        Ok(v) => v,
        Err(_) => {
            return VisualAnalysis::Degraded {
                raw_output: raw_output.to_string(),
            }
        }
    };

    match value.get("scenes") {
        None => VisualAnalysis::Scenes(Vec::new()),
        Some(scenes) => match serde_json::from_value::<Vec<VisualScene>>(scenes.clone()) {
            Ok(scenes) => VisualAnalysis::Scenes(scenes),
            Err(_) => VisualAnalysis::Degraded {
                raw_output: raw_output.to_string(),
            },
        },
    }
}
