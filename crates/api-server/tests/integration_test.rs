//! Integration tests for the API server
//!
//! These tests start the server with stubbed analysis stages, send real
//! requests and verify responses end to end, from submission through worker
//! execution to status polling and report download.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use video_recon_api_server::{start_server, ApiState, TokenVerifier};
use video_recon_common::TranscriptSegment;
use video_recon_comparison::ComparisonEngine;
use video_recon_job_store::JobStore;
use video_recon_pipeline::{worker::spawn_workers, Pipeline, TranscribeStage, VisualStage};
use video_recon_transcription::TranscriptionError;
use video_recon_visual::{VisualAnalysis, VisualError};

struct StubTranscriber {
    fail: bool,
}

#[async_trait]
impl TranscribeStage for StubTranscriber {
    async fn transcribe(
        &self,
        _video_url: &str,
        _job_id: i64,
    ) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        if self.fail {
            return Err(TranscriptionError::Unavailable("stub down".to_string()));
        }
        Ok(vec![TranscriptSegment {
            start: "0:00:00".to_string(),
            end: "0:00:05".to_string(),
            text: "welcome to the demo".to_string(),
        }])
    }
}

struct StubVisual;

#[async_trait]
impl VisualStage for StubVisual {
    async fn analyze(&self, _video_url: &str) -> Result<VisualAnalysis, VisualError> {
        Ok(VisualAnalysis::Scenes(Vec::new()))
    }
}

/// Start a server with stubbed stages on `addr`; keeps its tempdir alive
async fn start_stub_server(addr: &'static str, transcriber_fails: bool) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::open(&dir.path().join("jobs.db")).await.unwrap();

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(StubTranscriber {
            fail: transcriber_fails,
        }),
        Arc::new(StubVisual),
        ComparisonEngine::disabled(),
        &dir.path().join("reports"),
    ));
    let queue = spawn_workers(pipeline, store.clone(), 2, 8);
    let state = ApiState::new(store, queue, TokenVerifier::from_config(None));

    tokio::spawn(async move {
        start_server(addr, state)
            .await
            .expect("Failed to start server");
    });
    sleep(Duration::from_millis(300)).await;
    dir
}

async fn poll_until_terminal(
    client: &reqwest::Client,
    base: &str,
    job_id: i64,
) -> serde_json::Value {
    for _ in 0..50 {
        sleep(Duration::from_millis(100)).await;
        let status_json: serde_json::Value = client
            .get(format!("{base}/api/v1/jobs/{job_id}/status"))
            .send()
            .await
            .expect("Failed to get job status")
            .json()
            .await
            .expect("Failed to parse status JSON");

        if status_json["status"] != "processing" {
            return status_json;
        }
    }
    panic!("job {job_id} never reached a terminal status");
}

#[tokio::test]
async fn test_health_endpoint() {
    let _dir = start_stub_server("127.0.0.1:18180", false).await;

    let client = reqwest::Client::new();
    let response = client
        .get("http://127.0.0.1:18180/health")
        .send()
        .await
        .expect("Failed to send health check request");

    assert_eq!(response.status(), 200);

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_analyze_to_completed_report() {
    let _dir = start_stub_server("127.0.0.1:18181", false).await;
    let base = "http://127.0.0.1:18181";
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/v1/analyze"))
        .json(&serde_json::json!({
            "source": {"type": "url", "location": "https://example.com/v.mp4"}
        }))
        .send()
        .await
        .expect("Failed to send analyze request");

    assert_eq!(response.status(), 202);
    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "processing");
    let job_id = json["job_id"].as_i64().expect("job_id should be a number");

    let status_json = poll_until_terminal(&client, base, job_id).await;
    assert_eq!(status_json["status"], "completed");
    let report = &status_json["result"];
    assert_eq!(report["input"], "https://example.com/v.mp4");
    assert_eq!(report["transcription"][0]["text"], "welcome to the demo");
    assert_eq!(
        report["comparison"]["raw_output"],
        "LLM not configured; cannot process."
    );

    // Download the same report as an attachment
    let download = client
        .get(format!("{base}/api/v1/jobs/{job_id}/download"))
        .send()
        .await
        .expect("Failed to download report");
    assert_eq!(download.status(), 200);
    let disposition = download
        .headers()
        .get("content-disposition")
        .expect("missing content-disposition")
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("attachment"));
    assert!(disposition.contains(&format!("{job_id}_final_report.json")));

    let body: serde_json::Value = download.json().await.expect("Failed to parse report");
    assert_eq!(body["job_id"].as_i64().unwrap(), job_id);
}

#[tokio::test]
async fn test_failed_stage_marks_job_failed() {
    let _dir = start_stub_server("127.0.0.1:18182", true).await;
    let base = "http://127.0.0.1:18182";
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/v1/analyze"))
        .json(&serde_json::json!({
            "source": {"type": "url", "location": "https://example.com/v.mp4"}
        }))
        .send()
        .await
        .expect("Failed to send analyze request");
    assert_eq!(response.status(), 202);
    let json: serde_json::Value = response.json().await.unwrap();
    let job_id = json["job_id"].as_i64().unwrap();

    let status_json = poll_until_terminal(&client, base, job_id).await;
    assert_eq!(status_json["status"], "failed");
    // A failed job never exposes a result; the failure detail stays server-side.
    assert!(status_json.get("result").is_none());

    // No report to download for a failed job
    let download = client
        .get(format!("{base}/api/v1/jobs/{job_id}/download"))
        .send()
        .await
        .expect("Failed to send download request");
    assert_eq!(download.status(), 404);
}

#[tokio::test]
async fn test_job_history_is_most_recent_first() {
    let _dir = start_stub_server("127.0.0.1:18183", false).await;
    let base = "http://127.0.0.1:18183";
    let client = reqwest::Client::new();

    for location in ["https://example.com/a.mp4", "https://example.com/b.mp4"] {
        let response = client
            .post(format!("{base}/api/v1/analyze"))
            .json(&serde_json::json!({
                "source": {"type": "url", "location": location}
            }))
            .send()
            .await
            .expect("Failed to send analyze request");
        assert_eq!(response.status(), 202);
    }

    let history: serde_json::Value = client
        .get(format!("{base}/api/v1/jobs"))
        .send()
        .await
        .expect("Failed to fetch history")
        .json()
        .await
        .expect("Failed to parse history");

    let jobs = history.as_array().expect("history should be an array");
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["input"], "https://example.com/b.mp4");
    assert_eq!(jobs[1]["input"], "https://example.com/a.mp4");
}

#[tokio::test]
async fn test_job_not_found() {
    let _dir = start_stub_server("127.0.0.1:18184", false).await;

    let client = reqwest::Client::new();
    let response = client
        .get("http://127.0.0.1:18184/api/v1/jobs/999999/status")
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(
        response.status(),
        404,
        "Should return 404 for non-existent job"
    );
}

#[tokio::test]
async fn test_empty_source_location_is_rejected() {
    let _dir = start_stub_server("127.0.0.1:18185", false).await;

    let client = reqwest::Client::new();
    let response = client
        .post("http://127.0.0.1:18185/api/v1/analyze")
        .json(&serde_json::json!({
            "source": {"type": "url", "location": "  "}
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_invalid_json_request() {
    let _dir = start_stub_server("127.0.0.1:18186", false).await;

    let client = reqwest::Client::new();
    let response = client
        .post("http://127.0.0.1:18186/api/v1/analyze")
        .header("Content-Type", "application/json")
        .body("{invalid json")
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_client_error());
}
