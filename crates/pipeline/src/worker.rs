//! Bounded worker pool for pipeline runs
//!
//! Accepted jobs go onto a fixed-depth queue consumed by a fixed number of
//! workers; a full queue rejects the submission so the caller can refuse the
//! request instead of buffering unboundedly. Every dequeued job reaches a
//! terminal status, including runs that panic.

use crate::Pipeline;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};
use video_recon_job_store::JobStore;

/// One accepted analysis request awaiting a worker
#[derive(Debug)]
pub struct QueuedJob {
    pub job_id: i64,
    pub source: String,
}

/// Submission failure; the job should be marked failed by the caller
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("analysis queue is full")]
    QueueFull,
}

/// Sending half of the run queue; cheap to clone
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<QueuedJob>,
}

impl JobQueue {
    /// Enqueue a job without waiting; full queue rejects immediately
    pub fn submit(&self, job: QueuedJob) -> Result<(), SubmitError> {
        self.tx.try_send(job).map_err(|_| SubmitError::QueueFull)
    }
}

/// Start `concurrency` workers over a queue of `depth` slots
pub fn spawn_workers(
    pipeline: Arc<Pipeline>,
    store: JobStore,
    concurrency: usize,
    depth: usize,
) -> JobQueue {
    let (tx, rx) = mpsc::channel::<QueuedJob>(depth.max(1));
    let rx = Arc::new(Mutex::new(rx));

    for worker_id in 0..concurrency.max(1) {
        let rx = Arc::clone(&rx);
        let pipeline = Arc::clone(&pipeline);
        let store = store.clone();
        tokio::spawn(async move {
            loop {
                let job = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(job) = job else {
                    info!(worker_id, "queue closed, worker exiting");
                    break;
                };
                run_one(&pipeline, &store, job).await;
            }
        });
    }

    JobQueue { tx }
}

/// Drive one job to a terminal status
///
/// The run itself executes in its own task so that a panic surfaces as a
/// join error here instead of killing the worker, and the job still ends up
/// `failed`.
async fn run_one(pipeline: &Arc<Pipeline>, store: &JobStore, job: QueuedJob) {
    let job_id = job.job_id;
    let run = {
        let pipeline = Arc::clone(pipeline);
        tokio::spawn(async move { pipeline.run(job_id, &job.source).await })
    };

    let outcome = match run.await {
        Ok(Ok((report, _path))) => match serde_json::to_string(&report) {
            Ok(body) => store.complete_job(job_id, &body).await,
            Err(e) => {
                error!(job_id, "report serialization failed: {}", e);
                store.fail_job(job_id, "internal error: report serialization failed").await
            }
        },
        Ok(Err(e)) => {
            warn!(job_id, "pipeline run failed: {}", e);
            store.fail_job(job_id, &e.to_string()).await
        }
        Err(e) => {
            error!(job_id, "pipeline run aborted: {}", e);
            store.fail_job(job_id, "internal error: analysis aborted").await
        }
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => warn!(job_id, "job already terminal, status unchanged"),
        Err(e) => error!(job_id, "failed to record job outcome: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TranscribeStage, VisualStage};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;
    use video_recon_common::{JobStatus, TranscriptSegment};
    use video_recon_comparison::ComparisonEngine;
    use video_recon_transcription::TranscriptionError;
    use video_recon_visual::{VisualAnalysis, VisualError};

    struct InstantTranscriber {
        fail: bool,
        panic: bool,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl TranscribeStage for InstantTranscriber {
        async fn transcribe(
            &self,
            _video_url: &str,
            _job_id: i64,
        ) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.panic {
                panic!("stage blew up");
            }
            if self.fail {
                return Err(TranscriptionError::Unavailable("down".to_string()));
            }
            Ok(vec![TranscriptSegment {
                start: "0:00:00".to_string(),
                end: "0:00:01".to_string(),
                text: "hi".to_string(),
            }])
        }
    }

    struct EmptyVisual;

    #[async_trait]
    impl VisualStage for EmptyVisual {
        async fn analyze(&self, _video_url: &str) -> Result<VisualAnalysis, VisualError> {
            Ok(VisualAnalysis::Scenes(Vec::new()))
        }
    }

    async fn setup(
        transcriber: InstantTranscriber,
        concurrency: usize,
        depth: usize,
    ) -> (tempfile::TempDir, JobStore, JobQueue, i64) {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(&dir.path().join("jobs.db")).await.unwrap();
        let owner = store.resolve_or_create_principal("local").await.unwrap();

        let pipeline = Arc::new(Pipeline::new(
            Arc::new(transcriber),
            Arc::new(EmptyVisual),
            ComparisonEngine::disabled(),
            &dir.path().join("reports"),
        ));
        let queue = spawn_workers(pipeline, store.clone(), concurrency, depth);
        (dir, store, queue, owner)
    }

    async fn wait_for_terminal(store: &JobStore, job_id: i64, owner: i64) -> JobStatus {
        for _ in 0..100 {
            let job = store.get_job(job_id, owner).await.unwrap().unwrap();
            if job.status != JobStatus::Processing {
                return job.status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job never reached a terminal status");
    }

    #[tokio::test]
    async fn test_successful_run_completes_job() {
        let (_dir, store, queue, owner) = setup(
            InstantTranscriber {
                fail: false,
                panic: false,
                gate: None,
            },
            2,
            8,
        )
        .await;

        let job_id = store.create_job(owner, "https://example.com/v.mp4").await.unwrap();
        queue
            .submit(QueuedJob {
                job_id,
                source: "https://example.com/v.mp4".to_string(),
            })
            .unwrap();

        assert_eq!(wait_for_terminal(&store, job_id, owner).await, JobStatus::Completed);
        let job = store.get_job(job_id, owner).await.unwrap().unwrap();
        assert!(job.result.unwrap().contains("\"transcription\""));
    }

    #[tokio::test]
    async fn test_failing_run_marks_job_failed() {
        let (_dir, store, queue, owner) = setup(
            InstantTranscriber {
                fail: true,
                panic: false,
                gate: None,
            },
            1,
            8,
        )
        .await;

        let job_id = store.create_job(owner, "input").await.unwrap();
        queue
            .submit(QueuedJob {
                job_id,
                source: "input".to_string(),
            })
            .unwrap();

        assert_eq!(wait_for_terminal(&store, job_id, owner).await, JobStatus::Failed);
        let job = store.get_job(job_id, owner).await.unwrap().unwrap();
        assert!(job.error.unwrap().contains("transcription"));
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_panicking_run_still_reaches_failed() {
        let (_dir, store, queue, owner) = setup(
            InstantTranscriber {
                fail: false,
                panic: true,
                gate: None,
            },
            1,
            8,
        )
        .await;

        let job_id = store.create_job(owner, "input").await.unwrap();
        queue
            .submit(QueuedJob {
                job_id,
                source: "input".to_string(),
            })
            .unwrap();

        assert_eq!(wait_for_terminal(&store, job_id, owner).await, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_submission() {
        let gate = Arc::new(Notify::new());
        let (_dir, store, queue, owner) = setup(
            InstantTranscriber {
                fail: false,
                panic: false,
                gate: Some(Arc::clone(&gate)),
            },
            1,
            1,
        )
        .await;

        // First job occupies the worker, second fills the single queue slot.
        let first = store.create_job(owner, "one").await.unwrap();
        queue
            .submit(QueuedJob {
                job_id: first,
                source: "one".to_string(),
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = store.create_job(owner, "two").await.unwrap();
        queue
            .submit(QueuedJob {
                job_id: second,
                source: "two".to_string(),
            })
            .unwrap();

        let third = store.create_job(owner, "three").await.unwrap();
        let err = queue.submit(QueuedJob {
            job_id: third,
            source: "three".to_string(),
        });
        assert!(matches!(err, Err(SubmitError::QueueFull)));

        // Release the gate for each held run so the pool drains.
        gate.notify_one();
        gate.notify_one();
        assert_eq!(wait_for_terminal(&store, first, owner).await, JobStatus::Completed);
        assert_eq!(wait_for_terminal(&store, second, owner).await, JobStatus::Completed);
    }
}
