//! REST API server for the video analysis service
//!
//! Exposes job submission, status polling, history and report download over
//! axum, with bearer-token verification against a third-party identity
//! provider. Accepted jobs are handed to a bounded worker pool; results are
//! read back from the durable job store.

mod auth;
mod handlers;
mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use video_recon_job_store::JobStore;
use video_recon_pipeline::worker::JobQueue;

pub use auth::TokenVerifier;
pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// Durable job and principal records
    pub store: JobStore,
    /// Submission side of the worker pool
    pub queue: JobQueue,
    /// Bearer-token verifier
    pub verifier: Arc<TokenVerifier>,
}

impl ApiState {
    /// Create new API state
    #[must_use]
    pub fn new(store: JobStore, queue: JobQueue, verifier: TokenVerifier) -> Self {
        Self {
            store,
            queue,
            verifier: Arc::new(verifier),
        }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Job submission
        .route("/api/v1/analyze", post(analyze))
        // Status and query endpoints
        .route("/api/v1/jobs", get(list_jobs))
        .route("/api/v1/jobs/{job_id}/status", get(get_job_status))
        .route("/api/v1/jobs/{job_id}/download", get(download_report))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await
}
