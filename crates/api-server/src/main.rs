//! API Server Binary Entry Point

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use video_recon_api_server::{start_server, ApiState, TokenVerifier};
use video_recon_common::config::AppConfig;
use video_recon_comparison::{ComparisonEngine, HttpTextGenerator};
use video_recon_job_store::JobStore;
use video_recon_pipeline::{worker::spawn_workers, Pipeline};
use video_recon_transcription::TranscriptionClient;
use video_recon_visual::VisualClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "video_recon=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    tokio::fs::create_dir_all(&config.reports_dir).await?;
    if let Some(parent) = config.db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let store = JobStore::open(&config.db_path).await?;

    let comparison = match HttpTextGenerator::from_config(&config.llm) {
        Some(generator) => ComparisonEngine::new(Arc::new(generator)),
        None => {
            tracing::warn!("no LLM API key configured, comparison step disabled");
            ComparisonEngine::disabled()
        }
    };

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(TranscriptionClient::new(
            config.transcription.clone(),
            &config.reports_dir,
        )),
        Arc::new(VisualClient::new(config.visual.clone())),
        comparison,
        &config.reports_dir,
    ));

    let queue = spawn_workers(
        pipeline,
        store.clone(),
        config.worker_concurrency,
        config.queue_depth,
    );

    let verifier = TokenVerifier::from_config(config.auth.clone());
    if matches!(verifier, TokenVerifier::Disabled) {
        tracing::warn!("no identity provider configured, requests map to a local principal");
    }

    let state = ApiState::new(store, queue, verifier);

    tracing::info!("Starting video analysis API server");
    start_server(&config.bind_addr, state).await?;

    Ok(())
}
