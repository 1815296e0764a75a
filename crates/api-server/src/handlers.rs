//! HTTP request handlers for API endpoints

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::{error, info, warn};

use crate::auth::AuthError;
use crate::types::{
    AnalyzeRequest, AnalyzeResponse, HealthResponse, JobStatusResponse, JobSummary,
};
use crate::ApiState;
use video_recon_common::JobStatus;
use video_recon_job_store::JobRecord;
use video_recon_pipeline::worker::QueuedJob;

type ApiError = (StatusCode, String);

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Verify the caller and resolve their principal row
async fn authenticate(state: &ApiState, headers: &HeaderMap) -> Result<i64, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let subject = state.verifier.verify(token).await.map_err(|e| match e {
        AuthError::KeySetUnavailable(_) => {
            error!("token verification unavailable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "token verification unavailable".to_string(),
            )
        }
        _ => (StatusCode::UNAUTHORIZED, e.to_string()),
    })?;

    state
        .store
        .resolve_or_create_principal(&subject)
        .await
        .map_err(|e| {
            error!("principal lookup failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        })
}

/// Accept a video for analysis
///
/// The job is created before submission so that a full queue still leaves a
/// visible `failed` record instead of silently dropping the request.
pub async fn analyze(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = authenticate(&state, &headers).await?;

    let location = request.source.location().trim();
    if location.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "empty source location".to_string()));
    }

    let job_id = state
        .store
        .create_job(owner_id, location)
        .await
        .map_err(|e| {
            error!("failed to create job: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        })?;
    info!(job_id, owner_id, "analysis requested");

    let submitted = state.queue.submit(QueuedJob {
        job_id,
        source: location.to_string(),
    });
    if submitted.is_err() {
        warn!(job_id, "analysis queue full, rejecting");
        if let Err(e) = state.store.fail_job(job_id, "analysis queue is full").await {
            error!(job_id, "failed to record queue rejection: {}", e);
        }
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "analysis queue is full".to_string(),
        ));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            job_id,
            status: JobStatus::Processing.as_str().to_string(),
        }),
    ))
}

/// Fetch a job scoped to the caller; foreign and missing jobs both 404
async fn owned_job(state: &ApiState, job_id: i64, owner_id: i64) -> Result<JobRecord, ApiError> {
    state
        .store
        .get_job(job_id, owner_id)
        .await
        .map_err(|e| {
            error!(job_id, "job lookup failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        })?
        .ok_or((StatusCode::NOT_FOUND, "job not found".to_string()))
}

/// Poll a job's status; terminal jobs carry their result
pub async fn get_job_status(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(job_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = authenticate(&state, &headers).await?;
    let job = owned_job(&state, job_id, owner_id).await?;

    // Only completed jobs expose a result; failure detail stays server-side.
    let result = match (job.status, job.result) {
        (JobStatus::Completed, Some(body)) => Some(
            serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)),
        ),
        _ => None,
    };

    Ok(Json(JobStatusResponse {
        status: job.status.as_str().to_string(),
        result,
    }))
}

/// The caller's job history, most recent first
pub async fn list_jobs(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = authenticate(&state, &headers).await?;

    let jobs = state.store.list_jobs(owner_id).await.map_err(|e| {
        error!("job history lookup failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal error".to_string(),
        )
    })?;

    let summaries: Vec<JobSummary> = jobs
        .into_iter()
        .map(|job| JobSummary {
            job_id: job.id,
            input: job.input_reference,
            status: job.status.as_str().to_string(),
            created_at: job.created_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(summaries))
}

/// Download a completed job's report as a file attachment
pub async fn download_report(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(job_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = authenticate(&state, &headers).await?;
    let job = owned_job(&state, job_id, owner_id).await?;

    if job.status != JobStatus::Completed {
        return Err((
            StatusCode::NOT_FOUND,
            "report not available".to_string(),
        ));
    }
    let Some(report) = job.result else {
        return Err((
            StatusCode::NOT_FOUND,
            "report not available".to_string(),
        ));
    };

    let response_headers = [
        (header::CONTENT_TYPE, "application/json".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{job_id}_final_report.json\""),
        ),
    ];
    Ok((response_headers, report))
}
