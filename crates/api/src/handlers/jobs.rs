//! Handlers for the `/jobs` resource.
//!
//! Every endpoint is scoped to the caller's [`OwnerScope`]; jobs of other
//! scopes are reported as not found.

use atelier_core::job::JobStatus;
use atelier_core::request::{JobListQuery, SubmitJobRequest};
use atelier_core::types::DbId;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::background::scheduled_dispatch;
use crate::error::AppResult;
use crate::middleware::scope::OwnerScope;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubmittedJob {
    pub job_id: DbId,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// `true` when this call moved the job to `canceled`.
    pub canceled: bool,
    /// Status after the call; the existing terminal status on a no-op.
    pub status: JobStatus,
}

/// POST /api/v1/jobs
///
/// Accept a generation request. Returns 201 with the new job id; the job
/// is `queued` and an immediate dispatch is attempted in the background.
pub async fn submit_job(
    OwnerScope(owner_scope): OwnerScope,
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    let job = state.pipeline.submission.submit(owner_scope, input).await?;

    if state.config.dispatch_on_submit {
        scheduled_dispatch::spawn_immediate(state.pipeline.dispatcher.clone());
    }

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: SubmittedJob { job_id: job.id },
        }),
    ))
}

/// POST /api/v1/jobs/dispatch
///
/// Claim and execute up to one batch of queued jobs, synchronously.
pub async fn dispatch_jobs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let summary = state.pipeline.dispatcher.dispatch_once().await?;
    Ok(Json(DataResponse { data: summary }))
}

/// GET /api/v1/jobs
///
/// List the caller's jobs, newest first. Supports `status`, `limit`, and
/// `offset` query parameters.
pub async fn list_jobs(
    OwnerScope(owner_scope): OwnerScope,
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.pipeline.queries.jobs(owner_scope, &params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
///
/// Current state of one job. Read-only; safe to poll.
pub async fn get_job(
    OwnerScope(owner_scope): OwnerScope,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.pipeline.queries.job(owner_scope, job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/cancel
///
/// Cancel a queued or processing job. Canceling a finished job succeeds
/// without changing it.
pub async fn cancel_job(
    OwnerScope(owner_scope): OwnerScope,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .pipeline
        .cancellation
        .cancel(owner_scope, job_id)
        .await?;

    Ok(Json(DataResponse {
        data: CancelResponse {
            canceled: outcome.was_canceled(),
            status: outcome.job().status(),
        },
    }))
}
