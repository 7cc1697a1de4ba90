//! Handlers for capability submission and the `/jobs` resource.
//!
//! All endpoints act for the [`Owner`] named by the request. A job owned by
//! someone else is reported exactly like a missing one.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use helix_core::error::CoreError;
use helix_core::job_kind::JobKind;
use helix_core::types::JobId;
use helix_db::models::job::{JobListQuery, JobSnapshot};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::middleware::owner::Owner;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /api/v1/capabilities/{kind}/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    /// Caller-chosen id; generated when absent.
    #[serde(default)]
    pub job_id: Option<JobId>,
    /// Capability parameters, validated per kind.
    #[serde(default)]
    pub parameters: Value,
}

fn parse_kind(raw: &str) -> AppResult<JobKind> {
    raw.parse().map_err(|_| {
        AppError::Core(CoreError::NotFound {
            entity: "Capability",
            id: raw.to_string(),
        })
    })
}

/// MIME type for a stored artifact extension.
fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "json" => "application/json",
        "pdb" => "chemical/x-pdb",
        _ => "text/plain; charset=utf-8",
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/capabilities/{kind}/jobs
///
/// Validate and queue a job. Returns 201 as soon as the job is recorded;
/// submission and polling continue in the background.
pub async fn submit_job(
    owner: Owner,
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    let kind = parse_kind(&kind)?;
    let job = state
        .manager
        .submit(kind, &owner.0, input.parameters, input.job_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: JobSnapshot::from(job),
        }),
    ))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// The caller's jobs, newest first. Supports `status`, `limit` and `offset`.
pub async fn list_jobs(
    owner: Owner,
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs: Vec<JobSnapshot> = state
        .manager
        .list(&owner.0, &params)
        .await?
        .into_iter()
        .map(JobSnapshot::from)
        .collect();

    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    owner: Owner,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.manager.get_status(&job_id, &owner.0).await?;
    Ok(Json(DataResponse {
        data: JobSnapshot::from(job),
    }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Idempotent: cancelling a finished job reports its terminal status with
/// `cancelled: false`.
pub async fn cancel_job(
    owner: Owner,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let ack = state.manager.cancel(&job_id, &owner.0).await?;
    Ok(Json(DataResponse { data: ack }))
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}/result
///
/// The stored artifact of a completed job, as a download. 409 while the job
/// is unfinished or if it ended without a result.
pub async fn get_result(
    owner: Owner,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let result = state.manager.result(&job_id, &owner.0).await?;
    let disposition = format!(
        "attachment; filename=\"{}.{}\"",
        result.job_id, result.extension
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(result.extension).to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        result.content,
    ))
}
