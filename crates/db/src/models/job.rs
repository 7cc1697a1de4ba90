//! Job entity model and DTOs for provider-backed jobs.

use helix_core::job_kind::JobKind;
use helix_core::types::{JobId, OwnerId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub owner_id: OwnerId,
    pub kind: String,
    pub input_parameters: serde_json::Value,
    pub status_id: StatusId,
    pub provider_request_id: Option<String>,
    pub progress: f64,
    pub progress_message: Option<String>,
    pub result_reference: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl JobRecord {
    /// Decoded lifecycle status. Unknown IDs (which the foreign key rules
    /// out) are reported as `Error`.
    pub fn status(&self) -> JobStatus {
        JobStatus::from_id(self.status_id).unwrap_or(JobStatus::Error)
    }

    pub fn job_kind(&self) -> Option<JobKind> {
        self.kind.parse().ok()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// DTO for inserting a new `queued` job.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Caller-supplied id, or `None` to generate one.
    pub id: Option<JobId>,
    pub owner_id: OwnerId,
    pub kind: JobKind,
    pub input_parameters: serde_json::Value,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status name (e.g. `running`, `error`).
    pub status: Option<String>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Maximum page size for job listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
pub const DEFAULT_LIMIT: i64 = 50;

impl JobListQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Resolved status filter. An unrecognised name yields `Err(name)`.
    pub fn status_filter(&self) -> Result<Option<JobStatus>, String> {
        match self.status.as_deref() {
            None | Some("") => Ok(None),
            Some(name) => JobStatus::from_name(name)
                .map(Some)
                .ok_or_else(|| name.to_string()),
        }
    }
}

/// Caller-facing view of a job with the status rendered by name.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub kind: String,
    pub status: &'static str,
    pub provider_request_id: Option<String>,
    pub progress: f64,
    pub progress_message: Option<String>,
    pub result_reference: Option<String>,
    pub error_message: Option<String>,
    pub input_parameters: serde_json::Value,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl From<JobRecord> for JobSnapshot {
    fn from(record: JobRecord) -> Self {
        let status = record.status().as_str();
        Self {
            id: record.id,
            kind: record.kind,
            status,
            provider_request_id: record.provider_request_id,
            progress: record.progress,
            progress_message: record.progress_message,
            result_reference: record.result_reference,
            error_message: record.error_message,
            input_parameters: record.input_parameters,
            created_at: record.created_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_clamps_limit_and_offset() {
        let query = JobListQuery {
            status: None,
            limit: Some(500),
            offset: Some(-3),
        };
        assert_eq!(query.limit(), MAX_LIMIT);
        assert_eq!(query.offset(), 0);
        assert_eq!(JobListQuery::default().limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn list_query_parses_status_filter() {
        let query = JobListQuery {
            status: Some("running".into()),
            ..Default::default()
        };
        assert_eq!(query.status_filter(), Ok(Some(JobStatus::Running)));

        let bad = JobListQuery {
            status: Some("finished".into()),
            ..Default::default()
        };
        assert_eq!(bad.status_filter(), Err("finished".to_string()));
    }
}
