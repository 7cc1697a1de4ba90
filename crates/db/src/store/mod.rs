//! The job store abstraction.
//!
//! Every mutation is conditional on the job still being active, so status
//! never regresses out of a terminal state no matter which writer (the
//! polling campaign or a cancel request) lands last. Methods that mutate
//! return `true` when the write was applied.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::models::job::{JobListQuery, JobRecord, NewJob};
use crate::models::status::JobStatus;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

/// Errors from the job store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A job with the same id already exists.
    #[error("Job {0} already exists")]
    Duplicate(String),

    /// The list query named an unknown status.
    #[error("Unknown job status '{0}'")]
    UnknownStatus(String),
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was active and is now `cancelled`.
    Cancelled,
    /// The job had already reached this terminal status; nothing changed.
    AlreadyTerminal(JobStatus),
    /// No such job for this owner.
    NotFound,
}

/// Durable record of jobs, keyed by job id and filterable by owner.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `queued` job.
    async fn create(&self, input: &NewJob) -> Result<JobRecord, StoreError>;

    /// Look up a job by id regardless of owner. Engine-internal.
    async fn find_by_id(&self, id: &str) -> Result<Option<JobRecord>, StoreError>;

    /// Look up a job only if it belongs to `owner_id`.
    async fn find_for_owner(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<JobRecord>, StoreError>;

    /// Owner-scoped listing, newest first.
    async fn list_for_owner(
        &self,
        owner_id: &str,
        query: &JobListQuery,
    ) -> Result<Vec<JobRecord>, StoreError>;

    /// Jobs still `queued` or `running`, oldest first.
    async fn list_unfinished(&self) -> Result<Vec<JobRecord>, StoreError>;

    /// `queued` -> `running`, stamping `started_at` once.
    async fn mark_running(&self, id: &str) -> Result<bool, StoreError>;

    /// Set the provider request id; applied at most once.
    async fn set_provider_request_id(&self, id: &str, request_id: &str)
        -> Result<bool, StoreError>;

    /// Advisory progress update, clamped to `[0, 100]`.
    async fn update_progress(&self, id: &str, percent: f64, message: &str)
        -> Result<bool, StoreError>;

    /// Terminal success with the stored artifact reference.
    async fn complete(&self, id: &str, result_reference: &str) -> Result<bool, StoreError>;

    /// Terminal failure with a caller-visible message.
    async fn fail(&self, id: &str, error_message: &str) -> Result<bool, StoreError>;

    /// Cancel an owner's job if it is still active. Idempotent.
    async fn cancel(&self, id: &str, owner_id: &str) -> Result<CancelOutcome, StoreError>;
}
