//! Repository for the `jobs` table.
//!
//! Uses `JobStatus` from `models::status` for every status literal. All
//! mutations are guarded by `status_id IN (queued, running)` so a job never
//! leaves a terminal state.

use helix_core::types::new_job_id;
use sqlx::PgPool;

use crate::models::job::{JobListQuery, JobRecord, NewJob};
use crate::models::status::{JobStatus, StatusId};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, owner_id, kind, input_parameters, status_id, provider_request_id, \
    progress, progress_message, result_reference, error_message, \
    created_at, started_at, completed_at, updated_at";

/// Non-terminal statuses: queued, running.
const ACTIVE_STATUSES: [StatusId; 2] = [JobStatus::Queued as StatusId, JobStatus::Running as StatusId];

/// Provides CRUD operations for provider-backed jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job in `queued` status.
    pub async fn create(pool: &PgPool, input: &NewJob) -> Result<JobRecord, sqlx::Error> {
        let id = input.id.clone().unwrap_or_else(new_job_id);
        let query = format!(
            "INSERT INTO jobs (id, owner_id, kind, input_parameters, status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRecord>(&query)
            .bind(id)
            .bind(&input.owner_id)
            .bind(input.kind.as_str())
            .bind(&input.input_parameters)
            .bind(JobStatus::Queued.id())
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID regardless of owner (engine-internal).
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<JobRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job only if it belongs to `owner_id`.
    pub async fn find_for_owner(
        pool: &PgPool,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<JobRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1 AND owner_id = $2");
        sqlx::query_as::<_, JobRecord>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    /// List one owner's jobs, newest first, with optional status filter.
    pub async fn list_for_owner(
        pool: &PgPool,
        owner_id: &str,
        status: Option<JobStatus>,
        params: &JobListQuery,
    ) -> Result<Vec<JobRecord>, sqlx::Error> {
        let status_clause = if status.is_some() {
            "AND status_id = $4"
        } else {
            ""
        };
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE owner_id = $1 {status_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );

        let mut q = sqlx::query_as::<_, JobRecord>(&query)
            .bind(owner_id)
            .bind(params.limit())
            .bind(params.offset());
        if let Some(status) = status {
            q = q.bind(status.id());
        }
        q.fetch_all(pool).await
    }

    /// All jobs still `queued` or `running`, oldest first. Used for
    /// recovery at startup.
    pub async fn list_unfinished(pool: &PgPool) -> Result<Vec<JobRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status_id IN ($1, $2) \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, JobRecord>(&query)
            .bind(ACTIVE_STATUSES[0])
            .bind(ACTIVE_STATUSES[1])
            .fetch_all(pool)
            .await
    }

    /// Move a queued job to `running`, stamping `started_at` once.
    pub async fn mark_running(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, started_at = COALESCE(started_at, NOW()), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($3, $4)",
        )
        .bind(id)
        .bind(JobStatus::Running.id())
        .bind(ACTIVE_STATUSES[0])
        .bind(ACTIVE_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the provider's request id. Only succeeds once, and only while
    /// the job is active.
    pub async fn set_provider_request_id(
        pool: &PgPool,
        id: &str,
        request_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET provider_request_id = $2, updated_at = NOW() \
             WHERE id = $1 AND provider_request_id IS NULL AND status_id IN ($3, $4)",
        )
        .bind(id)
        .bind(request_id)
        .bind(ACTIVE_STATUSES[0])
        .bind(ACTIVE_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update progress percentage and message (last write wins).
    pub async fn update_progress(
        pool: &PgPool,
        id: &str,
        percent: f64,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET progress = $2, progress_message = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5)",
        )
        .bind(id)
        .bind(percent.clamp(0.0, 100.0))
        .bind(message)
        .bind(ACTIVE_STATUSES[0])
        .bind(ACTIVE_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a job completed with a pointer to its stored artifact.
    pub async fn complete(
        pool: &PgPool,
        id: &str,
        result_reference: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, result_reference = $3, progress = 100, \
                 progress_message = 'Completed', completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5)",
        )
        .bind(id)
        .bind(JobStatus::Completed.id())
        .bind(result_reference)
        .bind(ACTIVE_STATUSES[0])
        .bind(ACTIVE_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a job as errored.
    ///
    /// No automatic retry is performed. Retrying is a new submission.
    pub async fn fail(pool: &PgPool, id: &str, error_message: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5)",
        )
        .bind(id)
        .bind(JobStatus::Error.id())
        .bind(error_message)
        .bind(ACTIVE_STATUSES[0])
        .bind(ACTIVE_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel an owner's job if it is not already terminal.
    ///
    /// Returns `true` if the job was cancelled by this call.
    pub async fn cancel(pool: &PgPool, id: &str, owner_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND owner_id = $2 AND status_id IN ($4, $5)",
        )
        .bind(id)
        .bind(owner_id)
        .bind(JobStatus::Cancelled.id())
        .bind(ACTIVE_STATUSES[0])
        .bind(ACTIVE_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
