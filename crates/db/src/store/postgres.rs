use async_trait::async_trait;
use sqlx::PgPool;

use super::{CancelOutcome, JobStore, StoreError};
use crate::models::job::{JobListQuery, JobRecord, NewJob};
use crate::repositories::JobRepo;

/// PostgreSQL unique violation.
const UNIQUE_VIOLATION: &str = "23505";

/// [`JobStore`] backed by the `jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, input: &NewJob) -> Result<JobRecord, StoreError> {
        JobRepo::create(&self.pool, input).await.map_err(|e| {
            let duplicate = matches!(
                &e,
                sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
            );
            if duplicate {
                StoreError::Duplicate(input.id.clone().unwrap_or_default())
            } else {
                StoreError::Database(e)
            }
        })
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<JobRecord>, StoreError> {
        Ok(JobRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_for_owner(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<JobRecord>, StoreError> {
        Ok(JobRepo::find_for_owner(&self.pool, id, owner_id).await?)
    }

    async fn list_for_owner(
        &self,
        owner_id: &str,
        query: &JobListQuery,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let status = query.status_filter().map_err(StoreError::UnknownStatus)?;
        Ok(JobRepo::list_for_owner(&self.pool, owner_id, status, query).await?)
    }

    async fn list_unfinished(&self) -> Result<Vec<JobRecord>, StoreError> {
        Ok(JobRepo::list_unfinished(&self.pool).await?)
    }

    async fn mark_running(&self, id: &str) -> Result<bool, StoreError> {
        Ok(JobRepo::mark_running(&self.pool, id).await?)
    }

    async fn set_provider_request_id(
        &self,
        id: &str,
        request_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(JobRepo::set_provider_request_id(&self.pool, id, request_id).await?)
    }

    async fn update_progress(
        &self,
        id: &str,
        percent: f64,
        message: &str,
    ) -> Result<bool, StoreError> {
        Ok(JobRepo::update_progress(&self.pool, id, percent, message).await?)
    }

    async fn complete(&self, id: &str, result_reference: &str) -> Result<bool, StoreError> {
        Ok(JobRepo::complete(&self.pool, id, result_reference).await?)
    }

    async fn fail(&self, id: &str, error_message: &str) -> Result<bool, StoreError> {
        Ok(JobRepo::fail(&self.pool, id, error_message).await?)
    }

    async fn cancel(&self, id: &str, owner_id: &str) -> Result<CancelOutcome, StoreError> {
        if JobRepo::cancel(&self.pool, id, owner_id).await? {
            return Ok(CancelOutcome::Cancelled);
        }
        // Nothing changed: either not ours / missing, or already terminal.
        tracing::debug!(job_id = id, "Cancel did not change any row");
        Ok(match JobRepo::find_for_owner(&self.pool, id, owner_id).await? {
            Some(job) => CancelOutcome::AlreadyTerminal(job.status()),
            None => CancelOutcome::NotFound,
        })
    }
}
