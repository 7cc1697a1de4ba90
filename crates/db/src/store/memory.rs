use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use helix_core::types::new_job_id;
use tokio::sync::RwLock;

use super::{CancelOutcome, JobStore, StoreError};
use crate::models::job::{JobListQuery, JobRecord, NewJob};
use crate::models::status::JobStatus;

/// In-process [`JobStore`] for tests and local development.
///
/// Records are replaced whole under a write lock, so readers never see a
/// partially applied update. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record verbatim. Lets tests seed jobs in any state.
    pub async fn insert(&self, record: JobRecord) {
        self.jobs.write().await.insert(record.id.clone(), record);
    }

    /// Apply `update` to an active job. Returns `false` if the job is
    /// missing or already terminal.
    async fn update_active<F>(&self, id: &str, update: F) -> bool
    where
        F: FnOnce(&mut JobRecord) -> bool,
    {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            Some(job) if !job.is_terminal() => {
                let mut next = job.clone();
                if !update(&mut next) {
                    return false;
                }
                next.updated_at = Utc::now();
                *job = next;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, input: &NewJob) -> Result<JobRecord, StoreError> {
        let id = input.id.clone().unwrap_or_else(new_job_id);
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }

        let now = Utc::now();
        let record = JobRecord {
            id: id.clone(),
            owner_id: input.owner_id.clone(),
            kind: input.kind.as_str().to_string(),
            input_parameters: input.input_parameters.clone(),
            status_id: JobStatus::Queued.id(),
            provider_request_id: None,
            progress: 0.0,
            progress_message: None,
            result_reference: None,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        };
        jobs.insert(id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn find_for_owner(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<JobRecord>, StoreError> {
        Ok(self
            .jobs
            .read()
            .await
            .get(id)
            .filter(|job| job.owner_id == owner_id)
            .cloned())
    }

    async fn list_for_owner(
        &self,
        owner_id: &str,
        query: &JobListQuery,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let status = query.status_filter().map_err(StoreError::UnknownStatus)?;
        let mut jobs: Vec<JobRecord> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.owner_id == owner_id)
            .filter(|job| status.is_none_or(|s| job.status() == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        Ok(jobs
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect())
    }

    async fn list_unfinished(&self) -> Result<Vec<JobRecord>, StoreError> {
        let mut jobs: Vec<JobRecord> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| !job.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn mark_running(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .update_active(id, |job| {
                job.status_id = JobStatus::Running.id();
                job.started_at.get_or_insert_with(Utc::now);
                true
            })
            .await)
    }

    async fn set_provider_request_id(
        &self,
        id: &str,
        request_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .update_active(id, |job| {
                if job.provider_request_id.is_some() {
                    return false;
                }
                job.provider_request_id = Some(request_id.to_string());
                true
            })
            .await)
    }

    async fn update_progress(
        &self,
        id: &str,
        percent: f64,
        message: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .update_active(id, |job| {
                job.progress = percent.clamp(0.0, 100.0);
                job.progress_message = Some(message.to_string());
                true
            })
            .await)
    }

    async fn complete(&self, id: &str, result_reference: &str) -> Result<bool, StoreError> {
        Ok(self
            .update_active(id, |job| {
                job.status_id = JobStatus::Completed.id();
                job.result_reference = Some(result_reference.to_string());
                job.progress = 100.0;
                job.progress_message = Some("Completed".to_string());
                job.completed_at = Some(Utc::now());
                true
            })
            .await)
    }

    async fn fail(&self, id: &str, error_message: &str) -> Result<bool, StoreError> {
        Ok(self
            .update_active(id, |job| {
                job.status_id = JobStatus::Error.id();
                job.error_message = Some(error_message.to_string());
                job.completed_at = Some(Utc::now());
                true
            })
            .await)
    }

    async fn cancel(&self, id: &str, owner_id: &str) -> Result<CancelOutcome, StoreError> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(id).filter(|job| job.owner_id == owner_id) else {
            return Ok(CancelOutcome::NotFound);
        };
        if job.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(job.status()));
        }

        let now = Utc::now();
        job.status_id = JobStatus::Cancelled.id();
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(CancelOutcome::Cancelled)
    }
}
