//! Job lifecycle events broadcast by the job manager.
//!
//! Advisory only: the job store stays the source of truth. Subscribers
//! that lag behind simply miss events.

use helix_core::job_events::{
    MSG_TYPE_JOB_ACCEPTED, MSG_TYPE_JOB_CANCELLED, MSG_TYPE_JOB_COMPLETED, MSG_TYPE_JOB_FAILED,
    MSG_TYPE_JOB_PROGRESS,
};
use helix_core::types::JobId;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Advisory progress from the submission or polling phase.
    JobProgress {
        job_id: JobId,
        /// Completion percentage (0-100), non-decreasing per job.
        percent: f64,
        message: String,
    },

    /// The provider accepted the job and returned a request id.
    JobAccepted { job_id: JobId, request_id: String },

    /// The artifact was stored and the job marked `completed`.
    JobCompleted {
        job_id: JobId,
        result_reference: String,
    },

    /// The job ended in `error`.
    JobFailed { job_id: JobId, error: String },

    /// The job was cancelled by its owner.
    JobCancelled { job_id: JobId },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::JobProgress { job_id, .. }
            | JobEvent::JobAccepted { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. }
            | JobEvent::JobFailed { job_id, .. }
            | JobEvent::JobCancelled { job_id } => job_id,
        }
    }

    /// The serialized `type` tag.
    pub fn msg_type(&self) -> &'static str {
        match self {
            JobEvent::JobProgress { .. } => MSG_TYPE_JOB_PROGRESS,
            JobEvent::JobAccepted { .. } => MSG_TYPE_JOB_ACCEPTED,
            JobEvent::JobCompleted { .. } => MSG_TYPE_JOB_COMPLETED,
            JobEvent::JobFailed { .. } => MSG_TYPE_JOB_FAILED,
            JobEvent::JobCancelled { .. } => MSG_TYPE_JOB_CANCELLED,
        }
    }
}
