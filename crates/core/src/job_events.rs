//! Event type names for job lifecycle notifications.
//!
//! Used as the `type` field when job events are serialized for
//! subscribers of the job manager's broadcast channel.

/// Progress update while a job is being submitted or polled.
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Provider accepted the job and returned a request id.
pub const MSG_TYPE_JOB_ACCEPTED: &str = "job_accepted";

/// Job completed and its artifact was stored.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed, timed out or was rejected by the provider.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// Job was cancelled by its owner or by shutdown.
pub const MSG_TYPE_JOB_CANCELLED: &str = "job_cancelled";
