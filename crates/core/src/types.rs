/// Job identifiers are opaque strings (UUID v7 when generated server-side).
pub type JobId = String;

/// Identifier of the principal that submitted a job.
pub type OwnerId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a new time-ordered job identifier.
pub fn new_job_id() -> JobId {
    uuid::Uuid::now_v7().to_string()
}
