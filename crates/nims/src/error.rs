//! Error taxonomy for provider-backed jobs.
//!
//! `Validation`, `Configuration` and `NotFound` are returned synchronously to
//! the submitting caller. Everything else happens inside a polling campaign
//! and ends up as the job's `error_message`.

use helix_core::validation::ValidationReport;
use helix_db::StoreError;

use crate::classify::Classification;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Bad caller input. Never retried.
    #[error("Validation failed: {0}")]
    Validation(ValidationReport),

    /// Missing API key or unusable TLS / URL settings.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No job with this id for this owner.
    #[error("Job {0} not found")]
    NotFound(String),

    /// The job exists but has no stored result yet (or never will).
    #[error("Job {job_id} has no result: status is {status}")]
    ResultUnavailable { job_id: String, status: &'static str },

    /// 4xx other than 429 from the provider.
    #[error("{message}")]
    ProviderFatal { status: u16, message: String },

    /// 5xx or network failure that outlived the retry budget.
    #[error("{message}")]
    ProviderTransient { status: Option<u16>, message: String },

    /// The provider kept answering 429.
    #[error("Provider rate limit persisted after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// The wall-clock budget ran out while the provider kept saying "not yet".
    #[error("Timed out: provider did not finish within {elapsed_secs}s polling budget")]
    PollingBudgetExceeded { elapsed_secs: u64 },

    /// 404 on the status endpoint before the provider ever acknowledged the job.
    #[error("Provider request {request_id} was not found by the provider (HTTP 404)")]
    ProviderRejected { request_id: String },

    /// Too many consecutive transient failures while polling.
    #[error("polling_failed: {failures} consecutive transient failures; last error: {last_error}")]
    PollingFailed { failures: u32, last_error: String },

    /// The process stopped before the provider accepted the job.
    #[error("Interrupted before the provider accepted the job; submit it again")]
    InterruptedBeforeAcceptance,

    /// The provider finished the job but reported an error payload.
    #[error("Provider reported failure: {0}")]
    ProviderFailed(String),

    /// A response that does not match the provider's declared schema.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Fetching referenced content (PDB entry, UniProt sequence) failed.
    #[error("External source error: {0}")]
    Source(String),

    /// Writing or reading the result artifact failed.
    #[error("Result storage error: {0}")]
    Artifact(#[from] std::io::Error),

    /// The job store failed.
    #[error("Job store error: {0}")]
    Store(#[from] StoreError),
}

impl JobError {
    /// Error for a failed provider call, per its classification.
    pub fn from_classification(classification: Classification) -> Self {
        match classification {
            Classification::Fatal { status, reason } => JobError::ProviderFatal {
                status,
                message: reason,
            },
            Classification::RateLimited { .. } => JobError::RateLimited { attempts: 1 },
            other => JobError::ProviderTransient {
                status: other.status(),
                message: other.user_message(),
            },
        }
    }
}
