use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use helix_core::error::CoreError;
use helix_core::validation::FieldError;
use helix_db::StoreError;
use helix_nims::error::JobError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`JobError`] for domain errors and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce
/// consistent `{ "error", "code" }` JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `helix_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An error from the job handler.
    #[error(transparent)]
    Job(#[from] JobError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request carries no caller identity.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

/// Status, machine-readable code, message and optional field details.
type Rendered = (StatusCode, &'static str, String, Option<Vec<FieldError>>);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Job(job) => classify_job_error(job),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), None)
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = json!(details);
        }

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(err: &CoreError) -> Rendered {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} {id} not found"),
            None,
        ),
        CoreError::Configuration(msg) => configuration(msg),
    }
}

/// Map job handler errors to responses.
///
/// Only synchronous caller-facing errors get a specific status; anything
/// else reaching a handler is an internal failure and is sanitized.
fn classify_job_error(err: &JobError) -> Rendered {
    match err {
        JobError::Validation(report) => validation(report),
        JobError::Configuration(msg) => configuration(msg),
        JobError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            err.to_string(),
            None,
        ),
        JobError::ResultUnavailable { .. } => (
            StatusCode::CONFLICT,
            "RESULT_UNAVAILABLE",
            err.to_string(),
            None,
        ),
        JobError::Store(StoreError::Duplicate(_)) => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string(), None)
        }
        other => {
            tracing::error!(error = %other, "Job handler error");
            internal()
        }
    }
}

fn validation(report: &helix_core::validation::ValidationReport) -> Rendered {
    (
        StatusCode::BAD_REQUEST,
        "VALIDATION_ERROR",
        format!("Validation failed: {report}"),
        Some(report.errors().to_vec()),
    )
}

fn configuration(msg: &str) -> Rendered {
    tracing::warn!(error = %msg, "Request refused: server is not configured");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "CONFIGURATION_ERROR",
        msg.to_string(),
        None,
    )
}

fn internal() -> Rendered {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
        None,
    )
}
