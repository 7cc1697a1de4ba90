//! REST client for the NVIDIA Health API.
//!
//! Wraps capability submission (`POST <base><endpoint>`) and status lookup
//! (`GET <status_url>/<request_id>`) using [`reqwest`]. Responses are parsed
//! into typed variants; failures are reported as a [`Classification`] so the
//! caller can apply its retry policy.

use std::sync::Arc;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;

use crate::artifact::{extract_artifact, unwrap_envelopes};
use crate::backoff::parse_retry_after;
use crate::classify::{classify_status, classify_transport, error_detail, Classification};
use crate::config::ProviderConfig;
use crate::error::JobError;

/// Response header carrying the accepted request id.
const REQUEST_ID_HEADER: &str = "nvcf-reqid";

/// Body keys that may carry the accepted request id, in order.
const REQUEST_ID_KEYS: &[&str] = &["request_id", "reqId", "id"];

/// Provider status values meaning "not finished yet".
const PENDING_STATES: &[&str] = &["queued", "pending", "running", "in_progress", "processing"];

/// Provider status values meaning the job ended without a result.
const FAILED_STATES: &[&str] = &["failed", "error", "cancelled"];

/// Outcome of a successful submission call.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResponse {
    /// The provider answered synchronously with the full result.
    Inline(Value),
    /// The provider accepted the job; poll with this id.
    Accepted { request_id: String },
}

/// Outcome of one status lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusResponse {
    /// Still running. `status` is the provider's own word for it, if any.
    Pending { status: Option<String> },
    /// Finished with this response body.
    Completed(Value),
    /// The provider reports the job failed.
    Failed(String),
}

enum Attempt {
    Done(SubmitResponse),
    Retry(Classification),
    Fail(JobError),
}

/// HTTP client for one polling campaign.
pub struct NimsApi {
    client: reqwest::Client,
    config: Arc<ProviderConfig>,
}

impl NimsApi {
    pub fn new(client: reqwest::Client, config: Arc<ProviderConfig>) -> Self {
        Self { client, config }
    }

    /// Submit a payload, retrying transient failures with backoff.
    ///
    /// Fatal classifications fail immediately with the provider's reason.
    pub async fn submit(
        &self,
        endpoint_path: &str,
        payload: &Value,
        result_keys: &[&str],
    ) -> Result<SubmitResponse, JobError> {
        let attempts = self.config.submit_attempts.max(1);
        let url = self.config.endpoint(endpoint_path);

        for attempt in 1..=attempts {
            let classification = match self.submit_once(&url, payload, result_keys).await {
                Attempt::Done(response) => return Ok(response),
                Attempt::Fail(err) => return Err(err),
                Attempt::Retry(classification) => classification,
            };

            if attempt == attempts {
                return Err(match classification {
                    Classification::RateLimited { .. } => JobError::RateLimited { attempts },
                    other => JobError::from_classification(other),
                });
            }

            let retry_after = match &classification {
                Classification::RateLimited { retry_after } => *retry_after,
                _ => None,
            };
            let delay = self.config.backoff.delay(attempt, retry_after);
            tracing::warn!(
                url = %url,
                attempt,
                attempts,
                status = ?classification.status(),
                delay_ms = delay.as_millis() as u64,
                "Submission failed transiently, retrying",
            );
            tokio::time::sleep(delay).await;
        }

        Err(JobError::MalformedResponse(
            "submission produced no attempts".to_string(),
        ))
    }

    async fn submit_once(&self, url: &str, payload: &Value, result_keys: &[&str]) -> Attempt {
        let api_key = match self.config.api_key() {
            Ok(key) => key,
            Err(e) => return Attempt::Fail(e),
        };

        let response = match self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(classify_transport(&e)),
        };

        let status = response.status();
        let headers = response.headers().clone();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return Attempt::Retry(classify_transport(&e)),
        };

        if !status.is_success() {
            let classification = with_retry_after(classify_status(status.as_u16(), &text), &headers);
            return if classification.is_retryable() {
                Attempt::Retry(classification)
            } else {
                Attempt::Fail(JobError::from_classification(classification))
            };
        }

        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(body) => body,
                Err(e) => {
                    return Attempt::Fail(JobError::MalformedResponse(format!(
                        "submission response is not JSON: {e}"
                    )))
                }
            }
        };

        match interpret_submission(status, &headers, body, result_keys) {
            Ok(response) => Attempt::Done(response),
            Err(e) => Attempt::Fail(e),
        }
    }

    /// Look up the status of an accepted request.
    pub async fn status(&self, request_id: &str) -> Result<StatusResponse, Classification> {
        let api_key = self.config.api_key().map_err(|e| Classification::Fatal {
            status: 401,
            reason: e.to_string(),
        })?;

        let response = self
            .client
            .get(self.config.status_endpoint(request_id))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await.map_err(|e| classify_transport(&e))?;

        if status == StatusCode::ACCEPTED {
            let provider_status = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|body| status_field(&body));
            return Ok(StatusResponse::Pending {
                status: provider_status,
            });
        }
        if !status.is_success() {
            return Err(with_retry_after(
                classify_status(status.as_u16(), &text),
                &headers,
            ));
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| Classification::Transient {
            status: Some(status.as_u16()),
            reason: format!("Malformed status response from provider: {e}"),
        })?;
        Ok(interpret_status(body))
    }
}

/// Decide between an inline result and an accepted request.
fn interpret_submission(
    status: StatusCode,
    headers: &HeaderMap,
    body: Value,
    result_keys: &[&str],
) -> Result<SubmitResponse, JobError> {
    if status == StatusCode::OK && extract_artifact(&body, result_keys).is_some() {
        return Ok(SubmitResponse::Inline(body));
    }

    let from_header = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let request_id = from_header.or_else(|| {
        REQUEST_ID_KEYS.iter().find_map(|key| match body.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    });

    match request_id {
        Some(request_id) => Ok(SubmitResponse::Accepted { request_id }),
        None => Err(JobError::MalformedResponse(format!(
            "HTTP {} response carried neither a result nor a request id",
            status.as_u16()
        ))),
    }
}

/// Map a 200 status body to pending, failed or completed.
fn interpret_status(body: Value) -> StatusResponse {
    match status_field(&body) {
        Some(state) if PENDING_STATES.contains(&state.as_str()) => {
            StatusResponse::Pending {
                status: Some(state),
            }
        }
        Some(state) if FAILED_STATES.contains(&state.as_str()) => {
            let detail = error_detail(&body.to_string())
                .unwrap_or_else(|| format!("provider reported status '{state}'"));
            StatusResponse::Failed(detail)
        }
        _ => StatusResponse::Completed(unwrap_envelopes(&body)),
    }
}

fn status_field(body: &Value) -> Option<String> {
    body.get("status")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_lowercase())
}

fn with_retry_after(classification: Classification, headers: &HeaderMap) -> Classification {
    match classification {
        Classification::RateLimited { .. } => Classification::RateLimited {
            retry_after: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after),
        },
        other => other,
    }
}
