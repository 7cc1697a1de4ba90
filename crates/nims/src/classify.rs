//! Transient-error classifier.
//!
//! Maps a provider HTTP status (plus its error body, when readable) or a
//! transport failure to the retry policy the polling loop applies. Pure
//! functions only; no logging, no I/O.

use std::time::Duration;

/// Longest slice of a raw error body echoed back to callers.
const MAX_BODY_ECHO: usize = 300;

/// How a failed provider call should be treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// 400/401/403/422: never retried. `reason` is shown to the caller.
    Fatal { status: u16, reason: String },
    /// 429: back off and retry, counted apart from transient failures.
    RateLimited { retry_after: Option<Duration> },
    /// 502/503/504 or a connection-level failure (`status` is `None`).
    Transient { status: Option<u16>, reason: String },
    /// Anything else. Retried like a transient failure but logged apart.
    Unknown { status: u16 },
}

impl Classification {
    /// Whether the call may be retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Classification::Fatal { .. })
    }

    /// HTTP status behind this classification, if there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Classification::Fatal { status, .. } | Classification::Unknown { status } => {
                Some(*status)
            }
            Classification::RateLimited { .. } => Some(429),
            Classification::Transient { status, .. } => *status,
        }
    }

    /// Message suitable for `progress_message` / `error_message`.
    pub fn user_message(&self) -> String {
        match self {
            Classification::Fatal { reason, .. } => reason.clone(),
            Classification::RateLimited { .. } => {
                "Provider rate limit reached (HTTP 429)".to_string()
            }
            Classification::Transient { reason, .. } => reason.clone(),
            Classification::Unknown { status } => {
                format!("Unexpected provider response (HTTP {status})")
            }
        }
    }
}

/// Classify a non-success HTTP response.
///
/// `body` is the raw response text; for fatal statuses the provider's
/// `detail` / `message` / `error` field is passed through verbatim.
pub fn classify_status(status: u16, body: &str) -> Classification {
    match status {
        400 | 401 | 403 | 422 => Classification::Fatal {
            status,
            reason: fatal_reason(status, body),
        },
        429 => Classification::RateLimited { retry_after: None },
        502 => transient(status, "Bad gateway (HTTP 502) from provider"),
        503 => transient(status, "Provider service unavailable (HTTP 503)"),
        504 => transient(status, "Gateway timeout (HTTP 504) from provider"),
        _ => Classification::Unknown { status },
    }
}

/// Classify a request that never produced an HTTP response.
pub fn classify_transport(err: &reqwest::Error) -> Classification {
    let reason = if err.is_timeout() {
        "Request to provider timed out".to_string()
    } else if err.is_connect() {
        "Could not connect to provider".to_string()
    } else {
        format!("Network error talking to provider: {err}")
    };
    Classification::Transient {
        status: None,
        reason,
    }
}

fn transient(status: u16, reason: &str) -> Classification {
    Classification::Transient {
        status: Some(status),
        reason: reason.to_string(),
    }
}

fn fatal_reason(status: u16, body: &str) -> String {
    let prefix = match status {
        401 => "Authentication with provider failed (HTTP 401); check NVIDIA_API_KEY",
        403 => "Provider denied access (HTTP 403)",
        422 => "Provider rejected the parameters (HTTP 422)",
        _ => "Provider rejected the request (HTTP 400)",
    };
    match error_detail(body) {
        Some(detail) => format!("{prefix}: {detail}"),
        None => prefix.to_string(),
    }
}

/// Pull the human-readable detail out of a provider error body.
///
/// Handles `{"detail": "..."}`, FastAPI-style `{"detail": [{"msg": ...}]}`,
/// `{"message": ...}` and `{"error": ...}`; falls back to the raw text.
pub fn error_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return Some(truncate(trimmed));
    };

    for key in ["detail", "message", "error", "title"] {
        match json.get(key) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(serde_json::Value::Array(items)) if !items.is_empty() => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| match item.get("msg").and_then(|m| m.as_str()) {
                        Some(msg) => match item.get("loc").and_then(|l| l.as_array()) {
                            Some(loc) => {
                                let field = loc
                                    .iter()
                                    .filter_map(|p| p.as_str())
                                    .filter(|p| *p != "body")
                                    .collect::<Vec<_>>()
                                    .join(".");
                                if field.is_empty() {
                                    msg.to_string()
                                } else {
                                    format!("{field}: {msg}")
                                }
                            }
                            None => msg.to_string(),
                        },
                        None => item.to_string(),
                    })
                    .collect();
                return Some(parts.join("; "));
            }
            Some(serde_json::Value::Object(inner)) => {
                if let Some(msg) = inner.get("message").and_then(|m| m.as_str()) {
                    return Some(msg.to_string());
                }
            }
            _ => {}
        }
    }
    Some(truncate(trimmed))
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_BODY_ECHO {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX_BODY_ECHO).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_statuses_are_not_retryable() {
        for status in [400, 401, 403, 422] {
            let c = classify_status(status, "");
            assert!(matches!(c, Classification::Fatal { .. }), "{status}");
            assert!(!c.is_retryable());
        }
    }

    #[test]
    fn unprocessable_entity_passes_detail_through() {
        let c = classify_status(422, r#"{"detail": "contigs required"}"#);
        assert_eq!(
            c,
            Classification::Fatal {
                status: 422,
                reason: "Provider rejected the parameters (HTTP 422): contigs required".into(),
            }
        );
    }

    #[test]
    fn fastapi_validation_list_is_flattened() {
        let body = r#"{"detail":[{"loc":["body","diffusion_steps"],"msg":"ensure this value is less than or equal to 100"}]}"#;
        assert_eq!(
            error_detail(body).as_deref(),
            Some("diffusion_steps: ensure this value is less than or equal to 100")
        );
    }

    #[test]
    fn gateway_errors_are_transient() {
        for status in [502, 503, 504] {
            let c = classify_status(status, "<html>upstream</html>");
            assert_eq!(c.status(), Some(status));
            assert!(matches!(c, Classification::Transient { .. }));
            assert!(c.is_retryable());
        }
        assert!(classify_status(504, "")
            .user_message()
            .to_lowercase()
            .contains("gateway timeout"));
    }

    #[test]
    fn rate_limit_is_its_own_kind() {
        assert_eq!(
            classify_status(429, ""),
            Classification::RateLimited { retry_after: None }
        );
    }

    #[test]
    fn other_statuses_are_unknown_but_retryable() {
        for status in [404, 409, 500, 418] {
            let c = classify_status(status, "");
            assert_eq!(c, Classification::Unknown { status });
            assert!(c.is_retryable());
        }
    }

    #[test]
    fn long_plain_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let detail = error_detail(&body).unwrap();
        assert!(detail.ends_with("..."));
        assert_eq!(detail.chars().count(), MAX_BODY_ECHO + 3);
    }
}
