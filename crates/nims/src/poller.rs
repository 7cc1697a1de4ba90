//! Provider polling loop.
//!
//! One campaign per accepted request: wait `poll_interval`, re-check the
//! job store for cancellation, ask the provider for status, classify the
//! answer. The loop ends on completion, a fatal answer, an exhausted
//! failure ceiling, the wall-clock budget, cancellation or shutdown.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::api::{NimsApi, StatusResponse};
use crate::backoff::RetryBackoff;
use crate::classify::Classification;
use crate::config::ProviderConfig;
use crate::error::JobError;

/// Percentage reported once the provider has accepted the job.
pub const ACCEPTED_PERCENT: f64 = 5.0;

/// Ceiling for the elapsed-time progress proxy.
pub const MAX_POLLING_PERCENT: f64 = 95.0;

/// Tunables for one polling campaign.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_transient_failures: u32,
    /// Total wall-clock budget for the campaign.
    pub budget: Duration,
    /// Budget already used before this loop started (resumed campaigns).
    pub already_elapsed: Duration,
    pub backoff: RetryBackoff,
}

impl PollSettings {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            interval: config.poll_interval,
            max_transient_failures: config.max_transient_failures.max(1),
            budget: config.max_poll_duration,
            already_elapsed: Duration::ZERO,
            backoff: config.backoff.clone(),
        }
    }

    /// Resume with part of the budget already spent.
    pub fn resumed(mut self, already_elapsed: Duration) -> Self {
        self.already_elapsed = already_elapsed;
        self
    }
}

/// How a campaign ended without an error.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The provider finished; this is its final response body.
    Completed(Value),
    /// The job was cancelled in the store.
    Cancelled,
    /// The process is shutting down. The job is left `running` so it can be
    /// resumed on the next start.
    Interrupted,
}

/// Callbacks from the loop to whoever owns the job.
#[async_trait]
pub trait PollContext: Send + Sync {
    /// Advisory progress; `percent` never decreases within a campaign.
    async fn report(&self, message: &str, percent: f64);

    /// Whether the job has been cancelled in the store.
    async fn is_cancelled(&self) -> bool;
}

/// Elapsed-time progress proxy, kept non-decreasing.
#[derive(Debug)]
struct Progress {
    last: f64,
}

impl Progress {
    fn new() -> Self {
        Self {
            last: ACCEPTED_PERCENT,
        }
    }

    fn advance(&mut self, elapsed: Duration, budget: Duration) -> f64 {
        let fraction = if budget.is_zero() {
            1.0
        } else {
            elapsed.as_secs_f64() / budget.as_secs_f64()
        };
        let percent = (fraction * MAX_POLLING_PERCENT).clamp(ACCEPTED_PERCENT, MAX_POLLING_PERCENT);
        self.last = self.last.max(percent);
        self.last
    }
}

/// Poll `request_id` until it reaches a terminal outcome.
///
/// Errors are terminal job failures; the caller records them on the job.
pub async fn poll_until_done(
    api: &NimsApi,
    request_id: &str,
    settings: &PollSettings,
    ctx: &dyn PollContext,
    cancel: &CancellationToken,
) -> Result<PollOutcome, JobError> {
    let started = Instant::now();
    let elapsed = || settings.already_elapsed + started.elapsed();
    let max_failures = settings.max_transient_failures.max(1);

    let mut progress = Progress::new();
    let mut acknowledged = false;
    let mut transient_failures: u32 = 0;
    let mut rate_limited: u32 = 0;
    let mut wait = settings.interval;

    loop {
        let remaining = settings.budget.saturating_sub(elapsed());
        tokio::select! {
            _ = cancel.cancelled() => {
                return Ok(if ctx.is_cancelled().await {
                    PollOutcome::Cancelled
                } else {
                    PollOutcome::Interrupted
                });
            }
            _ = tokio::time::sleep(wait.min(remaining)) => {}
        }

        if ctx.is_cancelled().await {
            tracing::info!(request_id, "Job cancelled, stopping polling");
            return Ok(PollOutcome::Cancelled);
        }

        let spent = elapsed();
        if spent >= settings.budget {
            tracing::error!(
                request_id,
                elapsed_secs = spent.as_secs(),
                "Polling budget exhausted",
            );
            return Err(JobError::PollingBudgetExceeded {
                elapsed_secs: spent.as_secs(),
            });
        }

        match api.status(request_id).await {
            Ok(StatusResponse::Pending { status }) => {
                acknowledged = true;
                transient_failures = 0;
                rate_limited = 0;
                wait = settings.interval;

                let state = status.as_deref().unwrap_or("pending");
                let percent = progress.advance(elapsed(), settings.budget);
                tracing::debug!(request_id, state, percent, "Provider job still running");
                ctx.report(&format!("Provider status: {state}"), percent).await;
            }
            Ok(StatusResponse::Completed(body)) => {
                tracing::info!(request_id, "Provider job completed");
                ctx.report("Provider finished; storing result", MAX_POLLING_PERCENT)
                    .await;
                return Ok(PollOutcome::Completed(body));
            }
            Ok(StatusResponse::Failed(message)) => {
                tracing::error!(request_id, error = %message, "Provider reported failure");
                return Err(JobError::ProviderFailed(message));
            }
            Err(Classification::Unknown { status: 404 }) if !acknowledged => {
                tracing::error!(request_id, "Provider does not know this request");
                return Err(JobError::ProviderRejected {
                    request_id: request_id.to_string(),
                });
            }
            Err(classification @ Classification::Fatal { .. }) => {
                tracing::error!(
                    request_id,
                    status = ?classification.status(),
                    "Fatal provider response while polling",
                );
                return Err(JobError::from_classification(classification));
            }
            Err(Classification::RateLimited { retry_after }) => {
                rate_limited += 1;
                if rate_limited >= max_failures {
                    tracing::error!(request_id, rate_limited, "Provider rate limit persisted");
                    return Err(JobError::RateLimited {
                        attempts: rate_limited,
                    });
                }
                wait = settings
                    .backoff
                    .delay(rate_limited, retry_after)
                    .max(settings.interval);
                tracing::warn!(
                    request_id,
                    rate_limited,
                    delay_ms = wait.as_millis() as u64,
                    "Provider rate limited status polling, backing off",
                );
                let percent = progress.advance(elapsed(), settings.budget);
                ctx.report(
                    &format!(
                        "Provider rate limit reached (HTTP 429); waiting {}s",
                        wait.as_secs()
                    ),
                    percent,
                )
                .await;
            }
            Err(classification) => {
                transient_failures += 1;
                wait = settings.interval;
                let message = classification.user_message();

                if let Classification::Unknown { status } = &classification {
                    tracing::warn!(
                        request_id,
                        status = *status,
                        consecutive = transient_failures,
                        "Unexpected provider status while polling, treating as transient",
                    );
                } else {
                    tracing::warn!(
                        request_id,
                        status = ?classification.status(),
                        consecutive = transient_failures,
                        error = %message,
                        "Transient provider failure while polling",
                    );
                }

                if transient_failures >= max_failures {
                    tracing::error!(
                        request_id,
                        failures = transient_failures,
                        "Transient failure ceiling reached",
                    );
                    return Err(JobError::PollingFailed {
                        failures: transient_failures,
                        last_error: message,
                    });
                }

                let percent = progress.advance(elapsed(), settings.budget);
                ctx.report(
                    &format!("{message}; retry {transient_failures}/{max_failures}"),
                    percent,
                )
                .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_starts_at_accepted_floor() {
        let mut progress = Progress::new();
        let p = progress.advance(Duration::ZERO, Duration::from_secs(3600));
        assert_eq!(p, ACCEPTED_PERCENT);
    }

    #[test]
    fn progress_is_capped_and_monotonic() {
        let mut progress = Progress::new();
        let budget = Duration::from_secs(100);
        let half = progress.advance(Duration::from_secs(50), budget);
        assert!((half - 47.5).abs() < 1e-9);

        let over = progress.advance(Duration::from_secs(500), budget);
        assert_eq!(over, MAX_POLLING_PERCENT);

        let earlier = progress.advance(Duration::from_secs(10), budget);
        assert_eq!(earlier, MAX_POLLING_PERCENT);
    }

    #[test]
    fn resumed_settings_carry_spent_budget() {
        let settings = PollSettings::from_config(&ProviderConfig::default())
            .resumed(Duration::from_secs(600));
        assert_eq!(settings.already_elapsed, Duration::from_secs(600));
        assert_eq!(settings.budget, Duration::from_secs(3600));
    }
}
