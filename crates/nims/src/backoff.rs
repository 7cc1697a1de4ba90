//! Retry delays for submissions and rate-limited polls.
//!
//! The regular poll cadence is fixed. A [`RetryBackoff`] only decides how
//! long to wait after a failed call: the provider's own `Retry-After` hint
//! when it sent one, otherwise a doubling delay. Both are capped.

use std::time::Duration;

/// Doubling retry delay with an upper bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBackoff {
    /// Wait before the first retry.
    pub base: Duration,
    /// No single wait exceeds this, including provider hints.
    pub cap: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

impl RetryBackoff {
    /// Wait before retry number `retry` (1-based).
    ///
    /// `retry_after` is the provider's `Retry-After`, which replaces the
    /// computed delay.
    pub fn delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let wait = retry_after.unwrap_or_else(|| {
            let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
            self.base.saturating_mul(factor)
        });
        wait.min(self.cap)
    }
}

/// Parse a `Retry-After` header value given in whole seconds.
///
/// HTTP-date values are ignored; callers fall back to their own backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computed_delay_doubles_up_to_the_cap() {
        let backoff = RetryBackoff::default();
        let expected = [1, 2, 4, 8, 16, 30, 30, 30];

        for (retry, &secs) in (1..).zip(expected.iter()) {
            assert_eq!(backoff.delay(retry, None), Duration::from_secs(secs));
        }
        assert_eq!(backoff.delay(200, None), Duration::from_secs(30));
    }

    #[test]
    fn provider_hint_wins_but_is_capped() {
        let backoff = RetryBackoff::default();
        assert_eq!(
            backoff.delay(4, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(backoff.delay(1, Some(Duration::ZERO)), Duration::ZERO);
        assert_eq!(
            backoff.delay(1, Some(Duration::from_secs(600))),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn retry_after_accepts_seconds_only() {
        assert_eq!(parse_retry_after(" 12 "), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
