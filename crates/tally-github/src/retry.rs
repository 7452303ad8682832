use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Statuses worth another attempt: request timeout, conflict, too early,
/// rate limited and the transient server errors.
pub const RETRYABLE_STATUSES: [u16; 8] = [408, 409, 425, 429, 500, 502, 503, 504];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
    pub max_signal_wait: Duration,
    pub rate_limit_margin: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(350),
            max_delay: Duration::from_millis(4_000),
            max_jitter: Duration::from_millis(180),
            max_signal_wait: Duration::from_millis(300_000),
            rate_limit_margin: Duration::from_millis(500),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests against local servers.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
            max_signal_wait: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Draws a jitter value in `0..max_jitter`.
    pub fn sample_jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max))
    }

    /// Wait before the next attempt after `attempt` (1-based) failed.
    ///
    /// An explicit `retry-after` wins, then an exhausted rate limit's reset
    /// time, then exponential backoff with jitter.
    pub fn backoff_delay(
        &self,
        attempt: u32,
        signals: Option<&RetrySignals>,
        now: DateTime<Utc>,
        jitter: Duration,
    ) -> Duration {
        if let Some(wait) = signals.and_then(|signals| signals.hinted_wait(self, now)) {
            return wait;
        }

        let exponent = attempt.saturating_sub(1).min(20);
        let exponential = self.base_delay.saturating_mul(1u32 << exponent);
        exponential.saturating_add(jitter).min(self.max_delay)
    }
}

/// Retry hints carried by a failed response's headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrySignals {
    pub retry_after: Option<String>,
    pub rate_limit_remaining: Option<String>,
    pub rate_limit_reset: Option<String>,
}

impl RetrySignals {
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        Self {
            retry_after: header("retry-after"),
            rate_limit_remaining: header("x-ratelimit-remaining"),
            rate_limit_reset: header("x-ratelimit-reset"),
        }
    }

    pub fn hinted_wait(&self, policy: &RetryPolicy, now: DateTime<Utc>) -> Option<Duration> {
        self.retry_after_wait(policy, now)
            .or_else(|| self.rate_limit_wait(policy, now))
    }

    fn retry_after_wait(&self, policy: &RetryPolicy, now: DateTime<Utc>) -> Option<Duration> {
        let raw = self.retry_after.as_deref()?;
        if let Ok(seconds) = raw.parse::<u64>() {
            return Some(Duration::from_secs(seconds).min(policy.max_signal_wait));
        }

        let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
        positive_wait(retry_at.signed_duration_since(now).num_milliseconds())
            .map(|wait| wait.min(policy.max_signal_wait))
    }

    fn rate_limit_wait(&self, policy: &RetryPolicy, now: DateTime<Utc>) -> Option<Duration> {
        if self.rate_limit_remaining.as_deref() != Some("0") {
            return None;
        }
        let reset_epoch = self.rate_limit_reset.as_deref()?.parse::<i64>().ok()?;
        let margin = policy.rate_limit_margin.as_millis() as i64;
        let wait_ms = reset_epoch
            .saturating_mul(1_000)
            .saturating_sub(now.timestamp_millis())
            .saturating_add(margin);
        positive_wait(wait_ms).map(|wait| wait.min(policy.max_signal_wait))
    }
}

fn positive_wait(millis: i64) -> Option<Duration> {
    (millis > 0).then(|| Duration::from_millis(millis as u64))
}

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// A rejected conditional write: 409, or 422 complaining about the file sha.
pub fn is_write_conflict(status: u16, message: &str) -> bool {
    if status == 409 {
        return true;
    }
    if status != 422 {
        return false;
    }
    let message = message.to_ascii_lowercase();
    ["sha", "conflict", "update"]
        .iter()
        .any(|needle| message.contains(needle))
}
