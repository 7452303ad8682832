use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use crate::document::PreviousDocument;

/// Reuses the previously published total when the document is recent enough.
///
/// The aggregate total can take a full pagination of every release, so runs
/// scheduled more often than `min_refresh_minutes` reuse the stored value.
/// A document stamped in the future is never trusted.
pub fn fresh_cached_total(
    previous: Option<&PreviousDocument>,
    owner: &str,
    repo: &str,
    now: DateTime<Utc>,
    min_refresh_minutes: u32,
) -> Option<u64> {
    if min_refresh_minutes == 0 {
        return None;
    }

    let previous = previous?;
    if !previous.is_same_repository(owner, repo) {
        return None;
    }

    let generated_at = DateTime::parse_from_rfc3339(previous.generated_at()?)
        .ok()?
        .with_timezone(&Utc);
    let total = recorded_total(previous.total_value()?)?;

    let age = now.signed_duration_since(generated_at);
    if age < TimeDelta::zero() || age > TimeDelta::minutes(i64::from(min_refresh_minutes)) {
        return None;
    }

    Some(total)
}

/// A stored `stats.total`, accepted only as a finite non-negative integer.
pub fn recorded_total(value: &Value) -> Option<u64> {
    if let Some(total) = value.as_u64() {
        return Some(total);
    }

    let number = value.as_f64()?;
    if number.is_finite() && number >= 0.0 && number.fract() == 0.0 {
        Some(number as u64)
    } else {
        None
    }
}
