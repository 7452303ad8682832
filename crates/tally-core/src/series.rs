use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use serde_json::Value;

use crate::StatsError;

pub const SNAPSHOT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Cumulative download totals keyed by UTC calendar date, ascending.
///
/// Serializes as a JSON object of `"YYYY-MM-DD": total` pairs. Stored
/// documents are untrusted, so the only way back in is
/// [`SnapshotSeries::from_untrusted`], which drops anything malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SnapshotSeries(BTreeMap<NaiveDate, u64>);

impl SnapshotSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps entries whose key is a `YYYY-MM-DD` calendar date and whose value
    /// is a finite, non-negative number (floored). Everything else is dropped.
    pub fn from_untrusted(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        object
            .iter()
            .filter_map(|(date, total)| {
                let date = parse_snapshot_date(date).ok()?;
                let total = sanitize_total(total)?;
                Some((date, total))
            })
            .collect()
    }

    pub fn insert(&mut self, date: NaiveDate, total: u64) -> Option<u64> {
        self.0.insert(date, total)
    }

    pub fn get(&self, date: NaiveDate) -> Option<u64> {
        self.0.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<(NaiveDate, u64)> {
        self.0.first_key_value().map(|(date, total)| (*date, *total))
    }

    pub fn last(&self) -> Option<(NaiveDate, u64)> {
        self.0.last_key_value().map(|(date, total)| (*date, *total))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (NaiveDate, u64)> + '_ {
        self.0.iter().map(|(date, total)| (*date, *total))
    }

    pub fn entries(&self) -> Vec<(NaiveDate, u64)> {
        self.iter().collect()
    }
}

impl FromIterator<(NaiveDate, u64)> for SnapshotSeries {
    fn from_iter<T: IntoIterator<Item = (NaiveDate, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parses a strict `YYYY-MM-DD` calendar date.
pub fn parse_snapshot_date(value: &str) -> Result<NaiveDate, StatsError> {
    let bytes = value.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    if !shaped {
        return Err(StatsError::InvalidDate(value.to_owned()));
    }

    NaiveDate::parse_from_str(value, SNAPSHOT_DATE_FORMAT)
        .map_err(|_| StatsError::InvalidDate(value.to_owned()))
}

pub fn format_snapshot_date(date: NaiveDate) -> String {
    date.format(SNAPSHOT_DATE_FORMAT).to_string()
}

pub fn validate_total(total: f64) -> Result<u64, StatsError> {
    if !total.is_finite() || total < 0.0 {
        return Err(StatsError::InvalidTotal(total));
    }
    Ok(total.floor() as u64)
}

/// Records `today_total` for `today_date` and keeps only the trailing
/// `window_days` calendar days ending at `today_date`.
///
/// A window of zero is treated as one day so today's snapshot always survives.
pub fn merge_series(
    existing: &SnapshotSeries,
    today_date: &str,
    today_total: f64,
    window_days: u32,
) -> Result<SnapshotSeries, StatsError> {
    let today = parse_snapshot_date(today_date)?;
    let total = validate_total(today_total)?;
    Ok(record_snapshot(existing, today, total, window_days))
}

/// [`merge_series`] for a date and count that are already known to be valid.
pub fn record_snapshot(
    existing: &SnapshotSeries,
    today: NaiveDate,
    total: u64,
    window_days: u32,
) -> SnapshotSeries {
    let span = u64::from(window_days.max(1) - 1);
    let keep_from = today.checked_sub_days(Days::new(span)).unwrap_or(NaiveDate::MIN);

    let mut merged: BTreeMap<NaiveDate, u64> = existing
        .0
        .range(keep_from..=today)
        .map(|(date, value)| (*date, *value))
        .collect();
    merged.insert(today, total);

    SnapshotSeries(merged)
}

fn sanitize_total(value: &Value) -> Option<u64> {
    if let Some(total) = value.as_u64() {
        return Some(total);
    }

    let number = value.as_f64()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    Some(number.floor() as u64)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn date(value: &str) -> NaiveDate {
        parse_snapshot_date(value).expect("valid date")
    }

    fn series(entries: &[(&str, u64)]) -> SnapshotSeries {
        entries
            .iter()
            .map(|(day, total)| (date(day), *total))
            .collect()
    }

    #[test]
    fn merge_keeps_only_the_trailing_window() {
        let existing = series(&[("2026-02-15", 10), ("2026-02-16", 11), ("2026-02-17", 12)]);

        let merged = merge_series(&existing, "2026-02-18", 13.0, 2).expect("merge");

        assert_eq!(merged, series(&[("2026-02-17", 12), ("2026-02-18", 13)]));
    }

    #[test]
    fn merge_overwrites_today_and_floors_the_total() {
        let existing = series(&[("2026-02-18", 40)]);

        let merged = merge_series(&existing, "2026-02-18", 41.9, 45).expect("merge");

        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get(date("2026-02-18")), Some(41));
    }

    #[test]
    fn merge_drops_entries_after_today() {
        let existing = series(&[("2026-02-17", 5), ("2026-02-19", 9)]);

        let merged = merge_series(&existing, "2026-02-18", 6.0, 45).expect("merge");

        assert_eq!(merged, series(&[("2026-02-17", 5), ("2026-02-18", 6)]));
    }

    #[test]
    fn merge_never_exceeds_window_and_always_holds_today() {
        let existing: SnapshotSeries = (1u32..=28)
            .map(|day| (date(&format!("2026-02-{day:02}")), u64::from(day)))
            .collect();

        for window in [1u32, 2, 7, 30, 365] {
            let merged = merge_series(&existing, "2026-02-28", 100.0, window).expect("merge");
            assert!(merged.len() <= window as usize, "window {window}");
            assert_eq!(merged.get(date("2026-02-28")), Some(100));
        }
    }

    #[test]
    fn merge_with_zero_window_still_keeps_today() {
        let merged =
            merge_series(&SnapshotSeries::new(), "2026-02-18", 3.0, 0).expect("merge");
        assert_eq!(merged, series(&[("2026-02-18", 3)]));
    }

    #[test]
    fn merge_rejects_invalid_inputs() {
        let existing = SnapshotSeries::new();

        assert_eq!(
            merge_series(&existing, "2026-2-18", 1.0, 7),
            Err(StatsError::InvalidDate("2026-2-18".to_owned()))
        );
        assert_eq!(
            merge_series(&existing, "2026-02-30", 1.0, 7),
            Err(StatsError::InvalidDate("2026-02-30".to_owned()))
        );
        assert!(matches!(
            merge_series(&existing, "2026-02-18", -1.0, 7),
            Err(StatsError::InvalidTotal(_))
        ));
        assert!(matches!(
            merge_series(&existing, "2026-02-18", f64::NAN, 7),
            Err(StatsError::InvalidTotal(_))
        ));
        assert!(matches!(
            merge_series(&existing, "2026-02-18", f64::INFINITY, 7),
            Err(StatsError::InvalidTotal(_))
        ));
    }

    #[test]
    fn recorded_snapshot_keeps_counts_past_float_precision() {
        let large = (1u64 << 53) + 1;
        let existing = series(&[("2026-02-17", large - 10)]);

        let merged = record_snapshot(&existing, date("2026-02-18"), large, 45);

        assert_eq!(merged.get(date("2026-02-18")), Some(large));
        assert_eq!(merged.get(date("2026-02-17")), Some(large - 10));
    }

    #[test]
    fn untrusted_series_drops_malformed_entries() {
        let raw = json!({
            "2026-02-10": 4,
            "2026-02-11": 5.7,
            "2026-02-12": -1,
            "2026-02-13": "7",
            "2026-02-14": null,
            "yesterday": 3,
            "2026-13-01": 2,
        });

        let parsed = SnapshotSeries::from_untrusted(&raw);

        assert_eq!(parsed, series(&[("2026-02-10", 4), ("2026-02-11", 5)]));
        assert!(SnapshotSeries::from_untrusted(&json!([1, 2, 3])).is_empty());
        assert!(SnapshotSeries::from_untrusted(&Value::Null).is_empty());
    }

    #[test]
    fn series_serializes_as_sorted_date_map() {
        let value = serde_json::to_value(series(&[("2026-02-18", 13), ("2026-02-17", 12)]))
            .expect("serialize");
        assert_eq!(value, json!({"2026-02-17": 12, "2026-02-18": 13}));

        let text = serde_json::to_string(&series(&[("2026-02-18", 2), ("2026-01-31", 1)]))
            .expect("serialize");
        assert_eq!(text, r#"{"2026-01-31":1,"2026-02-18":2}"#);
    }
}
