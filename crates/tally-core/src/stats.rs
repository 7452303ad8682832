use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::StatsError;
use crate::series::{SnapshotSeries, parse_snapshot_date};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Day, Period::Week, Period::Month];

    pub fn days(self) -> u64 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
            Self::Month => 30,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

/// The snapshot subtracted from the current total to produce a period delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub date: NaiveDate,
    pub value: u64,
    /// `true` when `date` is not the requested cutoff.
    pub partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodDelta {
    pub value: u64,
    pub partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: u64,
    pub day: u64,
    pub week: u64,
    pub month: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Partial {
    pub day: bool,
    pub week: bool,
    pub month: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSummary {
    pub stats: Stats,
    pub partial: Partial,
}

/// Chooses a baseline from ascending `entries` for `cutoff`.
///
/// Preference: exact date, then the earliest entry after the cutoff, then the
/// latest entry before it. Only an exact match is non-partial.
pub fn pick_baseline(entries: &[(NaiveDate, u64)], cutoff: NaiveDate) -> Option<Baseline> {
    if let Some((date, value)) = entries.iter().find(|(date, _)| *date == cutoff) {
        return Some(Baseline {
            date: *date,
            value: *value,
            partial: false,
        });
    }

    entries
        .iter()
        .find(|(date, _)| *date > cutoff)
        .or_else(|| entries.iter().rev().find(|(date, _)| *date < cutoff))
        .map(|(date, value)| Baseline {
            date: *date,
            value: *value,
            partial: true,
        })
}

pub fn compute_period(
    total: u64,
    entries: &[(NaiveDate, u64)],
    today: NaiveDate,
    period: Period,
) -> PeriodDelta {
    let Some(cutoff) = today.checked_sub_days(Days::new(period.days())) else {
        return PeriodDelta {
            value: 0,
            partial: true,
        };
    };

    match pick_baseline(entries, cutoff) {
        Some(baseline) => PeriodDelta {
            // A regressed total reports zero rather than a negative delta.
            value: total.saturating_sub(baseline.value),
            partial: baseline.partial,
        },
        None => PeriodDelta {
            value: 0,
            partial: true,
        },
    }
}

pub fn compute_stats(
    total: u64,
    series: &SnapshotSeries,
    today_date: &str,
) -> Result<StatsSummary, StatsError> {
    let today = parse_snapshot_date(today_date)?;
    let entries = series.entries();

    let day = compute_period(total, &entries, today, Period::Day);
    let week = compute_period(total, &entries, today, Period::Week);
    let month = compute_period(total, &entries, today, Period::Month);

    Ok(StatsSummary {
        stats: Stats {
            total,
            day: day.value,
            week: week.value,
            month: month.value,
        },
        partial: Partial {
            day: day.partial,
            week: week.partial,
            month: month.partial,
        },
    })
}
