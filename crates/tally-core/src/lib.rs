use thiserror::Error;

mod cache;
mod change;
mod document;
mod secret;
mod series;
mod stats;

pub use cache::{fresh_cached_total, recorded_total};
pub use change::{has_material_change, has_text_change};
pub use document::{
    DocumentInput, DownloadsDocument, PreviousDocument, Profile, ProfileMode, SCHEMA_VERSION,
    SnapshotMeta, Visibility, build_document,
};
pub use secret::Secret;
pub use series::{
    SNAPSHOT_DATE_FORMAT, SnapshotSeries, format_snapshot_date, merge_series, parse_snapshot_date,
    record_snapshot, validate_total,
};
pub use stats::{
    Baseline, Partial, Period, PeriodDelta, Stats, StatsSummary, compute_period, compute_stats,
    pick_baseline,
};

/// Rejected inputs to the snapshot and stats engine. These are caller errors and are never retried.
#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("invalid snapshot date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid total '{0}', expected a non-negative number")]
    InvalidTotal(f64),
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("stored document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored document is not a JSON object")]
    NotAnObject,
}
