use serde::Serialize;
use serde_json::Value;

use crate::series::{SnapshotSeries, format_snapshot_date};
use crate::stats::{Partial, Stats, compute_stats};
use crate::{DocumentError, StatsError};

pub const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn from_private_flag(private: bool) -> Self {
        if private { Self::Private } else { Self::Public }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileMode {
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub default_mode: ProfileMode,
    pub hourly_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub window_days: u32,
    pub count: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub series: SnapshotSeries,
}

impl SnapshotMeta {
    pub fn new(series: SnapshotSeries, window_days: u32) -> Self {
        Self {
            window_days,
            count: series.len(),
            first_date: series.first().map(|(date, _)| format_snapshot_date(date)),
            last_date: series.last().map(|(date, _)| format_snapshot_date(date)),
            series,
        }
    }
}

/// The published downloads artifact. Field order here is the on-disk order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadsDocument {
    pub schema_version: String,
    pub owner: String,
    pub repo: String,
    pub visibility: Visibility,
    pub generated_at: String,
    pub stats: Stats,
    pub partial: Partial,
    pub snapshots: SnapshotMeta,
    pub profile: Profile,
}

impl DownloadsDocument {
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Pretty JSON with a trailing newline, as committed to the repository.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        Ok(content)
    }
}

#[derive(Debug, Clone)]
pub struct DocumentInput<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
    pub visibility: Visibility,
    pub generated_at: &'a str,
    pub total: u64,
    pub today_date: &'a str,
    pub window_days: u32,
    pub series: &'a SnapshotSeries,
    pub hourly_enabled: bool,
}

pub fn build_document(input: DocumentInput<'_>) -> Result<DownloadsDocument, StatsError> {
    let summary = compute_stats(input.total, input.series, input.today_date)?;

    Ok(DownloadsDocument {
        schema_version: SCHEMA_VERSION.to_owned(),
        owner: input.owner.to_owned(),
        repo: input.repo.to_owned(),
        visibility: input.visibility,
        generated_at: input.generated_at.to_owned(),
        stats: summary.stats,
        partial: summary.partial,
        snapshots: SnapshotMeta::new(input.series.clone(), input.window_days),
        profile: Profile {
            default_mode: if input.hourly_enabled {
                ProfileMode::Hourly
            } else {
                ProfileMode::Daily
            },
            hourly_enabled: input.hourly_enabled,
        },
    })
}

/// A previously published document read back from the remote store.
///
/// Only the object shape is checked on parse; individual fields are read
/// leniently because anything may have been committed at the path.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousDocument {
    raw: Value,
}

impl PreviousDocument {
    /// Returns `Ok(None)` for empty content.
    pub fn parse(content: &str) -> Result<Option<Self>, DocumentError> {
        if content.trim().is_empty() {
            return Ok(None);
        }

        let raw: Value = serde_json::from_str(content)?;
        if !raw.is_object() {
            return Err(DocumentError::NotAnObject);
        }
        Ok(Some(Self { raw }))
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn owner(&self) -> Option<&str> {
        self.raw.get("owner").and_then(Value::as_str)
    }

    pub fn repo(&self) -> Option<&str> {
        self.raw.get("repo").and_then(Value::as_str)
    }

    pub fn generated_at(&self) -> Option<&str> {
        self.raw.get("generatedAt").and_then(Value::as_str)
    }

    pub fn total_value(&self) -> Option<&Value> {
        self.raw.pointer("/stats/total")
    }

    pub fn series(&self) -> SnapshotSeries {
        self.raw
            .pointer("/snapshots/series")
            .map(SnapshotSeries::from_untrusted)
            .unwrap_or_default()
    }

    pub fn is_same_repository(&self, owner: &str, repo: &str) -> bool {
        match (self.owner(), self.repo()) {
            (Some(stored_owner), Some(stored_repo)) => {
                same_name(stored_owner, owner) && same_name(stored_repo, repo)
            }
            _ => false,
        }
    }

    /// The stored identity when it names a different repository.
    ///
    /// Documents without an identity are not foreign; their series is reused.
    pub fn foreign_identity(&self, owner: &str, repo: &str) -> Option<(&str, &str)> {
        let (stored_owner, stored_repo) = (self.owner()?, self.repo()?);
        if same_name(stored_owner, owner) && same_name(stored_repo, repo) {
            None
        } else {
            Some((stored_owner, stored_repo))
        }
    }
}

fn same_name(left: &str, right: &str) -> bool {
    left.to_lowercase() == right.to_lowercase()
}
