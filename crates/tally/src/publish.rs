use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use tally_config::PublishSettings;
use tally_core::{
    DocumentInput, DownloadsDocument, PreviousDocument, SnapshotSeries, Visibility,
    build_document, format_snapshot_date, fresh_cached_total, has_material_change,
    record_snapshot,
};
use tally_github::{RemoteFile, RemoteStore, RepoRef, RepositoryMeta, WriteRequest};
use tracing::{debug, info, warn};

use crate::{MAX_WRITE_ATTEMPTS, PublishError};

/// Where the total in a published document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalSource {
    Cache,
    Api,
}

impl TotalSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for TotalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub document: DownloadsDocument,
    /// `false` when the stored document already matched and nothing was written.
    pub changed: bool,
    pub total_source: TotalSource,
    pub commit_message: String,
    pub attempts: u32,
}

pub fn commit_message(owner: &str, repo: &str, today: &str) -> String {
    format!("chore(tally): update downloads snapshot for {owner}/{repo} ({today})")
}

/// Reads, merges and conditionally writes the downloads document.
///
/// Each attempt re-reads the stored file so a concurrent writer's snapshot is
/// merged rather than overwritten. The total is resolved once and reused
/// across attempts.
pub async fn publish_document(
    store: &dyn RemoteStore,
    settings: &PublishSettings,
    meta: &RepositoryMeta,
    now: DateTime<Utc>,
) -> Result<PublishOutcome, PublishError> {
    let repo = RepoRef::new(settings.owner.as_str(), settings.repo.as_str());
    let today = format_snapshot_date(now.date_naive());
    let generated_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let message = commit_message(&settings.owner, &settings.repo, &today);

    let mut resolved_total: Option<(u64, TotalSource)> = None;
    let mut attempt = 0;
    loop {
        attempt += 1;

        let existing = store
            .read_file(&repo, &settings.output_path, &settings.output_branch)
            .await?;
        let previous = parse_previous(existing.as_ref(), &settings.output_path);
        let prior_series = prior_series(previous.as_ref(), &settings.owner, &settings.repo);

        let (total, total_source) = match resolved_total {
            Some(resolved) => resolved,
            None => {
                let resolved = resolve_total(store, &repo, previous.as_ref(), settings, now).await?;
                resolved_total = Some(resolved);
                resolved
            }
        };

        let merged = record_snapshot(&prior_series, now.date_naive(), total, settings.window_days);
        let document = build_document(DocumentInput {
            owner: &settings.owner,
            repo: &settings.repo,
            visibility: Visibility::from_private_flag(meta.private),
            generated_at: &generated_at,
            total,
            today_date: &today,
            window_days: settings.window_days,
            series: &merged,
            hourly_enabled: settings.hourly_enabled,
        })?;

        let next = document.to_value()?;
        let changed = has_material_change(
            previous.as_ref().map(PreviousDocument::as_value),
            Some(&next),
        );
        if !changed {
            debug!(
                branch = %settings.output_branch,
                path = %settings.output_path,
                "stored document already up to date"
            );
            return Ok(PublishOutcome {
                document,
                changed: false,
                total_source,
                commit_message: message,
                attempts: attempt,
            });
        }

        let content = document.to_pretty_json()?;
        let request = WriteRequest {
            path: &settings.output_path,
            branch: &settings.output_branch,
            content: &content,
            message: &message,
            expected_version: existing.as_ref().map(|file| &file.version),
        };

        match store.write_file(&repo, request).await {
            Ok(()) => {
                info!(
                    branch = %settings.output_branch,
                    path = %settings.output_path,
                    total,
                    attempt,
                    "wrote downloads document"
                );
                return Ok(PublishOutcome {
                    document,
                    changed: true,
                    total_source,
                    commit_message: message,
                    attempts: attempt,
                });
            }
            Err(err) if !err.is_conflict() => return Err(err.into()),
            Err(err) if attempt >= MAX_WRITE_ATTEMPTS => {
                return Err(PublishError::ConflictRetriesExhausted {
                    path: settings.output_path.clone(),
                    attempts: attempt,
                    source: err,
                });
            }
            Err(err) => {
                warn!(
                    branch = %settings.output_branch,
                    path = %settings.output_path,
                    attempt,
                    max_attempts = MAX_WRITE_ATTEMPTS,
                    error = %err,
                    "concurrent write detected, retrying publish"
                );
            }
        }
    }
}

async fn resolve_total(
    store: &dyn RemoteStore,
    repo: &RepoRef,
    previous: Option<&PreviousDocument>,
    settings: &PublishSettings,
    now: DateTime<Utc>,
) -> Result<(u64, TotalSource), PublishError> {
    let cached = fresh_cached_total(
        previous,
        &settings.owner,
        &settings.repo,
        now,
        settings.min_refresh_minutes,
    );
    if let Some(total) = cached {
        debug!(
            total,
            min_refresh_minutes = settings.min_refresh_minutes,
            "reusing cached total"
        );
        return Ok((total, TotalSource::Cache));
    }

    let total = store.fetch_aggregate_total(repo).await?;
    Ok((total, TotalSource::Api))
}

/// Unreadable stored content is treated as absent.
fn parse_previous(existing: Option<&RemoteFile>, path: &str) -> Option<PreviousDocument> {
    let file = existing?;
    match PreviousDocument::parse(&file.content) {
        Ok(previous) => previous,
        Err(err) => {
            warn!(
                path,
                error = %err,
                "existing output file is unreadable, starting a fresh snapshot series"
            );
            None
        }
    }
}

fn prior_series(previous: Option<&PreviousDocument>, owner: &str, repo: &str) -> SnapshotSeries {
    let Some(previous) = previous else {
        return SnapshotSeries::default();
    };

    if let Some((stored_owner, stored_repo)) = previous.foreign_identity(owner, repo) {
        warn!(
            stored = %format!("{stored_owner}/{stored_repo}"),
            target = %format!("{owner}/{repo}"),
            "existing output belongs to another repository, starting a fresh snapshot series"
        );
        return SnapshotSeries::default();
    }
    previous.series()
}
