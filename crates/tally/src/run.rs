use chrono::{DateTime, Utc};
use tally_config::PublishSettings;
use tally_github::{RemoteStore, RepoRef};
use tracing::info;

use crate::charts::{ChartPublishResult, publish_charts};
use crate::publish::{PublishOutcome, publish_document};
use crate::PublishError;

/// Everything a finished run reports back to the workflow.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub settings: PublishSettings,
    pub outcome: PublishOutcome,
    pub charts: ChartPublishResult,
}

impl RunReport {
    /// `disabled`, or `{published}/{total} updated`.
    pub fn chart_status(&self) -> String {
        if self.settings.chart.enabled {
            format!(
                "{}/{} updated",
                self.charts.published_count, self.charts.total_count
            )
        } else {
            "disabled".to_owned()
        }
    }

    pub fn completion_message(&self) -> String {
        let settings = &self.settings;
        if self.outcome.changed {
            format!(
                "Published {}:{} for {}/{} (total={}, source={}, chart={}).",
                settings.output_branch,
                settings.output_path,
                settings.owner,
                settings.repo,
                self.outcome.document.stats.total,
                self.outcome.total_source,
                self.chart_status()
            )
        } else {
            format!(
                "Skipped publish for {}/{}; no material change detected (source={}, chart={}).",
                settings.owner,
                settings.repo,
                self.outcome.total_source,
                self.chart_status()
            )
        }
    }
}

/// One full publish run: output branch, downloads document, then charts.
///
/// The document write is not undone if a later chart write fails.
pub async fn run_publish(
    store: &dyn RemoteStore,
    settings: &PublishSettings,
    now: DateTime<Utc>,
) -> Result<RunReport, PublishError> {
    let repo = RepoRef::new(settings.owner.as_str(), settings.repo.as_str());
    let meta = store.fetch_repository_meta(&repo).await?;

    let created = store
        .ensure_branch_exists(&repo, &settings.output_branch, &meta.default_branch)
        .await?;
    if created {
        info!(
            branch = %settings.output_branch,
            from = %meta.default_branch,
            "created output branch"
        );
    }

    let outcome = publish_document(store, settings, &meta, now).await?;
    let charts = publish_charts(store, settings, &outcome.document, &outcome.commit_message).await?;

    Ok(RunReport {
        settings: settings.clone(),
        outcome,
        charts,
    })
}
