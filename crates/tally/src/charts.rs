use std::collections::HashSet;

use tally_chart::{ChartRequest, render_chart};
use tally_config::{ChartSettings, ChartTheme, ChartType, PublishSettings};
use tally_core::{DownloadsDocument, has_text_change};
use tally_github::{RemoteStore, RepoRef, WriteRequest};
use tracing::{debug, info, warn};

use crate::{MAX_WRITE_ATTEMPTS, PublishError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartTarget {
    pub path: String,
    pub chart_type: ChartType,
    pub theme: ChartTheme,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartPublishResult {
    pub published_count: usize,
    pub total_count: usize,
    /// Every target path, written or not, in publish order.
    pub files: Vec<String>,
}

impl ChartPublishResult {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn published_any(&self) -> bool {
        self.published_count > 0
    }
}

/// The primary chart path first, then every type × theme path, each path once.
///
/// The primary path renders the first configured type and theme.
pub fn build_chart_targets(chart: &ChartSettings) -> Vec<ChartTarget> {
    let (Some(&primary_type), Some(&primary_theme)) = (chart.types.first(), chart.themes.first())
    else {
        return Vec::new();
    };

    let mut targets = vec![ChartTarget {
        path: chart.output_path.clone(),
        chart_type: primary_type,
        theme: primary_theme,
    }];
    for &chart_type in &chart.types {
        for &theme in &chart.themes {
            targets.push(ChartTarget {
                path: chart.matrix_path(chart_type, theme),
                chart_type,
                theme,
            });
        }
    }

    let mut seen = HashSet::new();
    targets.retain(|target| seen.insert(target.path.clone()));
    targets
}

/// Renders and writes every chart target from the document computed this run.
///
/// Runs even when the document itself was unchanged.
pub async fn publish_charts(
    store: &dyn RemoteStore,
    settings: &PublishSettings,
    document: &DownloadsDocument,
    commit_message: &str,
) -> Result<ChartPublishResult, PublishError> {
    if !settings.chart.enabled {
        return Ok(ChartPublishResult::disabled());
    }

    let repo = RepoRef::new(settings.owner.as_str(), settings.repo.as_str());
    let targets = build_chart_targets(&settings.chart);
    let mut published_count = 0;

    for target in &targets {
        let svg = render_chart(&ChartRequest {
            owner: &settings.owner,
            repo: &settings.repo,
            series: &document.snapshots.series,
            generated_at: &document.generated_at,
            chart_type: target.chart_type,
            theme: target.theme,
            settings: &settings.chart.render,
        });

        let message = format!(
            "{commit_message} [chart:{}/{}]",
            target.chart_type.as_str(),
            target.theme.as_str()
        );
        if publish_chart(store, &repo, &settings.output_branch, target, &svg, &message).await? {
            published_count += 1;
        }
    }

    info!(
        published = published_count,
        total = targets.len(),
        "chart publish finished"
    );
    Ok(ChartPublishResult {
        published_count,
        total_count: targets.len(),
        files: targets.into_iter().map(|target| target.path).collect(),
    })
}

async fn publish_chart(
    store: &dyn RemoteStore,
    repo: &RepoRef,
    branch: &str,
    target: &ChartTarget,
    svg: &str,
    message: &str,
) -> Result<bool, PublishError> {
    let mut attempt = 0;
    loop {
        attempt += 1;

        let existing = store.read_file(repo, &target.path, branch).await?;
        if !has_text_change(existing.as_ref().map(|file| file.content.as_str()), Some(svg)) {
            debug!(path = %target.path, "chart unchanged, skipping write");
            return Ok(false);
        }

        let request = WriteRequest {
            path: &target.path,
            branch,
            content: svg,
            message,
            expected_version: existing.as_ref().map(|file| &file.version),
        };
        match store.write_file(repo, request).await {
            Ok(()) => return Ok(true),
            Err(err) if !err.is_conflict() => return Err(err.into()),
            Err(err) if attempt >= MAX_WRITE_ATTEMPTS => {
                return Err(PublishError::ConflictRetriesExhausted {
                    path: target.path.clone(),
                    attempts: attempt,
                    source: err,
                });
            }
            Err(err) => {
                warn!(
                    branch,
                    path = %target.path,
                    attempt,
                    max_attempts = MAX_WRITE_ATTEMPTS,
                    error = %err,
                    "concurrent write detected, retrying chart publish"
                );
            }
        }
    }
}
