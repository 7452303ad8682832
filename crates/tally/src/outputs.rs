use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::PublishError;
use crate::run::RunReport;

/// Workflow outputs in the order they are emitted.
pub fn output_pairs(report: &RunReport) -> Vec<(&'static str, String)> {
    let settings = &report.settings;
    let document = &report.outcome.document;
    let stats = &document.stats;
    let partial = &document.partial;

    vec![
        ("owner", settings.owner.clone()),
        ("repo", settings.repo.clone()),
        ("generated_at", document.generated_at.clone()),
        ("total", stats.total.to_string()),
        ("day", stats.day.to_string()),
        ("week", stats.week.to_string()),
        ("month", stats.month.to_string()),
        ("partial_day", partial.day.to_string()),
        ("partial_week", partial.week.to_string()),
        ("partial_month", partial.month.to_string()),
        ("chart_output_path", settings.chart.output_path.clone()),
        ("chart_published", report.charts.published_any().to_string()),
        (
            "chart_published_count",
            report.charts.published_count.to_string(),
        ),
        ("chart_total_count", report.charts.total_count.to_string()),
        ("chart_files", report.charts.files.join(",")),
        ("output_branch", settings.output_branch.clone()),
        ("output_path", settings.output_path.clone()),
        ("total_source", report.outcome.total_source.to_string()),
        ("published", report.outcome.changed.to_string()),
    ]
}

/// Appends `name=value` lines to `github_output`, or prints `output name=value` to `fallback`.
pub fn write_outputs(
    pairs: &[(&'static str, String)],
    github_output: Option<&Path>,
    fallback: &mut dyn Write,
) -> Result<(), PublishError> {
    let mut rendered = String::new();
    for (name, value) in pairs {
        match github_output {
            Some(_) => rendered.push_str(&format!("{name}={value}\n")),
            None => rendered.push_str(&format!("output {name}={value}\n")),
        }
    }

    match github_output {
        Some(path) => append_to(path, &rendered),
        None => fallback
            .write_all(rendered.as_bytes())
            .map_err(|source| PublishError::Output {
                path: "<stdout>".into(),
                source,
            }),
    }
}

/// Writes the dry-run document exactly as it would be committed.
pub fn write_document(report: &RunReport, out: &mut dyn Write) -> Result<(), PublishError> {
    let content = report.outcome.document.to_pretty_json()?;
    out.write_all(content.as_bytes())
        .map_err(|source| PublishError::Output {
            path: "<stdout>".into(),
            source,
        })
}

pub fn summary_markdown(report: &RunReport) -> String {
    let settings = &report.settings;
    let document = &report.outcome.document;
    let stats = &document.stats;
    let partial = &document.partial;

    let published = if report.outcome.changed {
        "yes"
    } else {
        "no (no material change)"
    };
    let chart = if settings.chart.enabled {
        format!(
            "**enabled** (`{}:{}`, updated: {}/{})",
            settings.output_branch,
            settings.chart.output_path,
            report.charts.published_count,
            report.charts.total_count
        )
    } else {
        "**disabled**".to_owned()
    };

    let lines = [
        "## GitHub Downloads Snapshot".to_owned(),
        String::new(),
        format!("- Repository: `{}/{}`", settings.owner, settings.repo),
        format!(
            "- Output: `{}:{}`",
            settings.output_branch, settings.output_path
        ),
        format!("- Published: **{published}**"),
        format!("- Chart: {chart}"),
        format!("- Total source: **{}**", report.outcome.total_source),
        format!("- Total: **{}**", stats.total),
        format!("- Day: **{}** (partial: {})", stats.day, partial.day),
        format!("- Week: **{}** (partial: {})", stats.week, partial.week),
        format!("- Month: **{}** (partial: {})", stats.month, partial.month),
        format!("- Snapshot count: **{}**", document.snapshots.count),
        format!("- Generated at: `{}`", document.generated_at),
    ];
    let mut markdown = lines.join("\n");
    markdown.push('\n');
    markdown
}

pub fn append_summary(path: &Path, markdown: &str) -> Result<(), PublishError> {
    append_to(path, markdown)
}

fn append_to(path: &Path, content: &str) -> Result<(), PublishError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| PublishError::Output {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(content.as_bytes())
        .map_err(|source| PublishError::Output {
            path: path.to_path_buf(),
            source,
        })
}
