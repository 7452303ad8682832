use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tally_config::{
    ConfigError, SettingsOverrides, optional_input, parse_choice_input, parse_flag_input,
    parse_integer_input,
};
use tally_github::DEFAULT_API_BASE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

// Each flag falls back to the `INPUT_*` variable GitHub Actions sets for the
// matching action input. Blank values count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct InputArgs {
    #[arg(
        long,
        env = "INPUT_TOKEN",
        hide_env_values = true,
        help = "GitHub token; defaults to GITHUB_TOKEN"
    )]
    pub token: Option<String>,

    #[arg(long, env = "INPUT_OWNER", help = "Repository owner")]
    pub owner: Option<String>,

    #[arg(long, env = "INPUT_REPO", help = "Repository name")]
    pub repo: Option<String>,

    #[arg(
        long,
        env = "INPUT_WINDOW_DAYS",
        help = "Days of snapshots to keep (1..3650, default 45)"
    )]
    pub window_days: Option<String>,

    #[arg(long, env = "INPUT_ENABLE_HOURLY_PROFILE")]
    pub enable_hourly_profile: Option<String>,

    #[arg(
        long,
        env = "INPUT_OUTPUT_BRANCH",
        help = "Branch the document is committed to (default gh-pages)"
    )]
    pub output_branch: Option<String>,

    #[arg(
        long,
        env = "INPUT_OUTPUT_PATH",
        help = "Repository path of the JSON document"
    )]
    pub output_path: Option<String>,

    #[arg(
        long,
        env = "INPUT_MIN_REFRESH_MINUTES",
        help = "Reuse the stored total when it is younger than this many minutes (0 disables)"
    )]
    pub min_refresh_minutes: Option<String>,

    #[arg(long, env = "INPUT_PUBLISH_CHART", help = "Also publish SVG charts")]
    pub publish_chart: Option<String>,

    #[arg(long, env = "INPUT_CHART_OUTPUT_PATH")]
    pub chart_output_path: Option<String>,

    #[arg(
        long,
        env = "INPUT_CHART_TYPES",
        help = "Comma-separated chart types: total-trend, daily, weekly, monthly"
    )]
    pub chart_types: Option<String>,

    #[arg(
        long,
        env = "INPUT_CHART_THEMES",
        help = "Comma-separated chart themes: black, slate, orange"
    )]
    pub chart_themes: Option<String>,

    #[arg(long, env = "INPUT_CHARTS_OUTPUT_DIR")]
    pub charts_output_dir: Option<String>,

    #[arg(long, env = "INPUT_CHART_WIDTH")]
    pub chart_width: Option<String>,

    #[arg(long, env = "INPUT_CHART_HEIGHT")]
    pub chart_height: Option<String>,

    #[arg(long, env = "INPUT_CHART_ZERO_BASELINE")]
    pub chart_zero_baseline: Option<String>,

    #[arg(long, env = "INPUT_CHART_Y_TICKS")]
    pub chart_y_ticks: Option<String>,

    #[arg(long, env = "INPUT_CHART_X_LABEL_EVERY_DAYS")]
    pub chart_x_label_every_days: Option<String>,

    #[arg(long, env = "INPUT_CHART_SHOW_VALUE_LABELS")]
    pub chart_show_value_labels: Option<String>,

    #[arg(
        long,
        env = "INPUT_CHART_DATE_LABEL_FORMAT",
        help = "yyyy-mm-dd, yy/mm/dd, dd/mm, mm/dd or none"
    )]
    pub chart_date_label_format: Option<String>,

    #[arg(long, env = "INPUT_CHART_SHOW_GENERATED_AT")]
    pub chart_show_generated_at: Option<String>,

    #[arg(
        long,
        env = "INPUT_CHART_TITLE_MODE",
        help = "default, custom or none"
    )]
    pub chart_title_mode: Option<String>,

    #[arg(long, env = "INPUT_CHART_TITLE_TEXT")]
    pub chart_title_text: Option<String>,
}

impl InputArgs {
    pub fn settings_overrides(&self) -> Result<SettingsOverrides, ConfigError> {
        let text = |value: &Option<String>| optional_input(value.as_deref()).map(str::to_owned);

        Ok(SettingsOverrides {
            owner: text(&self.owner),
            repo: text(&self.repo),
            window_days: parse_integer_input(self.window_days.as_deref(), "window_days")?,
            enable_hourly_profile: parse_flag_input(
                self.enable_hourly_profile.as_deref(),
                "enable_hourly_profile",
            )?,
            output_branch: text(&self.output_branch),
            output_path: text(&self.output_path),
            min_refresh_minutes: parse_integer_input(
                self.min_refresh_minutes.as_deref(),
                "min_refresh_minutes",
            )?,
            publish_chart: parse_flag_input(self.publish_chart.as_deref(), "publish_chart")?,
            chart_output_path: text(&self.chart_output_path),
            chart_types: text(&self.chart_types),
            chart_themes: text(&self.chart_themes),
            charts_output_dir: text(&self.charts_output_dir),
            chart_width: parse_integer_input(self.chart_width.as_deref(), "chart_width")?,
            chart_height: parse_integer_input(self.chart_height.as_deref(), "chart_height")?,
            chart_zero_baseline: parse_flag_input(
                self.chart_zero_baseline.as_deref(),
                "chart_zero_baseline",
            )?,
            chart_y_ticks: parse_integer_input(self.chart_y_ticks.as_deref(), "chart_y_ticks")?,
            chart_x_label_every_days: parse_integer_input(
                self.chart_x_label_every_days.as_deref(),
                "chart_x_label_every_days",
            )?,
            chart_show_value_labels: parse_flag_input(
                self.chart_show_value_labels.as_deref(),
                "chart_show_value_labels",
            )?,
            chart_date_label_format: parse_choice_input(
                self.chart_date_label_format.as_deref(),
                "chart_date_label_format",
            )?,
            chart_show_generated_at: parse_flag_input(
                self.chart_show_generated_at.as_deref(),
                "chart_show_generated_at",
            )?,
            chart_title_mode: parse_choice_input(
                self.chart_title_mode.as_deref(),
                "chart_title_mode",
            )?,
            chart_title_text: text(&self.chart_title_text),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Write a starter .tally/config.toml with every default spelled out
    Init,
}

#[derive(Debug, Clone, Parser)]
#[command(
    author,
    version,
    about = "Publish GitHub release download snapshots back into the repository"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Workspace root holding .tally/config.toml"
    )]
    pub workspace: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(long, help = "Config file to use instead of <workspace>/.tally/config.toml")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub inputs: InputArgs,

    #[arg(
        long,
        env = "GITHUB_API_URL",
        default_value = DEFAULT_API_BASE,
        help = "GitHub REST API base URL"
    )]
    pub api_base: String,

    #[arg(
        long,
        help = "Run against an in-memory repository and print the document instead of committing"
    )]
    pub dry_run: bool,

    #[arg(
        long,
        default_value_t = 0,
        requires = "dry_run",
        help = "Aggregate download total reported by the in-memory repository"
    )]
    pub dry_run_total: u64,

    #[arg(
        long,
        requires = "dry_run",
        help = "Existing document to seed the in-memory output path with"
    )]
    pub seed_document: Option<PathBuf>,

    #[arg(long, env = "GITHUB_TOKEN", hide = true, hide_env_values = true)]
    pub github_token: Option<String>,

    #[arg(long, env = "GITHUB_REPOSITORY", hide = true)]
    pub github_repository: Option<String>,

    #[arg(long, env = "GITHUB_OUTPUT", hide = true)]
    pub github_output: Option<PathBuf>,

    #[arg(long, env = "GITHUB_STEP_SUMMARY", hide = true)]
    pub github_step_summary: Option<PathBuf>,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}
