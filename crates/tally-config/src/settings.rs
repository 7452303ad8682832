use tally_core::Secret;

use crate::validate::{
    check_range, dedupe, parse_chart_themes, parse_chart_types, split_repository, validate_branch,
    validate_output_path, validate_slug,
};
use crate::{
    ChartTheme, ChartType, ConfigError, DEFAULT_CHART_HEIGHT, DEFAULT_CHART_OUTPUT_PATH,
    DEFAULT_CHART_WIDTH, DEFAULT_CHART_X_LABEL_EVERY_DAYS, DEFAULT_CHART_Y_TICKS,
    DEFAULT_CHARTS_OUTPUT_DIR, DEFAULT_MIN_REFRESH_MINUTES, DEFAULT_OUTPUT_BRANCH,
    DEFAULT_OUTPUT_PATH, DEFAULT_WINDOW_DAYS, DateLabelFormat, MAX_CHART_TITLE_CHARS, TallyConfig,
    TitleMode,
};

/// Values supplied on the command line or through `INPUT_*` variables.
///
/// `None` falls through to the config file and then to the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub window_days: Option<u32>,
    pub enable_hourly_profile: Option<bool>,
    pub output_branch: Option<String>,
    pub output_path: Option<String>,
    pub min_refresh_minutes: Option<u32>,
    pub publish_chart: Option<bool>,
    pub chart_output_path: Option<String>,
    pub chart_types: Option<String>,
    pub chart_themes: Option<String>,
    pub charts_output_dir: Option<String>,
    pub chart_width: Option<u32>,
    pub chart_height: Option<u32>,
    pub chart_zero_baseline: Option<bool>,
    pub chart_y_ticks: Option<u32>,
    pub chart_x_label_every_days: Option<u32>,
    pub chart_show_value_labels: Option<bool>,
    pub chart_date_label_format: Option<DateLabelFormat>,
    pub chart_show_generated_at: Option<bool>,
    pub chart_title_mode: Option<TitleMode>,
    pub chart_title_text: Option<String>,
}

/// Knobs handed to the SVG renderer for every chart target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRenderSettings {
    pub width: u32,
    pub height: u32,
    pub zero_baseline: bool,
    pub y_ticks: u32,
    pub x_label_every_days: u32,
    pub show_value_labels: bool,
    pub date_label_format: DateLabelFormat,
    pub show_generated_at: bool,
    pub title_mode: TitleMode,
    pub title_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSettings {
    pub enabled: bool,
    pub output_path: String,
    pub types: Vec<ChartType>,
    pub themes: Vec<ChartTheme>,
    pub output_dir: String,
    pub render: ChartRenderSettings,
}

impl ChartSettings {
    /// `{output_dir}/{type}--{theme}.svg`.
    pub fn matrix_path(&self, chart_type: ChartType, theme: ChartTheme) -> String {
        format!(
            "{}/{}--{}.svg",
            self.output_dir,
            chart_type.as_str(),
            theme.as_str()
        )
    }

    /// [`ChartSettings::matrix_path`] for every type and theme, types outermost.
    pub fn matrix_paths(&self) -> Vec<String> {
        self.types
            .iter()
            .flat_map(|&chart_type| {
                self.themes
                    .iter()
                    .map(move |&theme| self.matrix_path(chart_type, theme))
            })
            .collect()
    }
}

/// Fully validated settings for one publish run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSettings {
    pub owner: String,
    pub repo: String,
    pub window_days: u32,
    pub hourly_enabled: bool,
    pub output_branch: String,
    pub output_path: String,
    pub min_refresh_minutes: u32,
    pub chart: ChartSettings,
}

pub fn resolve_settings(
    config: &TallyConfig,
    overrides: SettingsOverrides,
    github_repository: Option<&str>,
) -> Result<PublishSettings, ConfigError> {
    let (owner, repo) = resolve_repository(config, &overrides, github_repository)?;

    let output = &config.output;
    let window_days = check_range(
        "window_days",
        pick(overrides.window_days, output.window_days, DEFAULT_WINDOW_DAYS),
        1,
        3650,
    )?;
    let min_refresh_minutes = check_range(
        "min_refresh_minutes",
        pick(
            overrides.min_refresh_minutes,
            output.min_refresh_minutes,
            DEFAULT_MIN_REFRESH_MINUTES,
        ),
        0,
        10_080,
    )?;
    let hourly_enabled = pick(overrides.enable_hourly_profile, output.hourly_profile, false);
    let output_branch = validate_branch(&pick_text(
        overrides.output_branch.clone(),
        &output.branch,
        DEFAULT_OUTPUT_BRANCH,
    ))?;
    let output_path = validate_output_path(
        &pick_text(overrides.output_path.clone(), &output.path, DEFAULT_OUTPUT_PATH),
        "output_path",
    )?;

    let chart = resolve_chart(config, &overrides)?;
    check_chart_path_conflicts(&output_path, &chart)?;

    Ok(PublishSettings {
        owner,
        repo,
        window_days,
        hourly_enabled,
        output_branch,
        output_path,
        min_refresh_minutes,
        chart,
    })
}

/// The explicit token wins over the ambient `GITHUB_TOKEN`; blank values count as absent.
pub fn resolve_token(
    explicit: Option<&str>,
    github_token: Option<&str>,
) -> Result<Secret, ConfigError> {
    explicit
        .and_then(Secret::non_empty)
        .or_else(|| github_token.and_then(Secret::non_empty))
        .ok_or(ConfigError::MissingToken)
}

fn resolve_repository(
    config: &TallyConfig,
    overrides: &SettingsOverrides,
    github_repository: Option<&str>,
) -> Result<(String, String), ConfigError> {
    let context = github_repository.and_then(split_repository);

    let owner = non_blank(overrides.owner.as_deref())
        .or(config.target.owner.as_deref())
        .or(context.map(|(owner, _)| owner));
    let repo = non_blank(overrides.repo.as_deref())
        .or(config.target.repo.as_deref())
        .or(context.map(|(_, repo)| repo));

    match (owner, repo) {
        (Some(owner), Some(repo)) => Ok((
            validate_slug(owner, "owner")?,
            validate_slug(repo, "repo")?,
        )),
        _ => Err(ConfigError::MissingRepository),
    }
}

fn resolve_chart(
    config: &TallyConfig,
    overrides: &SettingsOverrides,
) -> Result<ChartSettings, ConfigError> {
    let chart = &config.chart;

    let output_path = validate_output_path(
        &pick_text(
            overrides.chart_output_path.clone(),
            &chart.output_path,
            DEFAULT_CHART_OUTPUT_PATH,
        ),
        "chart_output_path",
    )?;
    let output_dir = validate_output_path(
        &pick_text(
            overrides.charts_output_dir.clone(),
            &chart.output_dir,
            DEFAULT_CHARTS_OUTPUT_DIR,
        ),
        "charts_output_dir",
    )?;

    let types = match non_blank(overrides.chart_types.as_deref()) {
        Some(raw) => parse_chart_types(raw)?,
        None => match chart.types.as_deref() {
            Some([]) => return Err(empty_list("chart_types")),
            Some(types) => dedupe(types),
            None => vec![ChartType::TotalTrend],
        },
    };
    let themes = match non_blank(overrides.chart_themes.as_deref()) {
        Some(raw) => parse_chart_themes(raw)?,
        None => match chart.themes.as_deref() {
            Some([]) => return Err(empty_list("chart_themes")),
            Some(themes) => dedupe(themes),
            None => vec![ChartTheme::Slate],
        },
    };

    let title_mode = pick(overrides.chart_title_mode, chart.title_mode, TitleMode::Default);
    let title_text = overrides
        .chart_title_text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
        .or_else(|| chart.title_text.clone())
        .unwrap_or_default();
    if title_mode == TitleMode::Custom && title_text.is_empty() {
        return Err(ConfigError::MissingTitleText);
    }
    let title_chars = title_text.chars().count();
    if title_chars > MAX_CHART_TITLE_CHARS {
        return Err(ConfigError::TitleTooLong(title_chars));
    }

    let render = ChartRenderSettings {
        width: check_range(
            "chart_width",
            pick(overrides.chart_width, chart.width, DEFAULT_CHART_WIDTH),
            640,
            4096,
        )?,
        height: check_range(
            "chart_height",
            pick(overrides.chart_height, chart.height, DEFAULT_CHART_HEIGHT),
            240,
            2160,
        )?,
        zero_baseline: pick(overrides.chart_zero_baseline, chart.zero_baseline, true),
        y_ticks: check_range(
            "chart_y_ticks",
            pick(overrides.chart_y_ticks, chart.y_ticks, DEFAULT_CHART_Y_TICKS),
            2,
            12,
        )?,
        x_label_every_days: check_range(
            "chart_x_label_every_days",
            pick(
                overrides.chart_x_label_every_days,
                chart.x_label_every_days,
                DEFAULT_CHART_X_LABEL_EVERY_DAYS,
            ),
            0,
            365,
        )?,
        show_value_labels: pick(overrides.chart_show_value_labels, chart.show_value_labels, false),
        date_label_format: pick(
            overrides.chart_date_label_format,
            chart.date_label_format,
            DateLabelFormat::YearMonthDay,
        ),
        show_generated_at: pick(overrides.chart_show_generated_at, chart.show_generated_at, true),
        title_mode,
        title_text,
    };

    Ok(ChartSettings {
        enabled: pick(overrides.publish_chart, chart.enabled, false),
        output_path,
        types,
        themes,
        output_dir,
        render,
    })
}

fn check_chart_path_conflicts(output_path: &str, chart: &ChartSettings) -> Result<(), ConfigError> {
    if !chart.enabled {
        return Ok(());
    }

    let overlaps = chart.output_path == output_path
        || chart.matrix_paths().iter().any(|path| path == output_path);
    if overlaps {
        return Err(ConfigError::ChartPathConflict(output_path.to_owned()));
    }
    Ok(())
}

fn pick<T: Copy>(cli: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(file).unwrap_or(default)
}

fn pick_text(cli: Option<String>, file: &Option<String>, default: &str) -> String {
    cli.map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .or_else(|| file.clone())
        .unwrap_or_else(|| default.to_owned())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn empty_list(name: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        value: String::new(),
        expected: "provide at least one entry".to_owned(),
    }
}
