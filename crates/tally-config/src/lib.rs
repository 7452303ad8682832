use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod settings;
mod validate;

pub use settings::{
    ChartRenderSettings, ChartSettings, PublishSettings, SettingsOverrides, resolve_settings,
    resolve_token,
};
pub use validate::{
    optional_input, parse_bool_input, parse_chart_themes, parse_chart_types, parse_choice_input,
    parse_flag_input, parse_integer_input, split_repository, validate_branch,
    validate_output_path, validate_slug,
};

pub const TALLY_DIR_NAME: &str = ".tally";
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_WINDOW_DAYS: u32 = 45;
pub const DEFAULT_OUTPUT_BRANCH: &str = "gh-pages";
pub const DEFAULT_OUTPUT_PATH: &str = "gh-dl/downloads.json";
pub const DEFAULT_MIN_REFRESH_MINUTES: u32 = 0;
pub const DEFAULT_CHART_OUTPUT_PATH: &str = "gh-dl/downloads-trend.svg";
pub const DEFAULT_CHARTS_OUTPUT_DIR: &str = "gh-dl/charts";
pub const DEFAULT_CHART_WIDTH: u32 = 1000;
pub const DEFAULT_CHART_HEIGHT: u32 = 360;
pub const DEFAULT_CHART_Y_TICKS: u32 = 6;
pub const DEFAULT_CHART_X_LABEL_EVERY_DAYS: u32 = 0;
pub const MAX_CHART_TITLE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChartType {
    TotalTrend,
    Daily,
    Weekly,
    Monthly,
}

impl ChartType {
    pub const ALL: [ChartType; 4] = [
        ChartType::TotalTrend,
        ChartType::Daily,
        ChartType::Weekly,
        ChartType::Monthly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TotalTrend => "total-trend",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for ChartType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "total-trend" => Ok(Self::TotalTrend),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!(
                "invalid chart type '{other}', expected one of: total-trend, daily, weekly, monthly"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartTheme {
    Black,
    Slate,
    Orange,
}

impl ChartTheme {
    pub const ALL: [ChartTheme; 3] = [ChartTheme::Black, ChartTheme::Slate, ChartTheme::Orange];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Black => "black",
            Self::Slate => "slate",
            Self::Orange => "orange",
        }
    }
}

impl std::str::FromStr for ChartTheme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "black" => Ok(Self::Black),
            "slate" => Ok(Self::Slate),
            "orange" => Ok(Self::Orange),
            other => Err(format!(
                "invalid chart theme '{other}', expected one of: black, slate, orange"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DateLabelFormat {
    #[default]
    #[serde(rename = "yyyy-mm-dd")]
    YearMonthDay,
    #[serde(rename = "yy/mm/dd")]
    ShortYearMonthDay,
    #[serde(rename = "dd/mm")]
    DayMonth,
    #[serde(rename = "mm/dd")]
    MonthDay,
    #[serde(rename = "none")]
    Hidden,
}

impl DateLabelFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::YearMonthDay => "yyyy-mm-dd",
            Self::ShortYearMonthDay => "yy/mm/dd",
            Self::DayMonth => "dd/mm",
            Self::MonthDay => "mm/dd",
            Self::Hidden => "none",
        }
    }
}

impl std::str::FromStr for DateLabelFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yyyy-mm-dd" => Ok(Self::YearMonthDay),
            "yy/mm/dd" => Ok(Self::ShortYearMonthDay),
            "dd/mm" => Ok(Self::DayMonth),
            "mm/dd" => Ok(Self::MonthDay),
            "none" => Ok(Self::Hidden),
            other => Err(format!(
                "invalid date label format '{other}', expected one of: yyyy-mm-dd, yy/mm/dd, dd/mm, mm/dd, none"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TitleMode {
    #[default]
    Default,
    Custom,
    None,
}

impl TitleMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Custom => "custom",
            Self::None => "none",
        }
    }
}

impl std::str::FromStr for TitleMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "custom" => Ok(Self::Custom),
            "none" => Ok(Self::None),
            other => Err(format!(
                "invalid title mode '{other}', expected one of: default, custom, none"
            )),
        }
    }
}

/// Contents of `.tally/config.toml`. Every field is optional; command-line
/// and environment inputs take precedence over anything set here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TallyConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub chart: ChartConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TargetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_refresh_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_profile: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChartConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<ChartType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub themes: Option<Vec<ChartTheme>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_baseline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_ticks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_label_every_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_value_labels: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_label_format: Option<DateLabelFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_generated_at: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_mode: Option<TitleMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_text: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("invalid '{name}' value '{value}': {expected}")]
    InvalidValue {
        name: &'static str,
        value: String,
        expected: String,
    },
    #[error("invalid '{name}' value '{value}', expected {min}..{max}")]
    OutOfRange {
        name: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error(
        "could not resolve target repository; provide owner and repo, or run with GITHUB_REPOSITORY set"
    )]
    MissingRepository,
    #[error(
        "'output_path' ({0}) overlaps chart output files; use a dedicated JSON path and keep charts under the chart paths"
    )]
    ChartPathConflict(String),
    #[error("'chart_title_text' is required when 'chart_title_mode' is 'custom'")]
    MissingTitleText,
    #[error("'chart_title_text' is {0} characters long, maximum is {MAX_CHART_TITLE_CHARS}")]
    TitleTooLong(usize),
    #[error("a token is required; pass --token or set GITHUB_TOKEN")]
    MissingToken,
}

pub fn tally_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(TALLY_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    tally_dir(workspace_root).join(CONFIG_FILE_NAME)
}

/// Loads `.tally/config.toml`, or defaults when the file does not exist.
pub fn load_workspace_config(workspace_root: impl AsRef<Path>) -> Result<TallyConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(TallyConfig::default());
    }

    load_config_file(path)
}

pub fn load_config_file(path: impl AsRef<Path>) -> Result<TallyConfig, ConfigError> {
    let raw = fs::read_to_string(path)?;
    let parsed: TallyConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

/// Writes a starter config with every default spelled out. An existing file is left alone.
pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<(PathBuf, bool), ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(tally_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return Ok((path, false));
    }

    let content = toml::to_string_pretty(&starter_config())?;
    fs::write(&path, content)?;
    Ok((path, true))
}

fn starter_config() -> TallyConfig {
    TallyConfig {
        target: TargetConfig::default(),
        output: OutputConfig {
            branch: Some(DEFAULT_OUTPUT_BRANCH.to_owned()),
            path: Some(DEFAULT_OUTPUT_PATH.to_owned()),
            window_days: Some(DEFAULT_WINDOW_DAYS),
            min_refresh_minutes: Some(DEFAULT_MIN_REFRESH_MINUTES),
            hourly_profile: Some(false),
        },
        chart: ChartConfig {
            enabled: Some(false),
            output_path: Some(DEFAULT_CHART_OUTPUT_PATH.to_owned()),
            types: Some(vec![ChartType::TotalTrend]),
            themes: Some(vec![ChartTheme::Slate]),
            output_dir: Some(DEFAULT_CHARTS_OUTPUT_DIR.to_owned()),
            width: Some(DEFAULT_CHART_WIDTH),
            height: Some(DEFAULT_CHART_HEIGHT),
            zero_baseline: Some(true),
            y_ticks: Some(DEFAULT_CHART_Y_TICKS),
            x_label_every_days: Some(DEFAULT_CHART_X_LABEL_EVERY_DAYS),
            show_value_labels: Some(false),
            date_label_format: Some(DateLabelFormat::default()),
            show_generated_at: Some(true),
            title_mode: Some(TitleMode::default()),
            title_text: None,
        },
    }
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_config(mut config: TallyConfig) -> TallyConfig {
    config.target.owner = normalize_optional(config.target.owner.take());
    config.target.repo = normalize_optional(config.target.repo.take());
    config.output.branch = normalize_optional(config.output.branch.take());
    config.output.path = normalize_optional(config.output.path.take());
    config.chart.output_path = normalize_optional(config.chart.output_path.take());
    config.chart.output_dir = normalize_optional(config.chart.output_dir.take());
    config.chart.title_text = normalize_optional(config.chart.title_text.take());
    config
}
