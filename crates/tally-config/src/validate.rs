use crate::{ChartTheme, ChartType, ConfigError};

const TRUE_VALUES: [&str; 5] = ["true", "1", "yes", "y", "on"];
const FALSE_VALUES: [&str; 5] = ["false", "0", "no", "n", "off"];
const BRANCH_FORBIDDEN: [char; 9] = [' ', '~', '^', ':', '?', '*', '\\', '[', ']'];

/// Parses the boolean spellings accepted by workflow inputs.
///
/// Usable directly as a clap `value_parser`.
pub fn parse_bool_input(value: &str) -> Result<bool, String> {
    let normalized = value.trim().to_ascii_lowercase();
    if TRUE_VALUES.contains(&normalized.as_str()) {
        Ok(true)
    } else if FALSE_VALUES.contains(&normalized.as_str()) {
        Ok(false)
    } else {
        Err(format!("invalid boolean '{value}', use true/false (or 1/0)"))
    }
}

/// Trims a raw input; blank counts as unset.
pub fn optional_input(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// A decimal integer input. Signs, spaces and fractions are rejected.
pub fn parse_integer_input(
    value: Option<&str>,
    name: &'static str,
) -> Result<Option<u32>, ConfigError> {
    let Some(raw) = optional_input(value) else {
        return Ok(None);
    };
    if !raw.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ConfigError::InvalidValue {
            name,
            value: raw.to_owned(),
            expected: "expected an integer".to_owned(),
        });
    }
    raw.parse::<u32>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            name,
            value: raw.to_owned(),
            expected: "integer is too large".to_owned(),
        })
}

pub fn parse_flag_input(
    value: Option<&str>,
    name: &'static str,
) -> Result<Option<bool>, ConfigError> {
    optional_input(value)
        .map(|raw| {
            parse_bool_input(raw).map_err(|expected| ConfigError::InvalidValue {
                name,
                value: raw.to_owned(),
                expected,
            })
        })
        .transpose()
}

pub fn parse_choice_input<T>(
    value: Option<&str>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr<Err = String>,
{
    optional_input(value)
        .map(|raw| {
            raw.parse::<T>().map_err(|expected| ConfigError::InvalidValue {
                name,
                value: raw.to_owned(),
                expected,
            })
        })
        .transpose()
}

pub fn parse_chart_types(value: &str) -> Result<Vec<ChartType>, ConfigError> {
    parse_csv_list(value, "chart_types")
}

pub fn parse_chart_themes(value: &str) -> Result<Vec<ChartTheme>, ConfigError> {
    parse_csv_list(value, "chart_themes")
}

fn parse_csv_list<T>(value: &str, name: &'static str) -> Result<Vec<T>, ConfigError>
where
    T: std::str::FromStr<Err = String> + PartialEq,
{
    let mut parsed = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let item = entry.parse::<T>().map_err(|expected| ConfigError::InvalidValue {
            name,
            value: entry.to_owned(),
            expected,
        })?;
        if !parsed.contains(&item) {
            parsed.push(item);
        }
    }

    if parsed.is_empty() {
        return Err(ConfigError::InvalidValue {
            name,
            value: value.to_owned(),
            expected: "provide a comma-separated list".to_owned(),
        });
    }
    Ok(parsed)
}

/// Deduplicates a list read from the config file, keeping first occurrences.
pub(crate) fn dedupe<T: PartialEq + Copy>(values: &[T]) -> Vec<T> {
    let mut unique = Vec::with_capacity(values.len());
    for value in values {
        if !unique.contains(value) {
            unique.push(*value);
        }
    }
    unique
}

pub fn validate_slug(value: &str, name: &'static str) -> Result<String, ConfigError> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'));
    if valid {
        Ok(value.to_owned())
    } else {
        Err(ConfigError::InvalidValue {
            name,
            value: value.to_owned(),
            expected: "use letters, numbers, '.', '-' or '_'".to_owned(),
        })
    }
}

pub fn validate_branch(value: &str) -> Result<String, ConfigError> {
    let invalid = value.is_empty()
        || value == "@"
        || value == "HEAD"
        || value.starts_with('/')
        || value.ends_with('/')
        || value.starts_with('-')
        || value.ends_with('.')
        || value.contains("..")
        || value.contains("//")
        || value.contains("@{")
        || value
            .chars()
            .any(|ch| ch.is_ascii_control() || BRANCH_FORBIDDEN.contains(&ch))
        || value.split('/').any(|segment| {
            segment.is_empty() || segment.starts_with('.') || segment.ends_with(".lock")
        });

    if invalid {
        return Err(ConfigError::InvalidValue {
            name: "output_branch",
            value: value.to_owned(),
            expected: "must be a valid git branch name".to_owned(),
        });
    }
    Ok(value.to_owned())
}

/// Normalises a repository-relative path, rejecting traversal and empty segments.
pub fn validate_output_path(value: &str, name: &'static str) -> Result<String, ConfigError> {
    if value.is_empty() || value.starts_with('/') || value.starts_with('\\') {
        return Err(ConfigError::InvalidValue {
            name,
            value: value.to_owned(),
            expected: "use a non-empty repository-relative path".to_owned(),
        });
    }

    let normalized = value.replace('\\', "/");
    if normalized
        .split('/')
        .any(|segment| matches!(segment, "" | "." | ".."))
    {
        return Err(ConfigError::InvalidValue {
            name,
            value: value.to_owned(),
            expected: "path traversal and empty segments are not allowed".to_owned(),
        });
    }
    Ok(normalized)
}

pub(crate) fn check_range(
    name: &'static str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<u32, ConfigError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

/// Splits a `owner/repo` string such as `GITHUB_REPOSITORY`.
pub fn split_repository(value: &str) -> Option<(&str, &str)> {
    let mut parts = value.trim().split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
            Some((owner, repo))
        }
        _ => None,
    }
}
