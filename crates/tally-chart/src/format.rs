use chrono::NaiveDate;
use tally_config::DateLabelFormat;

pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// `1234567` as `1,234,567`.
pub fn format_number(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// `None` when date labels are hidden.
pub fn format_date_label(date: NaiveDate, format: DateLabelFormat) -> Option<String> {
    let pattern = match format {
        DateLabelFormat::YearMonthDay => "%Y-%m-%d",
        DateLabelFormat::ShortYearMonthDay => "%y/%m/%d",
        DateLabelFormat::DayMonth => "%d/%m",
        DateLabelFormat::MonthDay => "%m/%d",
        DateLabelFormat::Hidden => return None,
    };
    Some(date.format(pattern).to_string())
}

pub fn coord(value: f64) -> String {
    format!("{value:.2}")
}
