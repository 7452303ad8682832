use chrono::{Days, NaiveDate};
use tally_config::{ChartRenderSettings, ChartTheme, ChartType, TitleMode};
use tally_core::{SnapshotSeries, pick_baseline};

mod format;
mod palette;

pub use format::{escape_xml, format_date_label, format_number};
pub use palette::{Palette, TypeMeta, palette, type_meta};

use format::coord;

const AUTO_X_LABELS: usize = 6;

/// Everything needed to draw one chart file.
#[derive(Debug, Clone, Copy)]
pub struct ChartRequest<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
    pub series: &'a SnapshotSeries,
    pub generated_at: &'a str,
    pub chart_type: ChartType,
    pub theme: ChartTheme,
    pub settings: &'a ChartRenderSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    left: u32,
    right: u32,
    top: u32,
    bottom: u32,
    title_size: u32,
    subtitle_size: u32,
    axis_size: u32,
    latest_size: u32,
    empty_size: u32,
    value_size: u32,
}

impl Layout {
    fn new(width: u32, height: u32) -> Self {
        Self {
            left: scaled(56, width, 0.064),
            right: scaled(24, width, 0.024),
            top: scaled(48, height, 0.144),
            bottom: scaled(52, height, 0.156),
            title_size: scaled(18, height, 0.067),
            subtitle_size: scaled(11, height, 0.036),
            axis_size: scaled(10, height, 0.033),
            latest_size: scaled(12, height, 0.039),
            empty_size: scaled(14, height, 0.044),
            value_size: scaled(9, height, 0.03),
        }
    }
}

fn scaled(minimum: u32, dimension: u32, factor: f64) -> u32 {
    minimum.max((f64::from(dimension) * factor).round() as u32)
}

/// Points for a chart type: cumulative totals, or per-point deltas against
/// the baseline `range_days` earlier among the entries seen so far.
pub fn chart_points(series: &SnapshotSeries, chart_type: ChartType) -> Vec<ChartPoint> {
    let entries = series.entries();
    let range_days = type_meta(chart_type).range_days;

    entries
        .iter()
        .enumerate()
        .map(|(index, &(date, total))| {
            if range_days == 0 {
                return ChartPoint { date, value: total };
            }
            let cutoff = date
                .checked_sub_days(Days::new(range_days))
                .unwrap_or(NaiveDate::MIN);
            let baseline = pick_baseline(&entries[..=index], cutoff)
                .map(|baseline| baseline.value)
                .unwrap_or(total);
            ChartPoint {
                date,
                value: total.saturating_sub(baseline),
            }
        })
        .collect()
}

/// Indices of points that get an x-axis label. First and last are always included.
pub fn x_label_indices(points: &[ChartPoint], every_days: u32) -> Vec<usize> {
    if points.len() <= 1 {
        return vec![0];
    }

    let last = points.len() - 1;
    let mut indices = vec![0];
    if every_days > 0 {
        let mut last_labelled = points[0].date;
        for (index, point) in points.iter().enumerate().take(last).skip(1) {
            let gap = point.date.signed_duration_since(last_labelled).num_days().abs();
            if gap >= i64::from(every_days) {
                indices.push(index);
                last_labelled = point.date;
            }
        }
    } else {
        let step = (last / (AUTO_X_LABELS - 1)).max(1);
        indices.extend((step..last).step_by(step));
    }

    if !indices.contains(&last) {
        indices.push(last);
    }
    indices
}

pub fn default_title(owner: &str, repo: &str, chart_type: ChartType) -> String {
    format!(
        "{owner}/{repo} release downloads ({})",
        type_meta(chart_type).title_suffix
    )
}

/// Renders a standalone SVG document for the request.
pub fn render_chart(request: &ChartRequest<'_>) -> String {
    let settings = request.settings;
    let width = settings.width.clamp(640, 4096);
    let height = settings.height.clamp(240, 2160);
    let y_ticks = settings.y_ticks.clamp(2, 12);
    let x_label_every_days = settings.x_label_every_days.min(365);

    let colors = palette(request.theme);
    let meta = type_meta(request.chart_type);
    let layout = Layout::new(width, height);

    let fallback_title = default_title(request.owner, request.repo, request.chart_type);
    let title = match settings.title_mode {
        TitleMode::Default => Some(fallback_title.clone()),
        TitleMode::Custom if !settings.title_text.trim().is_empty() => {
            Some(settings.title_text.trim().to_owned())
        }
        TitleMode::Custom => Some(fallback_title.clone()),
        TitleMode::None => None,
    };
    let aria_label = title.as_deref().unwrap_or(&fallback_title);
    let headline_y = (f64::from(layout.top) * 0.65).round() as u32;

    let mut lines = vec![
        r#"<?xml version="1.0" encoding="UTF-8"?>"#.to_owned(),
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}" role="img" aria-label="{} chart">"#,
            escape_xml(aria_label)
        ),
    ];

    let mut header = Vec::new();
    header.push(format!(
        r#"  <rect class="bg" x="0" y="0" width="{width}" height="{height}" rx="16" />"#
    ));
    if let Some(title) = &title {
        header.push(format!(
            r#"  <text class="title" x="{}" y="{headline_y}">{}</text>"#,
            layout.left,
            escape_xml(title)
        ));
    }
    if settings.show_generated_at {
        let subtitle_y =
            height - 8u32.max((f64::from(layout.subtitle_size) * 0.46).round() as u32);
        header.push(format!(
            r#"  <text class="sub" x="{}" y="{subtitle_y}">{}</text>"#,
            layout.left,
            escape_xml(&format!("Generated {}", request.generated_at))
        ));
    }

    let base_styles = [
        format!("      .bg {{ fill: {}; }}", colors.background),
        format!(
            "      .title {{ font: 700 {}px Arial, sans-serif; fill: {}; }}",
            layout.title_size, colors.title
        ),
        format!(
            "      .sub {{ font: 400 {}px Arial, sans-serif; fill: {}; }}",
            layout.subtitle_size, colors.subtitle
        ),
    ];

    let points = chart_points(request.series, request.chart_type);
    if points.is_empty() {
        lines.push("  <defs>".to_owned());
        lines.push("    <style>".to_owned());
        lines.extend(base_styles);
        lines.push(format!(
            "      .empty {{ font: 600 {}px Arial, sans-serif; fill: {}; }}",
            layout.empty_size, colors.empty
        ));
        lines.push("    </style>".to_owned());
        lines.push("  </defs>".to_owned());
        lines.extend(header);
        lines.push(format!(
            r#"  <text class="empty" x="{}" y="{}" text-anchor="middle">No snapshot data yet</text>"#,
            (f64::from(width) / 2.0).round() as u32,
            (f64::from(height) / 2.0).round() as u32
        ));
        lines.push("</svg>".to_owned());
        return join_document(lines);
    }

    let left = f64::from(layout.left);
    let top = f64::from(layout.top);
    let plot_width = f64::from(width) - left - f64::from(layout.right);
    let plot_height = f64::from(height) - top - f64::from(layout.bottom);
    let plot_bottom = top + plot_height;

    let raw_min = points.iter().map(|point| point.value).min().unwrap_or(0);
    let raw_max = points.iter().map(|point| point.value).max().unwrap_or(0);
    let scale_min = if settings.zero_baseline { 0.0 } else { raw_min as f64 };
    let mut scale_max = raw_max as f64;
    if scale_max <= scale_min {
        scale_max = scale_min + 1.0;
    }
    let range = scale_max - scale_min;

    let last_index = points.len() - 1;
    let positions = points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            let x = if points.len() == 1 {
                left + plot_width / 2.0
            } else {
                left + (index as f64 / last_index as f64) * plot_width
            };
            let y = top + ((scale_max - point.value as f64) / range) * plot_height;
            (x, y)
        })
        .collect::<Vec<_>>();

    let polyline = positions
        .iter()
        .map(|(x, y)| format!("{},{}", coord(*x), coord(*y)))
        .collect::<Vec<_>>()
        .join(" ");
    let mut area = vec![format!("M {} {}", coord(positions[0].0), trim_float(plot_bottom))];
    area.extend(
        positions
            .iter()
            .map(|(x, y)| format!("L {} {}", coord(*x), coord(*y))),
    );
    area.push(format!(
        "L {} {}",
        coord(positions[last_index].0),
        trim_float(plot_bottom)
    ));
    area.push("Z".to_owned());

    let gradient_id = format!(
        "fill-{}-{}",
        request.chart_type.as_str(),
        request.theme.as_str()
    );

    lines.push("  <defs>".to_owned());
    lines.push(format!(
        r#"    <linearGradient id="{gradient_id}" x1="0" y1="0" x2="0" y2="1">"#
    ));
    lines.push(format!(
        r#"      <stop offset="0%" stop-color="{}" stop-opacity="0.32"/>"#,
        colors.fill
    ));
    lines.push(format!(
        r#"      <stop offset="100%" stop-color="{}" stop-opacity="0.05"/>"#,
        colors.fill
    ));
    lines.push("    </linearGradient>".to_owned());
    lines.push("    <style>".to_owned());
    lines.extend(base_styles);
    lines.push(format!("      .grid {{ stroke: {}; stroke-width: 1; }}", colors.grid));
    lines.push(format!(
        "      .axis {{ font: 400 {}px Arial, sans-serif; fill: {}; }}",
        layout.axis_size, colors.axis
    ));
    lines.push(format!(
        "      .line {{ fill: none; stroke: {}; stroke-width: 3; stroke-linecap: round; stroke-linejoin: round; }}",
        colors.line
    ));
    lines.push(format!("      .dot {{ fill: {}; }}", colors.dot));
    lines.push(format!(
        "      .value {{ font: 600 {}px Arial, sans-serif; fill: {}; }}",
        layout.value_size, colors.value
    ));
    lines.push(format!(
        "      .latest {{ font: 700 {}px Arial, sans-serif; fill: {}; }}",
        layout.latest_size, colors.latest
    ));
    lines.push("    </style>".to_owned());
    lines.push("  </defs>".to_owned());
    lines.extend(header);

    let grid_right = width - layout.right;
    for tick in 0..=y_ticks {
        let fraction = f64::from(tick) / f64::from(y_ticks);
        let y = top + fraction * plot_height;
        let value = (scale_max - fraction * range).round().max(0.0) as u64;
        lines.push(format!(
            r#"  <line x1="{}" y1="{}" x2="{grid_right}" y2="{}" class="grid"/>"#,
            layout.left,
            coord(y),
            coord(y)
        ));
        lines.push(format!(
            r#"  <text x="{}" y="{}" text-anchor="end" class="axis">{}</text>"#,
            layout.left.saturating_sub(8),
            coord(y + 4.0),
            escape_xml(&format_number(value))
        ));
    }

    lines.push(format!(
        r#"  <path d="{}" fill="url(#{gradient_id})"/>"#,
        area.join(" ")
    ));
    lines.push(format!(r#"  <polyline class="line" points="{polyline}"/>"#));
    lines.push(format!(
        r#"  <circle class="dot" cx="{}" cy="{}" r="4.5"/>"#,
        coord(positions[last_index].0),
        coord(positions[last_index].1)
    ));

    if settings.show_value_labels {
        let floor = top + f64::from(layout.value_size);
        for (point, (x, y)) in points.iter().zip(&positions) {
            lines.push(format!(
                r#"  <text class="value" x="{}" y="{}" text-anchor="middle">{}</text>"#,
                coord(*x),
                coord(floor.max(y - 8.0)),
                escape_xml(&format_number(point.value))
            ));
        }
    }

    let x_label_y = height - 22u32.max((f64::from(layout.bottom) * 0.43).round() as u32);
    for index in x_label_indices(&points, x_label_every_days) {
        let Some(label) = format_date_label(points[index].date, settings.date_label_format)
        else {
            break;
        };
        let anchor = if index == 0 {
            "start"
        } else if index == last_index {
            "end"
        } else {
            "middle"
        };
        lines.push(format!(
            r#"  <text class="axis" x="{}" y="{x_label_y}" text-anchor="{anchor}">{}</text>"#,
            coord(positions[index].0),
            escape_xml(&label)
        ));
    }

    lines.push(format!(
        r#"  <text class="latest" x="{grid_right}" y="{headline_y}" text-anchor="end">{}: {}</text>"#,
        escape_xml(meta.latest_label),
        escape_xml(&format_number(points[last_index].value))
    ));
    lines.push("</svg>".to_owned());
    join_document(lines)
}

fn join_document(lines: Vec<String>) -> String {
    let mut document = lines.join("\n");
    document.push('\n');
    document
}

fn trim_float(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
