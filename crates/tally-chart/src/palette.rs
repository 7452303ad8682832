use tally_config::{ChartTheme, ChartType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: &'static str,
    pub title: &'static str,
    pub subtitle: &'static str,
    pub grid: &'static str,
    pub axis: &'static str,
    pub line: &'static str,
    pub dot: &'static str,
    pub latest: &'static str,
    pub fill: &'static str,
    pub empty: &'static str,
    pub value: &'static str,
}

pub fn palette(theme: ChartTheme) -> Palette {
    match theme {
        ChartTheme::Black => Palette {
            background: "#0b0b0d",
            title: "#f8fafc",
            subtitle: "#cbd5e1",
            grid: "#1f2937",
            axis: "#94a3b8",
            line: "#22d3ee",
            dot: "#22d3ee",
            latest: "#f8fafc",
            fill: "#22d3ee",
            empty: "#cbd5e1",
            value: "#cbd5e1",
        },
        ChartTheme::Slate => Palette {
            background: "#0f172a",
            title: "#e2e8f0",
            subtitle: "#94a3b8",
            grid: "#1e293b",
            axis: "#94a3b8",
            line: "#60a5fa",
            dot: "#60a5fa",
            latest: "#e2e8f0",
            fill: "#60a5fa",
            empty: "#cbd5e1",
            value: "#cbd5e1",
        },
        ChartTheme::Orange => Palette {
            background: "#fff7ed",
            title: "#7c2d12",
            subtitle: "#9a3412",
            grid: "#fed7aa",
            axis: "#c2410c",
            line: "#ea580c",
            dot: "#ea580c",
            latest: "#7c2d12",
            fill: "#f97316",
            empty: "#9a3412",
            value: "#9a3412",
        },
    }
}

/// Title suffix, headline label and delta range for a chart type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMeta {
    pub title_suffix: &'static str,
    pub latest_label: &'static str,
    pub range_days: u64,
}

pub fn type_meta(chart_type: ChartType) -> TypeMeta {
    match chart_type {
        ChartType::TotalTrend => TypeMeta {
            title_suffix: "total trend",
            latest_label: "Latest total",
            range_days: 0,
        },
        ChartType::Daily => TypeMeta {
            title_suffix: "daily delta",
            latest_label: "Latest day",
            range_days: 1,
        },
        ChartType::Weekly => TypeMeta {
            title_suffix: "weekly delta",
            latest_label: "Latest week",
            range_days: 7,
        },
        ChartType::Monthly => TypeMeta {
            title_suffix: "monthly delta",
            latest_label: "Latest month",
            range_days: 30,
        },
    }
}
