use super::adapter::{ChartOptions, Plot, SeriesStyle, Size, View};
use super::dataset::ChartDataset;
use chrono::{Local, TimeZone};
use std::fmt::Write as _;

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Renders a dataset as one sparkline per series
#[derive(Debug, Clone)]
pub struct TextPlot {
    id: String,
    y_min: Option<f64>,
    y_max: Option<f64>,
    size: Size,
    series: Vec<SeriesStyle>,
    dataset: Option<ChartDataset>,
    view: View,
    loading_label: String,
    no_data_label: String,
    echo: bool,
}

impl TextPlot {
    pub fn new(options: &ChartOptions, size: Size) -> Self {
        Self {
            id: options.id.clone(),
            y_min: options.y_min,
            y_max: options.y_max,
            size,
            series: Vec::new(),
            dataset: None,
            view: View::Loading,
            loading_label: "Loading...".to_string(),
            no_data_label: "No data available".to_string(),
            echo: false,
        }
    }

    /// Text shown instead of the chart while loading or without data
    pub fn with_labels(mut self, loading: &str, no_data: &str) -> Self {
        self.loading_label = loading.to_string();
        self.no_data_label = no_data.to_string();
        self
    }

    /// Print every redraw to stdout
    pub fn echoing(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn series(&self) -> &[SeriesStyle] {
        &self.series
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        let overlay = match self.view {
            View::Loading => Some(&self.loading_label),
            View::NoData => Some(&self.no_data_label),
            View::Chart => None,
        };
        if let Some(label) = overlay {
            let _ = writeln!(out, "[{}] {}", self.id, label);
            return out;
        }

        let Some(dataset) = &self.dataset else {
            return out;
        };

        let span = match (dataset.timestamps.first(), dataset.timestamps.last()) {
            (Some(first), Some(last)) => {
                format!("{} - {}", format_time(*first), format_time(*last))
            }
            _ => String::new(),
        };
        let _ = writeln!(out, "[{}] {}", self.id, span);

        let label_width = self.series.iter().map(|s| s.label.len()).max().unwrap_or(0);
        let columns = self.size.width.saturating_sub(label_width as u32 + 32).max(8) as usize;

        for (style, values) in self.series.iter().zip(dataset.series.iter()) {
            let present: Vec<f64> = values.iter().flatten().copied().collect();
            let min = present.iter().copied().fold(f64::INFINITY, f64::min);
            let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let last = values.iter().rev().flatten().next();

            let lo = self.y_min.map_or(min, |y| y.min(min));
            let hi = self.y_max.map_or(max, |y| y.max(max));

            let _ = writeln!(
                out,
                "{:<width$} {} min {} max {} last {}",
                style.label,
                sparkline(values, columns, lo, hi),
                format_value(min, style.unit),
                format_value(max, style.unit),
                last.map_or_else(|| "-".to_string(), |v| format_value(*v, style.unit)),
                width = label_width,
            );
        }

        out
    }
}

impl Plot for TextPlot {
    fn add_series(&mut self, style: SeriesStyle) {
        self.series.push(style);
    }

    fn del_series(&mut self, index: usize) {
        if index >= 1 && index <= self.series.len() {
            self.series.remove(index - 1);
        }
    }

    fn set_data(&mut self, dataset: &ChartDataset) {
        self.dataset = Some(dataset.clone());
        self.view = View::Chart;

        if self.echo {
            print!("{}", self.render());
        }
    }

    fn set_size(&mut self, size: Size) {
        self.size = size;
    }

    fn set_view(&mut self, view: View) {
        self.view = view;

        if self.echo {
            print!("{}", self.render());
        }
    }
}

fn format_time(timestamp: i64) -> String {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn format_value(value: f64, unit: &str) -> String {
    if value.is_finite() {
        format!("{:.0} {}", value, unit)
    } else {
        "-".to_string()
    }
}

/// Downsample to `columns` buckets (max per bucket); gaps render as spaces
fn sparkline(values: &[Option<f64>], columns: usize, lo: f64, hi: f64) -> String {
    if values.is_empty() || columns == 0 {
        return String::new();
    }

    let range = hi - lo;
    let per_column = values.len().div_ceil(columns).max(1);

    values
        .chunks(per_column)
        .map(|bucket| {
            let peak = bucket
                .iter()
                .flatten()
                .copied()
                .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));

            match peak {
                None => ' ',
                Some(_) if range.is_nan() || range <= 0.0 => BARS[0],
                Some(v) => {
                    let level = ((v - lo) / range * (BARS.len() - 1) as f64).round();
                    BARS[level.clamp(0.0, (BARS.len() - 1) as f64) as usize]
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ChartOptions {
        ChartOptions {
            id: "energy".to_string(),
            y_min: None,
            y_max: None,
            aspect_ratio: 3.0,
            width: 80,
            visible: true,
            power_label: "Power".to_string(),
        }
    }

    #[test]
    fn test_sparkline_marks_gaps() {
        let line = sparkline(&[Some(0.0), None, Some(10.0)], 3, 0.0, 10.0);
        assert_eq!(line, "▁ █");
    }

    #[test]
    fn test_sparkline_flat_range_uses_lowest_bar() {
        assert_eq!(sparkline(&[Some(5.0), Some(5.0)], 2, 5.0, 5.0), "▁▁");
        assert_eq!(sparkline(&[Some(5.0)], 1, f64::NAN, f64::NAN), "▁");
    }

    #[test]
    fn test_sparkline_downsamples() {
        let values: Vec<Option<f64>> = (0..288).map(|i| Some(i as f64)).collect();
        let line = sparkline(&values, 48, 0.0, 287.0);
        assert_eq!(line.chars().count(), 48);
    }

    #[test]
    fn test_overlay_labels_replace_chart() {
        let mut plot = TextPlot::new(&options(), Size { width: 80, height: 26 })
            .with_labels("Lädt...", "Keine Daten");

        assert_eq!(plot.render(), "[energy] Lädt...\n");

        plot.set_view(View::NoData);
        assert_eq!(plot.render(), "[energy] Keine Daten\n");

        plot.set_data(&ChartDataset {
            stamp: 1,
            names: vec![String::new()],
            timestamps: vec![0],
            series: vec![vec![Some(1.0)]],
        });
        assert_eq!(plot.view(), View::Chart);
        assert!(!plot.render().contains("Keine Daten"));
    }

    #[test]
    fn test_render_lists_series() {
        let mut plot = TextPlot::new(&options(), Size { width: 80, height: 26 });
        plot.add_series(SeriesStyle {
            label: "Power Garage".to_string(),
            stroke: "#1f77b4",
            width: 2,
            unit: "W",
        });
        plot.set_data(&ChartDataset {
            stamp: 1,
            names: vec!["Garage".to_string()],
            timestamps: vec![0, 300, 600],
            series: vec![vec![Some(100.0), None, Some(1500.0)]],
        });

        let rendered = plot.render();
        assert!(rendered.starts_with("[energy]"));
        assert!(rendered.contains("Power Garage"));
        assert!(rendered.contains("max 1500 W"));
        assert!(rendered.contains("last 1500 W"));
    }
}
