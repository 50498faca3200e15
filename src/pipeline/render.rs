//! Chart rendering seam for the aggregation stage
//!
//! The stage produces a finished series; turning it into pixels is a
//! collaborator concern behind [`ChartRenderer`]. The bundled
//! [`HtmlChartRenderer`] writes a self-contained document with two aligned
//! panels over the shared period axis - revenue totals as a line, distinct
//! customers as bars.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::types::AggregateRow;

#[derive(Debug)]
pub enum RenderError {
    Io(std::io::Error),
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::Io(err)
    }
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for RenderError {}

#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Render the aggregate series for a table. An empty series is valid
    /// input and must produce a valid (if vacant) document.
    async fn render(&self, table: &str, series: &[AggregateRow]) -> Result<(), RenderError>;
}

const PANEL_WIDTH: f64 = 900.0;
const PANEL_HEIGHT: f64 = 260.0;
const MARGIN_LEFT: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 40.0;
const MARGIN_TOP: f64 = 30.0;

/// Writes the chart document to a fixed location, overwriting the previous
/// one on every refresh.
pub struct HtmlChartRenderer {
    output_path: PathBuf,
}

impl HtmlChartRenderer {
    pub fn new(output_path: impl AsRef<Path>) -> Self {
        Self {
            output_path: output_path.as_ref().to_path_buf(),
        }
    }

    fn build_document(table: &str, series: &[AggregateRow]) -> String {
        let body = if series.is_empty() {
            format!("<p>No data yet for table <code>{}</code>.</p>", table)
        } else {
            let totals: Vec<f64> = series.iter().map(|row| row.total_amount).collect();
            let counts: Vec<f64> = series.iter().map(|row| row.distinct_customers as f64).collect();
            let labels: Vec<&str> = series.iter().map(|row| row.period.as_str()).collect();

            format!(
                "<h2>Totals per Month</h2>\n{}\n<h2>Counts per New Customers</h2>\n{}",
                line_panel(&labels, &totals),
                bar_panel(&labels, &counts),
            )
        };

        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>Monthly invoice aggregates - {table}</title>\n</head>\n\
             <body>\n<h1>Table: {table}</h1>\n{body}\n</body>\n</html>\n",
            table = table,
            body = body,
        )
    }
}

fn x_position(index: usize, n: usize) -> f64 {
    let plot_width = PANEL_WIDTH - MARGIN_LEFT - 20.0;
    let step = plot_width / n as f64;
    MARGIN_LEFT + step * (index as f64 + 0.5)
}

fn y_position(value: f64, max: f64) -> f64 {
    let plot_height = PANEL_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    PANEL_HEIGHT - MARGIN_BOTTOM - (value / max) * plot_height
}

fn axis_and_labels(labels: &[&str], max: f64) -> String {
    let mut svg = String::new();
    let baseline = PANEL_HEIGHT - MARGIN_BOTTOM;

    svg.push_str(&format!(
        "<line x1=\"{left}\" y1=\"{base}\" x2=\"{right}\" y2=\"{base}\" stroke=\"#333\"/>\n\
         <line x1=\"{left}\" y1=\"{top}\" x2=\"{left}\" y2=\"{base}\" stroke=\"#333\"/>\n\
         <text x=\"{left}\" y=\"{label_y}\" font-size=\"11\" text-anchor=\"end\">{max:.2}</text>\n",
        left = MARGIN_LEFT,
        right = PANEL_WIDTH - 20.0,
        base = baseline,
        top = MARGIN_TOP,
        label_y = MARGIN_TOP + 4.0,
        max = max,
    ));

    for (i, label) in labels.iter().enumerate() {
        svg.push_str(&format!(
            "<text x=\"{x:.1}\" y=\"{y}\" font-size=\"11\" text-anchor=\"middle\">{label}</text>\n",
            x = x_position(i, labels.len()),
            y = baseline + 16.0,
            label = label,
        ));
    }

    svg
}

fn line_panel(labels: &[&str], values: &[f64]) -> String {
    let max = values.iter().cloned().fold(0.0, f64::max).max(1e-9);

    let points: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, v)| format!("{:.1},{:.1}", x_position(i, values.len()), y_position(*v, max)))
        .collect();

    format!(
        "<svg width=\"{w}\" height=\"{h}\">\n{axis}\
         <polyline points=\"{points}\" fill=\"none\" stroke=\"#1f77b4\" stroke-width=\"2\"/>\n</svg>",
        w = PANEL_WIDTH,
        h = PANEL_HEIGHT,
        axis = axis_and_labels(labels, max),
        points = points.join(" "),
    )
}

fn bar_panel(labels: &[&str], values: &[f64]) -> String {
    let max = values.iter().cloned().fold(0.0, f64::max).max(1e-9);
    let step = (PANEL_WIDTH - MARGIN_LEFT - 20.0) / values.len() as f64;
    let bar_width = (step * 0.6).min(60.0);

    let mut bars = String::new();
    for (i, v) in values.iter().enumerate() {
        let top = y_position(*v, max);
        bars.push_str(&format!(
            "<rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{w:.1}\" height=\"{h:.1}\" fill=\"#ff7f0e\"/>\n",
            x = x_position(i, values.len()) - bar_width / 2.0,
            y = top,
            w = bar_width,
            h = (PANEL_HEIGHT - MARGIN_BOTTOM) - top,
        ));
    }

    format!(
        "<svg width=\"{w}\" height=\"{h}\">\n{axis}{bars}</svg>",
        w = PANEL_WIDTH,
        h = PANEL_HEIGHT,
        axis = axis_and_labels(labels, max),
        bars = bars,
    )
}

#[async_trait]
impl ChartRenderer for HtmlChartRenderer {
    async fn render(&self, table: &str, series: &[AggregateRow]) -> Result<(), RenderError> {
        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let document = Self::build_document(table, series);
        std::fs::write(&self.output_path, document)?;

        log::info!(
            "📈 Wrote chart for table {} ({} periods) to {}",
            table,
            series.len(),
            self.output_path.display()
        );
        Ok(())
    }
}

/// Renderer that only records what it was asked to draw. Used by tests and
/// by deployments that run the pipeline without a chart output.
#[derive(Default)]
pub struct NullRenderer {
    calls: Mutex<Vec<(String, Vec<AggregateRow>)>>,
}

impl NullRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, Vec<AggregateRow>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChartRenderer for NullRenderer {
    async fn render(&self, table: &str, series: &[AggregateRow]) -> Result<(), RenderError> {
        self.calls
            .lock()
            .unwrap()
            .push((table.to_string(), series.to_vec()));
        Ok(())
    }
}
