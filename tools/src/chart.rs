//! `generate_chart` tool: declaration, argument checking and SVG rendering.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use gemdesk_types::{ChartData, ChartSpec, ChartSpecError, ChartType, SeriesPoints, ToolDefinition};
use gemdesk_utils::{AtomicWriteOptions, OverwritePolicy, atomic_write, atomic_write_with_options};
use serde_json::{Value, json};
use thiserror::Error;

pub const CHART_TOOL_NAME: &str = "generate_chart";

const CHART_TOOL_DESCRIPTION: &str = "Generate a chart/graph to visualize data. Use this when the user asks to plot, chart, graph, or visualize data.";

/// matplotlib's default cycle.
const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

const MAX_EXPORT_ATTEMPTS: u32 = 100;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("{0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Spec(#[from] ChartSpecError),
    #[error("Failed to export chart: {0}")]
    Export(#[source] std::io::Error),
}

#[must_use]
pub fn chart_tool_definition() -> ToolDefinition {
    let number_array = |description: &str| {
        json!({"type": "array", "items": {"type": "number"}, "description": description})
    };
    ToolDefinition::new(
        CHART_TOOL_NAME,
        CHART_TOOL_DESCRIPTION,
        json!({
            "type": "object",
            "properties": {
                "chart_type": {
                    "type": "string",
                    "enum": ["line", "bar", "pie", "scatter"],
                    "description": "Type of chart to generate"
                },
                "title": {"type": "string", "description": "Chart title"},
                "x_label": {"type": "string", "description": "X-axis label (optional)"},
                "y_label": {"type": "string", "description": "Y-axis label (optional)"},
                "data": {
                    "type": "object",
                    "description": "Chart data with labels and values",
                    "properties": {
                        "labels": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Data labels (for bar/line/pie)"
                        },
                        "values": number_array("Data values (for single series)"),
                        "x": number_array("X coordinates (for scatter/line)"),
                        "y": number_array("Y coordinates (for scatter/line)"),
                        "series": {
                            "type": "array",
                            "description": "Multiple data series",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "name": {"type": "string"},
                                    "values": {"type": "array", "items": {"type": "number"}},
                                    "x": number_array("X coordinates for this series (scatter/line)"),
                                    "y": number_array("Y coordinates for this series (scatter/line)")
                                }
                            }
                        }
                    }
                }
            },
            "required": ["chart_type", "title", "data"]
        }),
    )
}

/// Decode `generate_chart` arguments and check them against the tool schema.
///
/// `chart_type` is accepted case-insensitively and a missing title falls back
/// to `"Chart"`, as the model sometimes omits it.
pub fn chart_spec_from_call(args: &Value) -> Result<ChartSpec, ChartError> {
    let spec = ChartSpec::from_args(args)?;

    let mut normalized = args.clone();
    if let Some(obj) = normalized.as_object_mut() {
        obj.insert("chart_type".into(), Value::from(spec.chart_type.as_str()));
        obj.entry("title").or_insert_with(|| Value::from(spec.title.clone()));
        if let Some(labels) = obj
            .get_mut("data")
            .and_then(|data| data.get_mut("labels"))
            .and_then(Value::as_array_mut)
        {
            // Year-style numeric labels are categories too.
            for label in labels.iter_mut().filter(|label| label.is_number()) {
                *label = Value::from(label.to_string());
            }
        }
    }
    let schema = chart_tool_definition().parameters;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| ChartError::InvalidArguments(format!("Invalid chart schema: {e}")))?;
    validator
        .validate(&normalized)
        .map_err(|e| ChartError::InvalidArguments(e.to_string()))?;
    Ok(spec)
}

/// A rendered chart awaiting export or dismissal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedChart {
    title: String,
    svg: String,
}

impl RenderedChart {
    pub const MIME_TYPE: &'static str = "image/svg+xml";
    pub const EXTENSION: &'static str = "svg";

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn svg(&self) -> &str {
        &self.svg
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.svg.as_bytes()
    }

    /// Write to `path`, replacing any existing file.
    pub fn export(&self, path: &Path) -> Result<(), ChartError> {
        atomic_write(path, self.as_bytes()).map_err(ChartError::Export)?;
        tracing::info!(path = %path.display(), "Chart exported");
        Ok(())
    }

    /// Write to `gemdesk_chart_<unix time>.svg` in `dir` without replacing
    /// anything; returns the path written.
    pub fn export_to_dir(&self, dir: &Path) -> Result<PathBuf, ChartError> {
        let stamp = chrono::Utc::now().timestamp();
        let options = AtomicWriteOptions {
            overwrite: OverwritePolicy::FailIfExists,
            ..AtomicWriteOptions::default()
        };
        for attempt in 0..MAX_EXPORT_ATTEMPTS {
            let name = if attempt == 0 {
                format!("gemdesk_chart_{stamp}.{}", Self::EXTENSION)
            } else {
                format!("gemdesk_chart_{stamp}_{attempt}.{}", Self::EXTENSION)
            };
            let path = dir.join(name);
            match atomic_write_with_options(&path, self.as_bytes(), options) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "Chart exported");
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(ChartError::Export(e)),
            }
        }
        Err(ChartError::Export(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "no free export file name",
        )))
    }
}

/// Turns a chart spec into an image.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, spec: &ChartSpec) -> Result<RenderedChart, ChartError>;
}

/// Renders charts as standalone SVG documents.
#[derive(Debug, Clone, Copy)]
pub struct SvgChartRenderer {
    width: f64,
    height: f64,
}

impl Default for SvgChartRenderer {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 600.0,
        }
    }
}

impl ChartRenderer for SvgChartRenderer {
    fn render(&self, spec: &ChartSpec) -> Result<RenderedChart, ChartError> {
        let mut canvas = Canvas::new(self.width, self.height);
        canvas.text(
            self.width / 2.0,
            36.0,
            &spec.title,
            "font-size=\"20\" font-weight=\"bold\" text-anchor=\"middle\"",
        );

        match spec.chart_type {
            ChartType::Pie => draw_pie(&mut canvas, spec)?,
            ChartType::Bar => draw_bar(&mut canvas, spec),
            ChartType::Line => draw_points(&mut canvas, spec, Marks::Line),
            ChartType::Scatter => draw_points(&mut canvas, spec, Marks::Scatter),
        }

        Ok(RenderedChart {
            title: spec.title.clone(),
            svg: canvas.finish(),
        })
    }
}

// ============================================================================
// SVG canvas
// ============================================================================

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

struct Canvas {
    width: f64,
    height: f64,
    body: String,
}

impl Canvas {
    fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            body: String::new(),
        }
    }

    fn text(&mut self, x: f64, y: f64, text: &str, attrs: &str) {
        let _ = writeln!(
            self.body,
            r#"<text x="{x:.1}" y="{y:.1}" {attrs}>{}</text>"#,
            escape(text)
        );
    }

    fn line(&mut self, (x1, y1): (f64, f64), (x2, y2): (f64, f64), attrs: &str) {
        let _ = writeln!(
            self.body,
            r#"<line x1="{x1:.1}" y1="{y1:.1}" x2="{x2:.1}" y2="{y2:.1}" {attrs}/>"#
        );
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str) {
        let _ = writeln!(
            self.body,
            r#"<rect x="{x:.1}" y="{y:.1}" width="{w:.1}" height="{h:.1}" fill="{fill}"/>"#
        );
    }

    fn circle(&mut self, cx: f64, cy: f64, r: f64, fill: &str, opacity: f64) {
        let _ = writeln!(
            self.body,
            r#"<circle cx="{cx:.1}" cy="{cy:.1}" r="{r:.1}" fill="{fill}" fill-opacity="{opacity}"/>"#
        );
    }

    fn polyline(&mut self, points: &[(f64, f64)], stroke: &str) {
        let coords: Vec<String> = points
            .iter()
            .map(|(x, y)| format!("{x:.1},{y:.1}"))
            .collect();
        let _ = writeln!(
            self.body,
            r#"<polyline points="{}" fill="none" stroke="{stroke}" stroke-width="2"/>"#,
            coords.join(" ")
        );
    }

    fn path(&mut self, d: &str, fill: &str) {
        let _ = writeln!(
            self.body,
            r#"<path d="{d}" fill="{fill}" stroke="white" stroke-width="1"/>"#
        );
    }

    fn finish(self) -> String {
        format!(
            concat!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" "#,
                r#"viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
                "\n",
                r#"<rect width="100%" height="100%" fill="white"/>"#,
                "\n{body}</svg>\n"
            ),
            w = self.width,
            h = self.height,
            body = self.body
        )
    }
}

// ============================================================================
// Axes
// ============================================================================

const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 80.0;
const LEGEND_WIDTH: f64 = 170.0;
const TICK_TARGET: usize = 5;

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        let text = format!("{value:.2}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Rounded axis bounds and evenly spaced ticks covering `[min, max]`.
fn nice_scale(min: f64, max: f64) -> (f64, f64, Vec<f64>) {
    let (min, max) = if (max - min).abs() < f64::EPSILON {
        (min - 1.0, max + 1.0)
    } else {
        (min, max)
    };
    let raw_step = (max - min) / TICK_TARGET as f64;
    let magnitude = 10f64.powf(raw_step.log10().floor());
    let normalized = raw_step / magnitude;
    let step = if normalized <= 1.0 {
        1.0
    } else if normalized <= 2.0 {
        2.0
    } else if normalized <= 5.0 {
        5.0
    } else {
        10.0
    } * magnitude;

    let lo = (min / step).floor() * step;
    let hi = (max / step).ceil() * step;
    let ticks = (0..=50)
        .map(|i| lo + f64::from(i) * step)
        .take_while(|t| *t <= hi + step * 1e-9)
        .collect();
    (lo, hi, ticks)
}

#[derive(Debug, Clone, Copy)]
struct Plot {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    y_min: f64,
    y_max: f64,
}

impl Plot {
    fn new(canvas: &Canvas, legend: bool, y_min: f64, y_max: f64) -> Self {
        let right = MARGIN_RIGHT + if legend { LEGEND_WIDTH } else { 0.0 };
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: canvas.width - MARGIN_LEFT - right,
            height: canvas.height - MARGIN_TOP - MARGIN_BOTTOM,
            y_min,
            y_max,
        }
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }

    fn y(&self, value: f64) -> f64 {
        self.bottom() - (value - self.y_min) / (self.y_max - self.y_min) * self.height
    }
}

enum XAxis<'a> {
    Categories(&'a [String]),
    Numeric { min: f64, max: f64 },
}

impl XAxis<'_> {
    fn x(&self, plot: &Plot, value: f64) -> f64 {
        match self {
            XAxis::Categories(labels) => {
                let band = plot.width / labels.len().max(1) as f64;
                plot.left + (value + 0.5) * band
            }
            XAxis::Numeric { min, max } => plot.left + (value - min) / (max - min) * plot.width,
        }
    }
}

fn draw_axes(canvas: &mut Canvas, plot: &Plot, y_ticks: &[f64], x_axis: &XAxis<'_>, spec: &ChartSpec) {
    let grid = r##"stroke="#b0b0b0" stroke-opacity="0.3""##;
    let axis = r#"stroke="black" stroke-width="1""#;
    let tick_font = r#"font-size="12" text-anchor="end""#;

    for tick in y_ticks {
        let y = plot.y(*tick);
        canvas.line((plot.left, y), (plot.left + plot.width, y), grid);
        canvas.text(plot.left - 8.0, y + 4.0, &format_number(*tick), tick_font);
    }

    match x_axis {
        XAxis::Categories(labels) => {
            let rotate = labels.len() > 8;
            for (i, label) in labels.iter().enumerate() {
                let x = x_axis.x(plot, i as f64);
                let y = plot.bottom() + 18.0;
                if rotate {
                    canvas.text(
                        x,
                        y,
                        label,
                        &format!(
                            r#"font-size="12" text-anchor="end" transform="rotate(-45 {x:.1} {y:.1})""#
                        ),
                    );
                } else {
                    canvas.text(x, y, label, r#"font-size="12" text-anchor="middle""#);
                }
            }
        }
        XAxis::Numeric { min, max } => {
            let (_, _, ticks) = nice_scale(*min, *max);
            for tick in ticks.iter().filter(|t| **t >= *min && **t <= *max) {
                let x = x_axis.x(plot, *tick);
                canvas.line((x, plot.top), (x, plot.bottom()), grid);
                canvas.text(
                    x,
                    plot.bottom() + 18.0,
                    &format_number(*tick),
                    r#"font-size="12" text-anchor="middle""#,
                );
            }
        }
    }

    canvas.line((plot.left, plot.top), (plot.left, plot.bottom()), axis);
    canvas.line(
        (plot.left, plot.bottom()),
        (plot.left + plot.width, plot.bottom()),
        axis,
    );

    if let Some(label) = &spec.x_label {
        canvas.text(
            plot.left + plot.width / 2.0,
            canvas.height - 16.0,
            label,
            r#"font-size="14" text-anchor="middle""#,
        );
    }
    if let Some(label) = &spec.y_label {
        let (x, y) = (20.0, plot.top + plot.height / 2.0);
        canvas.text(
            x,
            y,
            label,
            &format!(r#"font-size="14" text-anchor="middle" transform="rotate(-90 {x:.1} {y:.1})""#),
        );
    }
}

fn draw_legend(canvas: &mut Canvas, plot: &Plot, names: &[&str]) {
    let x = plot.left + plot.width + 20.0;
    for (i, name) in names.iter().enumerate() {
        let y = plot.top + 10.0 + i as f64 * 22.0;
        canvas.rect(x, y, 14.0, 14.0, PALETTE[i % PALETTE.len()]);
        canvas.text(x + 20.0, y + 12.0, name, r#"font-size="13""#);
    }
}

fn value_range(values: impl Iterator<Item = f64>, include_zero: bool) -> (f64, f64) {
    let (mut lo, mut hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if include_zero {
        lo = lo.min(0.0);
        hi = hi.max(0.0);
    }
    (lo, hi)
}

// ============================================================================
// Chart types
// ============================================================================

fn draw_bar(canvas: &mut Canvas, spec: &ChartSpec) {
    let fallback_labels: Vec<String>;
    let (labels, groups): (&[String], Vec<(&str, Vec<f64>)>) = match &spec.data {
        ChartData::Labeled { labels, values } => (labels.as_slice(), vec![("", values.clone())]),
        ChartData::Xy { x, y } => {
            fallback_labels = x.iter().map(|v| format_number(*v)).collect();
            (fallback_labels.as_slice(), vec![("", y.clone())])
        }
        ChartData::Series { labels, series } => {
            let groups: Vec<_> = series
                .iter()
                .map(|s| match &s.points {
                    SeriesPoints::Values(values) => (s.name.as_str(), values.clone()),
                    SeriesPoints::Xy { y, .. } => (s.name.as_str(), y.clone()),
                })
                .collect();
            let longest = groups.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
            if labels.len() >= longest {
                (labels.as_slice(), groups)
            } else {
                fallback_labels = (1..=longest).map(|n| n.to_string()).collect();
                (fallback_labels.as_slice(), groups)
            }
        }
    };

    let legend = matches!(spec.data, ChartData::Series { .. });
    let (lo, hi) = value_range(groups.iter().flat_map(|(_, v)| v.iter().copied()), true);
    let (y_min, y_max, ticks) = nice_scale(lo, hi);
    let plot = Plot::new(canvas, legend, y_min, y_max);
    let x_axis = XAxis::Categories(labels);
    draw_axes(canvas, &plot, &ticks, &x_axis, spec);

    let band = plot.width / labels.len().max(1) as f64;
    let bar_width = band * 0.8 / groups.len() as f64;
    let baseline = plot.y(0.0);
    for (series_idx, (_, values)) in groups.iter().enumerate() {
        let color = PALETTE[series_idx % PALETTE.len()];
        for (i, value) in values.iter().enumerate().take(labels.len()) {
            let x = plot.left + i as f64 * band + band * 0.1 + series_idx as f64 * bar_width;
            let y = plot.y(*value);
            canvas.rect(x, y.min(baseline), bar_width, (baseline - y).abs(), color);
        }
    }

    if legend {
        let names: Vec<&str> = groups.iter().map(|(name, _)| *name).collect();
        draw_legend(canvas, &plot, &names);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marks {
    Line,
    Scatter,
}

fn draw_points(canvas: &mut Canvas, spec: &ChartSpec, marks: Marks) {
    let positional_labels: Vec<String>;
    let (x_labels, series): (Option<&[String]>, Vec<(&str, Vec<(f64, f64)>)>) = match &spec.data {
        ChartData::Labeled { labels, values } => (
            Some(labels.as_slice()),
            vec![("", values.iter().enumerate().map(|(i, v)| (i as f64, *v)).collect())],
        ),
        ChartData::Xy { x, y } => (None, vec![("", x.iter().copied().zip(y.iter().copied()).collect())]),
        ChartData::Series { labels, series } => {
            let all_values = series
                .iter()
                .all(|s| matches!(s.points, SeriesPoints::Values(_)));
            let points: Vec<_> = series
                .iter()
                .map(|s| {
                    let pts = match &s.points {
                        SeriesPoints::Values(values) => values
                            .iter()
                            .enumerate()
                            .map(|(i, v)| (i as f64, *v))
                            .collect(),
                        SeriesPoints::Xy { x, y } => {
                            x.iter().copied().zip(y.iter().copied()).collect()
                        }
                    };
                    (s.name.as_str(), pts)
                })
                .collect();
            let longest = series.iter().map(|s| s.points.len()).max().unwrap_or(0);
            let x_labels = if !all_values {
                None
            } else if labels.len() >= longest {
                Some(labels.as_slice())
            } else {
                positional_labels = (1..=longest).map(|n| n.to_string()).collect();
                Some(positional_labels.as_slice())
            };
            (x_labels, points)
        }
    };

    let legend = matches!(spec.data, ChartData::Series { .. });
    let (lo, hi) = value_range(
        series.iter().flat_map(|(_, pts)| pts.iter().map(|(_, y)| *y)),
        false,
    );
    let (y_min, y_max, ticks) = nice_scale(lo, hi);
    let plot = Plot::new(canvas, legend, y_min, y_max);

    let x_axis = match x_labels {
        Some(labels) => XAxis::Categories(labels),
        None => {
            let (min, max) = value_range(
                series.iter().flat_map(|(_, pts)| pts.iter().map(|(x, _)| *x)),
                false,
            );
            let pad = if (max - min).abs() < f64::EPSILON { 1.0 } else { (max - min) * 0.05 };
            XAxis::Numeric {
                min: min - pad,
                max: max + pad,
            }
        }
    };
    draw_axes(canvas, &plot, &ticks, &x_axis, spec);

    for (idx, (_, points)) in series.iter().enumerate() {
        let color = PALETTE[idx % PALETTE.len()];
        let mapped: Vec<(f64, f64)> = points
            .iter()
            .map(|(x, y)| (x_axis.x(&plot, *x), plot.y(*y)))
            .collect();
        match marks {
            Marks::Line => {
                canvas.polyline(&mapped, color);
                for (x, y) in &mapped {
                    canvas.circle(*x, *y, 4.0, color, 1.0);
                }
            }
            Marks::Scatter => {
                for (x, y) in &mapped {
                    canvas.circle(*x, *y, 5.0, color, 0.6);
                }
            }
        }
    }

    if legend {
        let names: Vec<&str> = series.iter().map(|(name, _)| *name).collect();
        draw_legend(canvas, &plot, &names);
    }
}

fn draw_pie(canvas: &mut Canvas, spec: &ChartSpec) -> Result<(), ChartError> {
    let ChartData::Labeled { labels, values } = &spec.data else {
        return Err(ChartSpecError::Shape("pie chart requires labels and values".to_string()).into());
    };
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return Err(ChartSpecError::Shape("pie chart values sum to zero".to_string()).into());
    }

    let cx = canvas.width / 2.0;
    let cy = MARGIN_TOP + (canvas.height - MARGIN_TOP - 20.0) / 2.0;
    let radius = ((canvas.height - MARGIN_TOP - 20.0) / 2.0) * 0.8;
    let point = |angle: f64, r: f64| (cx + r * angle.cos(), cy - r * angle.sin());

    // Counter-clockwise from 12 o'clock
    let mut start = std::f64::consts::FRAC_PI_2;
    for (i, (label, value)) in labels.iter().zip(values).enumerate() {
        if *value <= 0.0 {
            continue;
        }
        let color = PALETTE[i % PALETTE.len()];
        let fraction = value / total;
        let sweep = fraction * std::f64::consts::TAU;
        let end = start + sweep;

        if fraction >= 0.9999 {
            canvas.circle(cx, cy, radius, color, 1.0);
        } else {
            let (x0, y0) = point(start, radius);
            let (x1, y1) = point(end, radius);
            let large_arc = u8::from(fraction > 0.5);
            let d = format!(
                "M {cx:.1} {cy:.1} L {x0:.1} {y0:.1} A {radius:.1} {radius:.1} 0 {large_arc} 0 {x1:.1} {y1:.1} Z"
            );
            canvas.path(&d, color);
        }

        let mid = start + sweep / 2.0;
        let (px, py) = point(mid, radius * 0.6);
        canvas.text(
            px,
            py + 4.0,
            &format!("{:.1}%", fraction * 100.0),
            r#"font-size="13" text-anchor="middle""#,
        );
        let (lx, ly) = point(mid, radius * 1.1);
        let anchor = if mid.cos() >= 0.0 { "start" } else { "end" };
        canvas.text(
            lx,
            ly + 4.0,
            label,
            &format!(r#"font-size="14" text-anchor="{anchor}""#),
        );

        start = end;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(args: &Value) -> Result<RenderedChart, ChartError> {
        let spec = chart_spec_from_call(args)?;
        SvgChartRenderer::default().render(&spec)
    }

    #[test]
    fn tool_definition_requires_core_fields() {
        let def = chart_tool_definition();
        assert_eq!(def.name, CHART_TOOL_NAME);
        assert_eq!(
            def.parameters["required"],
            json!(["chart_type", "title", "data"])
        );
        assert_eq!(
            def.parameters["properties"]["chart_type"]["enum"],
            json!(["line", "bar", "pie", "scatter"])
        );
    }

    #[test]
    fn renders_every_chart_type() {
        let cases = [
            json!({"chart_type": "bar", "title": "Sales", "data": {"labels": ["A", "B"], "values": [3, 5]}}),
            json!({"chart_type": "bar", "title": "Grouped", "data": {
                "labels": ["Q1", "Q2"],
                "series": [{"name": "2024", "values": [1, 2]}, {"name": "2025", "values": [2, 3]}]
            }}),
            json!({"chart_type": "line", "title": "Trend", "x_label": "Month", "y_label": "Users",
                   "data": {"x": [1, 2, 3], "y": [10, 20, 15]}}),
            json!({"chart_type": "line", "title": "Two lines", "data": {
                "series": [{"name": "a", "values": [1, 2, 3]}, {"name": "b", "x": [0, 2], "y": [3, 1]}]
            }}),
            json!({"chart_type": "pie", "title": "Share", "data": {"labels": ["x", "y", "z"], "values": [1, 1, 2]}}),
            json!({"chart_type": "scatter", "title": "Spread", "data": {"x": [1.5, 2.5], "y": [3, -4]}}),
        ];
        for args in cases {
            let chart = render(&args).unwrap_or_else(|e| panic!("{args}: {e}"));
            assert!(chart.svg().starts_with("<svg"));
            assert!(chart.svg().trim_end().ends_with("</svg>"));
        }
    }

    #[test]
    fn multi_series_gets_legend() {
        let chart = render(&json!({"chart_type": "bar", "title": "T", "data": {
            "labels": ["Q1"],
            "series": [{"name": "North", "values": [1]}, {"name": "South", "values": [2]}]
        }}))
        .unwrap();
        assert!(chart.svg().contains(">North</text>"));
        assert!(chart.svg().contains(">South</text>"));
    }

    #[test]
    fn pie_labels_show_percentages() {
        let chart = render(&json!({"chart_type": "pie", "title": "Split",
            "data": {"labels": ["a", "b"], "values": [1, 3]}}))
        .unwrap();
        assert!(chart.svg().contains(">25.0%<"));
        assert!(chart.svg().contains(">75.0%<"));
    }

    #[test]
    fn numeric_labels_render_as_categories() {
        let args = json!({"chart_type": "bar", "title": "Revenue",
            "data": {"labels": [2020, 2021], "values": [1, 2]}});
        let spec = chart_spec_from_call(&args).unwrap();
        assert_eq!(
            spec.data,
            ChartData::Labeled {
                labels: vec!["2020".to_string(), "2021".to_string()],
                values: vec![1.0, 2.0],
            }
        );

        let chart = render(&args).unwrap();
        assert!(chart.svg().contains(">2020</text>"));
        assert!(chart.svg().contains(">2021</text>"));
    }

    #[test]
    fn title_is_escaped() {
        let chart = render(&json!({"chart_type": "bar", "title": "R&D <2025>",
            "data": {"labels": ["a"], "values": [1]}}))
        .unwrap();
        assert_eq!(chart.title(), "R&D <2025>");
        assert!(chart.svg().contains("R&amp;D &lt;2025&gt;"));
    }

    #[test]
    fn invalid_arguments_are_descriptive() {
        let err = render(&json!({"chart_type": "donut", "title": "x", "data": {"values": [1]}}))
            .unwrap_err();
        assert!(err.to_string().contains("invalid chart_type: donut"), "{err}");

        let err = render(&json!({"title": "x", "data": {"values": [1]}})).unwrap_err();
        assert_eq!(err.to_string(), "missing required field: chart_type");

        let err = render(&json!({"chart_type": "bar", "title": "x"})).unwrap_err();
        assert_eq!(err.to_string(), "missing required field: data");

        let err = render(&json!({"chart_type": "bar", "title": 7, "data": {"values": [1]}}))
            .unwrap_err();
        assert!(matches!(err, ChartError::InvalidArguments(_)), "{err}");
    }

    #[test]
    fn case_insensitive_type_and_default_title() {
        let spec = chart_spec_from_call(&json!({"chart_type": "Line", "data": {"values": [1, 2]}}))
            .unwrap();
        assert_eq!(spec.chart_type, ChartType::Line);
        assert_eq!(spec.title, "Chart");
    }

    #[test]
    fn nice_scale_covers_range() {
        let (lo, hi, ticks) = nice_scale(0.0, 17.0);
        assert!(lo <= 0.0 && hi >= 17.0);
        assert_eq!(ticks.first().copied(), Some(lo));
        assert!(ticks.len() >= 2);
        let (lo, hi, _) = nice_scale(5.0, 5.0);
        assert!(lo < 5.0 && hi > 5.0);
    }

    #[test]
    fn export_writes_file_and_avoids_clobbering() {
        let dir = tempfile::tempdir().unwrap();
        let chart = render(&json!({"chart_type": "bar", "title": "T",
            "data": {"labels": ["a"], "values": [1]}}))
        .unwrap();

        let first = chart.export_to_dir(dir.path()).unwrap();
        let second = chart.export_to_dir(dir.path()).unwrap();
        assert_ne!(first, second);
        assert_eq!(std::fs::read_to_string(&first).unwrap(), chart.svg());

        let explicit = dir.path().join("mine.svg");
        chart.export(&explicit).unwrap();
        assert!(explicit.exists());
    }
}
