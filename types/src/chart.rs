//! Chart specifications produced by the `generate_chart` function call.
//!
//! Arguments arrive as loose JSON; [`ChartSpec::from_args`] decodes them once
//! into a typed spec whose `data` shape is fixed, so renderers never probe keys.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartSpecError {
    #[error("chart arguments must be a JSON object")]
    NotAnObject,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid chart_type: {0} (expected line, bar, pie or scatter)")]
    InvalidChartType(String),
    #[error("{field} must be an array of {expected}")]
    InvalidArray {
        field: String,
        expected: &'static str,
    },
    #[error("{0}")]
    Shape(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Scatter,
}

impl ChartType {
    pub const ALL: [ChartType; 4] = [
        ChartType::Line,
        ChartType::Bar,
        ChartType::Pie,
        ChartType::Scatter,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Pie => "pie",
            ChartType::Scatter => "scatter",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
    }
}

/// Points of one named series.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesPoints {
    /// Values indexed by the shared labels (or position).
    Values(Vec<f64>),
    Xy { x: Vec<f64>, y: Vec<f64> },
}

impl SeriesPoints {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            SeriesPoints::Values(values) => values.len(),
            SeriesPoints::Xy { x, .. } => x.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub points: SeriesPoints,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    Labeled {
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Xy {
        x: Vec<f64>,
        y: Vec<f64>,
    },
    Series {
        labels: Vec<String>,
        series: Vec<Series>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub chart_type: ChartType,
    pub title: String,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub data: ChartData,
}

impl ChartSpec {
    /// Decode and shape-check `generate_chart` arguments.
    pub fn from_args(args: &Value) -> Result<Self, ChartSpecError> {
        let obj = args.as_object().ok_or(ChartSpecError::NotAnObject)?;

        let raw_type = obj
            .get("chart_type")
            .ok_or(ChartSpecError::MissingField("chart_type"))?;
        let raw_type = raw_type
            .as_str()
            .ok_or_else(|| ChartSpecError::InvalidChartType(raw_type.to_string()))?;
        let chart_type = ChartType::parse(raw_type)
            .ok_or_else(|| ChartSpecError::InvalidChartType(raw_type.to_string()))?;

        let data = obj
            .get("data")
            .ok_or(ChartSpecError::MissingField("data"))?
            .as_object()
            .ok_or_else(|| ChartSpecError::Shape("data must be an object".to_string()))?;

        let title = optional_string(obj, "title").unwrap_or_else(|| "Chart".to_string());
        let data = decode_data(data)?;
        check_shape(chart_type, &data)?;

        Ok(Self {
            chart_type,
            title,
            x_label: optional_string(obj, "x_label"),
            y_label: optional_string(obj, "y_label"),
            data,
        })
    }
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn numbers(value: &Value, field: &str) -> Result<Vec<f64>, ChartSpecError> {
    let invalid = || ChartSpecError::InvalidArray {
        field: field.to_string(),
        expected: "numbers",
    };
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|item| item.as_f64().filter(|n| n.is_finite()).ok_or_else(invalid))
        .collect()
}

fn labels(value: &Value, field: &str) -> Result<Vec<String>, ChartSpecError> {
    let invalid = || ChartSpecError::InvalidArray {
        field: field.to_string(),
        expected: "strings",
    };
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(invalid()),
        })
        .collect()
}

fn xy(obj: &Map<String, Value>, prefix: &str) -> Result<Option<(Vec<f64>, Vec<f64>)>, ChartSpecError> {
    match (obj.get("x"), obj.get("y")) {
        (Some(x), Some(y)) => {
            let x = numbers(x, &format!("{prefix}x"))?;
            let y = numbers(y, &format!("{prefix}y"))?;
            if x.len() != y.len() {
                return Err(ChartSpecError::Shape(format!(
                    "{prefix}x has {} points but {prefix}y has {}",
                    x.len(),
                    y.len()
                )));
            }
            Ok(Some((x, y)))
        }
        (Some(_), None) => Err(ChartSpecError::Shape(format!("{prefix}x given without {prefix}y"))),
        (None, Some(_)) => Err(ChartSpecError::Shape(format!("{prefix}y given without {prefix}x"))),
        (None, None) => Ok(None),
    }
}

fn decode_data(data: &Map<String, Value>) -> Result<ChartData, ChartSpecError> {
    let shared_labels = data
        .get("labels")
        .map(|value| labels(value, "data.labels"))
        .transpose()?;

    if let Some(raw_series) = data.get("series") {
        let items = raw_series.as_array().ok_or_else(|| ChartSpecError::InvalidArray {
            field: "data.series".to_string(),
            expected: "objects",
        })?;
        if items.is_empty() {
            return Err(ChartSpecError::Shape("data.series is empty".to_string()));
        }
        let mut series = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let prefix = format!("data.series[{idx}].");
            let obj = item
                .as_object()
                .ok_or_else(|| ChartSpecError::Shape(format!("data.series[{idx}] must be an object")))?;
            let name = optional_string(obj, "name").unwrap_or_else(|| format!("Series {}", idx + 1));
            let points = if let Some((x, y)) = xy(obj, &prefix)? {
                SeriesPoints::Xy { x, y }
            } else if let Some(values) = obj.get("values") {
                SeriesPoints::Values(numbers(values, &format!("{prefix}values"))?)
            } else {
                return Err(ChartSpecError::Shape(format!(
                    "data.series[{idx}] needs values or x and y"
                )));
            };
            if points.is_empty() {
                return Err(ChartSpecError::Shape(format!("data.series[{idx}] has no points")));
            }
            series.push(Series { name, points });
        }
        return Ok(ChartData::Series {
            labels: shared_labels.unwrap_or_default(),
            series,
        });
    }

    if let Some((x, y)) = xy(data, "data.")? {
        if x.is_empty() {
            return Err(ChartSpecError::Shape("data.x is empty".to_string()));
        }
        return Ok(ChartData::Xy { x, y });
    }

    let values = data
        .get("values")
        .map(|value| numbers(value, "data.values"))
        .transpose()?
        .ok_or_else(|| ChartSpecError::Shape("data needs values, x and y, or series".to_string()))?;
    if values.is_empty() {
        return Err(ChartSpecError::Shape("data.values is empty".to_string()));
    }
    let labels = match shared_labels {
        Some(labels) if labels.len() != values.len() => {
            return Err(ChartSpecError::Shape(format!(
                "data.labels has {} entries but data.values has {}",
                labels.len(),
                values.len()
            )));
        }
        Some(labels) => labels,
        None => (1..=values.len()).map(|n| n.to_string()).collect(),
    };
    Ok(ChartData::Labeled { labels, values })
}

fn check_shape(chart_type: ChartType, data: &ChartData) -> Result<(), ChartSpecError> {
    match (chart_type, data) {
        (ChartType::Pie, ChartData::Labeled { values, .. }) => {
            if values.iter().any(|v| *v < 0.0) {
                return Err(ChartSpecError::Shape(
                    "pie chart values must not be negative".to_string(),
                ));
            }
            if values.iter().sum::<f64>() <= 0.0 {
                return Err(ChartSpecError::Shape("pie chart values sum to zero".to_string()));
            }
            Ok(())
        }
        (ChartType::Pie, _) => Err(ChartSpecError::Shape(
            "pie chart requires labels and values".to_string(),
        )),
        (ChartType::Scatter, ChartData::Labeled { .. }) => Err(ChartSpecError::Shape(
            "scatter chart requires x and y".to_string(),
        )),
        (ChartType::Scatter, ChartData::Series { series, .. })
            if series
                .iter()
                .any(|s| matches!(s.points, SeriesPoints::Values(_))) =>
        {
            Err(ChartSpecError::Shape(
                "scatter series require x and y".to_string(),
            ))
        }
        (ChartType::Bar, ChartData::Series { series, .. })
            if series.iter().any(|s| matches!(s.points, SeriesPoints::Xy { .. })) =>
        {
            Err(ChartSpecError::Shape("bar series require values".to_string()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{ChartData, ChartSpec, ChartSpecError, ChartType, SeriesPoints};
    use serde_json::json;

    #[test]
    fn decodes_labeled_bar() {
        let spec = ChartSpec::from_args(&json!({
            "chart_type": "Bar",
            "title": "Revenue",
            "y_label": "USD",
            "data": {"labels": ["Q1", "Q2"], "values": [10, 12.5]}
        }))
        .unwrap();
        assert_eq!(spec.chart_type, ChartType::Bar);
        assert_eq!(spec.title, "Revenue");
        assert_eq!(spec.x_label, None);
        assert_eq!(spec.y_label.as_deref(), Some("USD"));
        assert_eq!(
            spec.data,
            ChartData::Labeled {
                labels: vec!["Q1".into(), "Q2".into()],
                values: vec![10.0, 12.5]
            }
        );
    }

    #[test]
    fn decodes_series_with_xy_points() {
        let spec = ChartSpec::from_args(&json!({
            "chart_type": "scatter",
            "title": "Fit",
            "data": {"series": [
                {"name": "a", "x": [1, 2], "y": [3, 4]},
                {"x": [5], "y": [6]}
            ]}
        }))
        .unwrap();
        let ChartData::Series { series, .. } = spec.data else {
            panic!("expected series");
        };
        assert_eq!(series[1].name, "Series 2");
        assert!(matches!(series[0].points, SeriesPoints::Xy { .. }));
    }

    #[test]
    fn missing_fields_are_reported() {
        assert_eq!(
            ChartSpec::from_args(&json!({"title": "t", "data": {"values": [1]}})),
            Err(ChartSpecError::MissingField("chart_type"))
        );
        assert_eq!(
            ChartSpec::from_args(&json!({"chart_type": "bar", "title": "t"})),
            Err(ChartSpecError::MissingField("data"))
        );
        assert_eq!(
            ChartSpec::from_args(&json!("bar")),
            Err(ChartSpecError::NotAnObject)
        );
    }

    #[test]
    fn invalid_chart_type_is_rejected() {
        let err = ChartSpec::from_args(&json!({
            "chart_type": "radar", "title": "t", "data": {"values": [1]}
        }))
        .unwrap_err();
        assert_eq!(err, ChartSpecError::InvalidChartType("radar".to_string()));
        assert!(err.to_string().contains("radar"));
    }

    #[test]
    fn shape_mismatches_are_rejected() {
        assert!(ChartSpec::from_args(&json!({
            "chart_type": "line", "title": "t", "data": {"x": [1, 2], "y": [1]}
        }))
        .is_err());
        assert!(ChartSpec::from_args(&json!({
            "chart_type": "bar", "title": "t", "data": {"labels": ["a"], "values": [1, 2]}
        }))
        .is_err());
        assert!(ChartSpec::from_args(&json!({
            "chart_type": "pie", "title": "t", "data": {"x": [1], "y": [1]}
        }))
        .is_err());
        assert!(ChartSpec::from_args(&json!({
            "chart_type": "scatter", "title": "t", "data": {"values": [1, 2]}
        }))
        .is_err());
        assert!(ChartSpec::from_args(&json!({
            "chart_type": "bar", "title": "t", "data": {"values": ["high"]}
        }))
        .is_err());
    }

    #[test]
    fn missing_labels_default_to_positions() {
        let spec = ChartSpec::from_args(&json!({
            "chart_type": "line", "data": {"values": [3, 1, 2]}
        }))
        .unwrap();
        assert_eq!(spec.title, "Chart");
        let ChartData::Labeled { labels, .. } = spec.data else {
            panic!("expected labeled data");
        };
        assert_eq!(labels, vec!["1", "2", "3"]);
    }
}
