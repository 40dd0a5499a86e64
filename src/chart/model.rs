use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::color::{Color, DivergingScale};
use crate::data::model::{Column, ColumnData};

// ---------------------------------------------------------------------------
// Series vocabulary
// ---------------------------------------------------------------------------

/// Which y-axis a series is plotted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Primary,
    Secondary,
}

/// How the points of a series are drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PlotMode {
    #[default]
    #[serde(rename = "markers")]
    Markers,
    #[serde(rename = "lines+markers")]
    LinesAndMarkers,
}

impl PlotMode {
    pub fn draws_lines(self) -> bool {
        self == PlotMode::LinesAndMarkers
    }
}

impl FromStr for PlotMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markers" => Ok(PlotMode::Markers),
            "lines+markers" | "lines" => Ok(PlotMode::LinesAndMarkers),
            other => Err(format!("unknown plot mode '{other}' (expected markers or lines+markers)")),
        }
    }
}

impl fmt::Display for PlotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlotMode::Markers => "markers",
            PlotMode::LinesAndMarkers => "lines+markers",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dash {
    Solid,
    Dot,
}

/// X coordinates shared by the series of a chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum XValues {
    Numeric(Vec<Option<f64>>),
    Temporal(Vec<Option<NaiveDateTime>>),
    Categorical(Vec<Option<String>>),
}

impl XValues {
    pub fn from_column(column: &Column) -> Self {
        match &column.data {
            ColumnData::Numeric(v) => XValues::Numeric(v.clone()),
            ColumnData::DateTime(v) => XValues::Temporal(v.clone()),
            ColumnData::Text(v) => XValues::Categorical(v.clone()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            XValues::Numeric(v) => v.len(),
            XValues::Temporal(v) => v.len(),
            XValues::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One column bound to an axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub axis: Axis,
    pub mode: PlotMode,
    pub color: Color,
    pub dash: Dash,
    pub x: XValues,
    pub y: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Heatmap
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub labels: Vec<String>,
    /// Row-major, `labels.len()` square.
    pub matrix: Vec<Vec<f64>>,
    /// Coefficients rounded to two decimals; empty for NaN.
    pub cell_text: Vec<Vec<String>>,
    pub scale: DivergingScale,
    pub colorbar_title: String,
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoverMode {
    UnifiedX,
    Closest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Legend {
    pub visible: bool,
    pub horizontal: bool,
    /// Placed in a band above the plot area, right-aligned.
    pub above_plot: bool,
    pub title: Option<String>,
}

impl Legend {
    pub fn above() -> Self {
        Legend {
            visible: true,
            horizontal: true,
            above_plot: true,
            title: None,
        }
    }

    pub fn hidden() -> Self {
        Legend {
            visible: false,
            horizontal: false,
            above_plot: false,
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub hover: HoverMode,
    pub legend: Legend,
}

/// How points are turned into marks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStrategy {
    /// Every point becomes a mark.
    #[default]
    PerPoint,
    /// Points are reduced per horizontal pixel before drawing.
    Decimated,
}

impl RenderStrategy {
    pub fn for_large_data(large_data: bool) -> Self {
        if large_data {
            RenderStrategy::Decimated
        } else {
            RenderStrategy::PerPoint
        }
    }
}

// ---------------------------------------------------------------------------
// ChartDescription
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartBody {
    Series { series: Vec<Series> },
    Heatmap(Heatmap),
}

/// Renderer-agnostic chart: what to draw, not how. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartDescription {
    pub(crate) title: String,
    pub(crate) x_label: String,
    pub(crate) y_label: Option<String>,
    pub(crate) y2_label: Option<String>,
    pub(crate) size: CanvasSize,
    pub(crate) layout: Layout,
    pub(crate) strategy: RenderStrategy,
    pub(crate) body: ChartBody,
}

impl ChartDescription {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn x_label(&self) -> &str {
        &self.x_label
    }

    pub fn y_label(&self) -> Option<&str> {
        self.y_label.as_deref()
    }

    pub fn y2_label(&self) -> Option<&str> {
        self.y2_label.as_deref()
    }

    pub fn size(&self) -> CanvasSize {
        self.size
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn strategy(&self) -> RenderStrategy {
        self.strategy
    }

    pub fn body(&self) -> &ChartBody {
        &self.body
    }

    /// Series of a scatter chart; empty for a heatmap.
    pub fn series(&self) -> &[Series] {
        match &self.body {
            ChartBody::Series { series } => series,
            ChartBody::Heatmap(_) => &[],
        }
    }

    pub fn heatmap(&self) -> Option<&Heatmap> {
        match &self.body {
            ChartBody::Heatmap(h) => Some(h),
            ChartBody::Series { .. } => None,
        }
    }

    pub fn has_secondary_axis(&self) -> bool {
        self.series().iter().any(|s| s.axis == Axis::Secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_mode_parses() {
        assert_eq!("markers".parse(), Ok(PlotMode::Markers));
        assert_eq!("lines+markers".parse(), Ok(PlotMode::LinesAndMarkers));
        assert!("bars".parse::<PlotMode>().is_err());
        assert_eq!(PlotMode::LinesAndMarkers.to_string(), "lines+markers");
    }
}
