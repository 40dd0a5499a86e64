use super::model::{
    Axis, CanvasSize, ChartBody, ChartDescription, Dash, Heatmap, HoverMode, Layout, Legend,
    PlotMode, RenderStrategy, Series, XValues,
};
use crate::color::{generate_palette, Color, DivergingScale};
use crate::data::model::{Column, ColumnKind, Table};
use crate::data::stats;
use crate::data::validate::validate;
use crate::error::{CorrelationError, ValidationError};

pub const SINGLE_CHART_SIZE: CanvasSize = CanvasSize {
    width: 1200,
    height: 700,
};
pub const HEATMAP_SIZE: CanvasSize = CanvasSize {
    width: 1000,
    height: 900,
};
pub const PANEL_SIZE: CanvasSize = CanvasSize {
    width: 1200,
    height: 600,
};

/// Default number of top-correlation panels.
pub const DEFAULT_TOP_N: usize = 3;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Columns to plot: one x, ordered y columns per axis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSelection {
    pub x: String,
    pub y_primary: Vec<String>,
    pub y_secondary: Vec<String>,
}

impl ColumnSelection {
    pub fn new(x: impl Into<String>, y_primary: Vec<String>) -> Self {
        ColumnSelection {
            x: x.into(),
            y_primary,
            y_secondary: Vec::new(),
        }
    }

    pub fn with_secondary(mut self, y_secondary: Vec<String>) -> Self {
        self.y_secondary = y_secondary;
        self
    }

    /// Every y column, primary first.
    pub fn y_columns(&self) -> Vec<String> {
        self.y_primary
            .iter()
            .chain(&self.y_secondary)
            .cloned()
            .collect()
    }
}

/// Rendering options shared by the scatter-style charts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesOptions {
    pub mode: PlotMode,
    /// Tens of thousands of points: draw through the decimated path.
    pub large_data: bool,
}

// ---------------------------------------------------------------------------
// Single chart
// ---------------------------------------------------------------------------

/// Dual-axis chart: one series per selected y column.
pub fn build_single_chart(
    table: &Table,
    selection: &ColumnSelection,
    options: SeriesOptions,
    title: Option<&str>,
) -> Result<ChartDescription, ValidationError> {
    validate(table, &selection.x, &selection.y_columns())?;

    let x = XValues::from_column(require(table, &selection.x)?);
    let palette = generate_palette(selection.y_primary.len() + selection.y_secondary.len());
    let axes = selection
        .y_primary
        .iter()
        .map(|name| (name, Axis::Primary))
        .chain(selection.y_secondary.iter().map(|name| (name, Axis::Secondary)));

    let mut series = Vec::with_capacity(palette.len());
    for ((name, axis), color) in axes.zip(palette) {
        series.push(Series {
            name: name.clone(),
            axis,
            mode: options.mode,
            color,
            dash: Dash::Solid,
            x: x.clone(),
            y: require(table, name)?.numeric_view(),
        });
    }

    let primary = selection.y_primary.join(", ");
    let secondary = (!selection.y_secondary.is_empty()).then(|| selection.y_secondary.join(", "));

    Ok(ChartDescription {
        title: title
            .map(str::to_string)
            .unwrap_or_else(|| format!("{primary} vs {}", selection.x)),
        x_label: selection.x.clone(),
        y_label: (!primary.is_empty()).then_some(primary),
        y2_label: secondary,
        size: SINGLE_CHART_SIZE,
        layout: Layout {
            hover: HoverMode::UnifiedX,
            legend: Legend::above(),
        },
        strategy: RenderStrategy::for_large_data(options.large_data),
        body: ChartBody::Series { series },
    })
}

fn require<'t>(table: &'t Table, name: &str) -> Result<&'t Column, ValidationError> {
    table.column(name).ok_or_else(|| ValidationError::MissingColumns {
        missing: vec![name.to_string()],
        available: table.column_names(),
    })
}

// ---------------------------------------------------------------------------
// Correlation heatmap
// ---------------------------------------------------------------------------

/// Pairwise Pearson heatmap over `columns`, or over every numeric column.
pub fn build_heatmap(
    table: &Table,
    columns: Option<&[String]>,
    title: Option<&str>,
) -> Result<ChartDescription, CorrelationError> {
    let labels: Vec<String> = match columns {
        Some(names) if !names.is_empty() => {
            let missing: Vec<String> = names
                .iter()
                .filter(|n| !table.contains(n))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(ValidationError::MissingColumns {
                    missing,
                    available: table.column_names(),
                }
                .into());
            }
            if let Some(bad) = names
                .iter()
                .find(|n| table.column(n).map(|c| c.kind()) != Some(ColumnKind::Numeric))
            {
                return Err(CorrelationError::NotNumeric {
                    column: bad.clone(),
                });
            }
            names.to_vec()
        }
        _ => table.numeric_columns().map(|c| c.name.clone()).collect(),
    };

    let values: Vec<&[Option<f64>]> = labels
        .iter()
        .filter_map(|n| table.column(n).and_then(|c| c.as_numeric()))
        .collect();
    let matrix = stats::correlation_matrix(&values);
    let cell_text = matrix
        .iter()
        .map(|row| row.iter().map(|&r| format_coefficient(r)).collect())
        .collect();
    let scale = DivergingScale::centered(matrix.iter().flatten().copied());

    Ok(ChartDescription {
        title: title.unwrap_or("Correlation Heatmap").to_string(),
        x_label: "Variables".to_string(),
        y_label: Some("Variables".to_string()),
        y2_label: None,
        size: HEATMAP_SIZE,
        layout: Layout {
            hover: HoverMode::Closest,
            legend: Legend::hidden(),
        },
        strategy: RenderStrategy::PerPoint,
        body: ChartBody::Heatmap(Heatmap {
            labels,
            matrix,
            cell_text,
            scale,
            colorbar_title: "Correlation".to_string(),
        }),
    })
}

fn format_coefficient(r: f64) -> String {
    if r.is_nan() {
        String::new()
    } else {
        // Avoid printing "-0.00" for tiny negative coefficients.
        let rounded = (r * 100.0).round() / 100.0;
        format!("{:.2}", if rounded == 0.0 { 0.0 } else { rounded })
    }
}

// ---------------------------------------------------------------------------
// Top-N correlation panels
// ---------------------------------------------------------------------------

/// Numeric columns most correlated with `target`, strongest first.
///
/// The target itself and undefined (NaN) coefficients are excluded; ties keep
/// table order.
pub fn rank_correlations(
    table: &Table,
    target: &str,
    n: usize,
) -> Result<Vec<(String, f64)>, CorrelationError> {
    let target_values = table
        .column(target)
        .and_then(|c| c.as_numeric())
        .ok_or_else(|| CorrelationError::TargetNotNumeric {
            target: target.to_string(),
            numeric: table.numeric_columns().map(|c| c.name.clone()).collect(),
        })?;

    let mut ranked: Vec<(String, f64)> = table
        .numeric_columns()
        .filter(|c| c.name != target)
        .filter_map(|c| {
            let r = stats::pearson(target_values, c.as_numeric()?);
            (!r.is_nan()).then(|| (c.name.clone(), r))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    ranked.truncate(n);
    Ok(ranked)
}

/// One dual-axis panel per top-correlated column: target solid on the
/// primary axis, companion dotted on the secondary axis.
pub fn build_top_correlations(
    table: &Table,
    x: &str,
    target: &str,
    n: usize,
    options: SeriesOptions,
) -> Result<Vec<ChartDescription>, CorrelationError> {
    let ranked = rank_correlations(table, target, n)?;
    let x_column = table.column(x).ok_or_else(|| ValidationError::MissingX {
        column: x.to_string(),
        available: table.column_names(),
    })?;
    let x_values = XValues::from_column(x_column);
    let target_y = table
        .column(target)
        .map(|c| c.numeric_view())
        .unwrap_or_default();

    let mut charts = Vec::with_capacity(ranked.len());
    for (name, r) in ranked {
        let other_y = require(table, &name)?.numeric_view();
        let series = vec![
            Series {
                name: target.to_string(),
                axis: Axis::Primary,
                mode: options.mode,
                color: Color::BLUE,
                dash: Dash::Solid,
                x: x_values.clone(),
                y: target_y.clone(),
            },
            Series {
                name: name.clone(),
                axis: Axis::Secondary,
                mode: options.mode,
                color: Color::RED,
                dash: Dash::Dot,
                x: x_values.clone(),
                y: other_y,
            },
        ];
        charts.push(ChartDescription {
            title: format!("{target} vs {name}\nCorrelation: {r:.3}"),
            x_label: x.to_string(),
            y_label: Some(target.to_string()),
            y2_label: Some(name),
            size: PANEL_SIZE,
            layout: Layout {
                hover: HoverMode::UnifiedX,
                legend: Legend {
                    title: Some("Columns".to_string()),
                    ..Legend::above()
                },
            },
            strategy: RenderStrategy::for_large_data(options.large_data),
            body: ChartBody::Series { series },
        });
    }
    Ok(charts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::ColumnData;

    fn numeric(name: &str, values: &[f64]) -> Column {
        Column::new(name, ColumnData::Numeric(values.iter().copied().map(Some).collect()))
    }

    fn table() -> Table {
        Table::new(vec![
            Column::new(
                "Date",
                ColumnData::Text((1..=6).map(|d| Some(format!("2024-01-0{d}"))).collect()),
            ),
            numeric("Sales", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            numeric("Revenue", &[2.0, 4.1, 5.9, 8.2, 9.9, 12.0]),
            numeric("Returns", &[6.0, 5.0, 4.0, 3.0, 2.0, 1.0]),
            numeric("Noise", &[3.0, 1.0, 4.0, 1.0, 5.0, 9.0]),
            numeric("Flat", &[7.0; 6]),
        ])
    }

    #[test]
    fn single_chart_defaults() {
        let selection = ColumnSelection::new("Date", vec!["Sales".into(), "Revenue".into()])
            .with_secondary(vec!["Returns".into()]);
        let chart = build_single_chart(&table(), &selection, SeriesOptions::default(), None).unwrap();

        assert_eq!(chart.title(), "Sales, Revenue vs Date");
        assert_eq!(chart.x_label(), "Date");
        assert_eq!(chart.y_label(), Some("Sales, Revenue"));
        assert_eq!(chart.y2_label(), Some("Returns"));
        assert_eq!(chart.size(), SINGLE_CHART_SIZE);
        assert_eq!(chart.layout().hover, HoverMode::UnifiedX);
        assert!(chart.layout().legend.horizontal && chart.layout().legend.above_plot);

        let axes: Vec<_> = chart.series().iter().map(|s| (s.name.as_str(), s.axis)).collect();
        assert_eq!(
            axes,
            vec![
                ("Sales", Axis::Primary),
                ("Revenue", Axis::Primary),
                ("Returns", Axis::Secondary)
            ]
        );
        assert!(matches!(chart.series()[0].x, XValues::Categorical(_)));
    }

    #[test]
    fn large_data_only_changes_strategy() {
        let selection = ColumnSelection::new("Sales", vec!["Revenue".into()]);
        let small = build_single_chart(&table(), &selection, SeriesOptions::default(), Some("t")).unwrap();
        let large = build_single_chart(
            &table(),
            &selection,
            SeriesOptions {
                large_data: true,
                ..SeriesOptions::default()
            },
            Some("t"),
        )
        .unwrap();
        assert_eq!(small.series(), large.series());
        assert_eq!(large.strategy(), RenderStrategy::Decimated);
        assert_eq!(large.y2_label(), None);
    }

    #[test]
    fn single_chart_rejects_unknown_columns() {
        let selection = ColumnSelection::new("Date", vec!["Nope".into(), "Sales".into(), "Gone".into()]);
        let err = build_single_chart(&table(), &selection, SeriesOptions::default(), None).unwrap_err();
        assert!(matches!(err, ValidationError::MissingY { ref missing, .. } if missing.len() == 2));
    }

    #[test]
    fn heatmap_over_numeric_columns() {
        let chart = build_heatmap(&table(), None, None).unwrap();
        let heatmap = chart.heatmap().unwrap();
        assert_eq!(heatmap.labels, vec!["Sales", "Revenue", "Returns", "Noise", "Flat"]);
        assert_eq!(heatmap.cell_text[0][0], "1.00");
        assert_eq!(heatmap.cell_text[0][2], "-1.00");
        assert_eq!(heatmap.cell_text[0][4], "");
        assert_eq!(chart.title(), "Correlation Heatmap");
        assert_eq!(chart.size(), HEATMAP_SIZE);
    }

    #[test]
    fn heatmap_rejects_text_columns() {
        let cols = vec!["Sales".to_string(), "Date".to_string()];
        let err = build_heatmap(&table(), Some(&cols), None).unwrap_err();
        assert_eq!(err, CorrelationError::NotNumeric { column: "Date".into() });
    }

    #[test]
    fn ranking_is_by_magnitude_and_stable() {
        let ranked = rank_correlations(&table(), "Sales", 10).unwrap();
        let names: Vec<_> = ranked.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names[0], "Returns");
        assert!(!names.contains(&"Flat"));
        assert!(!names.contains(&"Sales"));
        assert!(ranked.windows(2).all(|w| w[0].1.abs() >= w[1].1.abs()));
    }

    #[test]
    fn equal_magnitudes_keep_table_order() {
        let t = Table::new(vec![
            numeric("t", &[1.0, 2.0, 3.0]),
            numeric("down", &[3.0, 2.0, 1.0]),
            numeric("up", &[1.0, 2.0, 3.0]),
        ]);
        let ranked = rank_correlations(&t, "t", 3).unwrap();
        assert_eq!(ranked[0].0, "down");
        assert_eq!(ranked[1].0, "up");
    }

    #[test]
    fn top_correlation_panels() {
        let charts = build_top_correlations(&table(), "Date", "Sales", 2, SeriesOptions::default()).unwrap();
        assert_eq!(charts.len(), 2);
        let first = &charts[0];
        assert_eq!(first.title(), "Sales vs Returns\nCorrelation: -1.000");
        assert_eq!(first.size(), PANEL_SIZE);
        let series = first.series();
        assert_eq!((series[0].dash, series[0].axis), (Dash::Solid, Axis::Primary));
        assert_eq!((series[1].dash, series[1].axis), (Dash::Dot, Axis::Secondary));
        assert_eq!(first.layout().legend.title.as_deref(), Some("Columns"));
    }

    #[test]
    fn non_numeric_target_fails() {
        let err = build_top_correlations(&table(), "Date", "Date", 3, SeriesOptions::default()).unwrap_err();
        assert!(matches!(err, CorrelationError::TargetNotNumeric { .. }));
    }
}
