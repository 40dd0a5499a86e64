use std::fmt;

use serde::Serialize;

use crate::chart::builder::{build_single_chart, ColumnSelection, SeriesOptions};
use crate::chart::model::{ChartDescription, PlotMode};
use crate::data::coerce::{coerce_with_report, CoercionOutcome};
use crate::data::filter::{remove_outliers_with_report, OutlierOutcome};
use crate::data::model::Table;
use crate::data::validate::validate;
use crate::error::Result;
use crate::render::{ImageFormat, Renderer};
use crate::store::DatasetStore;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Everything needed to go from a stored table to a rendered scatter chart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScatterRequest {
    pub selection: ColumnSelection,
    /// Column parsed as dates; also switches the chart to lines+markers.
    pub date_column: Option<String>,
    /// Z-score threshold; `None` keeps every row.
    pub outlier_threshold: Option<f64>,
    pub large_data: bool,
    pub title: Option<String>,
    pub format: ImageFormat,
}

/// What the pipeline did to the data on the way to the chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterReport {
    pub x: String,
    pub y_primary: Vec<String>,
    pub y_secondary: Vec<String>,
    pub rows_plotted: usize,
    pub outliers_removed: usize,
    /// Share of the original rows removed, in percent.
    pub outliers_removed_pct: f64,
    /// Set when outlier removal was requested but fell back to a no-op.
    pub outlier_note: Option<String>,
    pub coercions: Vec<(String, CoercionOutcome)>,
    pub time_series: bool,
}

#[derive(Debug, Clone)]
pub struct ScatterOutput {
    pub image: Vec<u8>,
    pub format: ImageFormat,
    pub chart: ChartDescription,
    pub report: ScatterReport,
}

impl ScatterRequest {
    pub fn new(selection: ColumnSelection) -> Self {
        ScatterRequest {
            selection,
            ..ScatterRequest::default()
        }
    }

    /// Validate, clean and coerce `table`, then describe the chart.
    pub fn prepare(&self, table: &Table) -> Result<(ChartDescription, ScatterReport)> {
        let selection = &self.selection;
        let ys = selection.y_columns();
        validate(table, &selection.x, &ys)?;

        let original_rows = table.len();
        let (table, removed, outlier_note) = match self.outlier_threshold {
            Some(threshold) => {
                let outcome = remove_outliers_with_report(table, threshold);
                let removed = outcome.removed();
                let note = match &outcome {
                    OutlierOutcome::FellBack { reason, .. } => Some(reason.clone()),
                    OutlierOutcome::NoNumericColumns(_) => Some("no numeric columns".to_string()),
                    OutlierOutcome::Filtered { .. } => None,
                };
                if removed > 0 {
                    log::info!(
                        "removed {removed} outliers ({:.1}%)",
                        percent(removed, original_rows)
                    );
                }
                (outcome.into_table(), removed, note)
            }
            None => (table.clone(), 0, None),
        };

        let columns: Vec<&str> = std::iter::once(selection.x.as_str())
            .chain(ys.iter().map(String::as_str))
            .collect();
        let coercion = coerce_with_report(&table, &columns, self.date_column.as_deref());

        let time_series = self.date_column.is_some();
        let options = SeriesOptions {
            mode: if time_series {
                PlotMode::LinesAndMarkers
            } else {
                PlotMode::Markers
            },
            large_data: self.large_data,
        };
        let chart = build_single_chart(&coercion.table, selection, options, self.title.as_deref())?;

        let report = ScatterReport {
            x: selection.x.clone(),
            y_primary: selection.y_primary.clone(),
            y_secondary: selection.y_secondary.clone(),
            rows_plotted: coercion.table.len(),
            outliers_removed: removed,
            outliers_removed_pct: percent(removed, original_rows),
            outlier_note,
            coercions: coercion.outcomes,
            time_series,
        };
        Ok((chart, report))
    }

    /// [`prepare`](Self::prepare) and render in the requested format.
    pub fn run(&self, table: &Table, renderer: &Renderer) -> Result<ScatterOutput> {
        let (chart, report) = self.prepare(table)?;
        let image = renderer.render(&chart, self.format)?;
        log::info!(
            "rendered {} chart of {} rows ({} bytes)",
            self.format,
            report.rows_plotted,
            image.len()
        );
        Ok(ScatterOutput {
            image,
            format: self.format,
            chart,
            report,
        })
    }

    /// Run against a named dataset from `store`.
    pub fn run_stored(&self, store: &DatasetStore, name: &str, renderer: &Renderer) -> Result<ScatterOutput> {
        let table = store.get(name)?;
        self.run(&table, renderer)
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

impl fmt::Display for ScatterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "X-axis: {}", self.x)?;
        writeln!(f, "Primary Y-axis: {}", self.y_primary.join(", "))?;
        if !self.y_secondary.is_empty() {
            writeln!(f, "Secondary Y-axis: {}", self.y_secondary.join(", "))?;
        }
        writeln!(f, "Data points: {}", self.rows_plotted)?;
        if self.outliers_removed > 0 {
            writeln!(
                f,
                "Outliers removed: {} ({:.1}%)",
                self.outliers_removed, self.outliers_removed_pct
            )?;
        }
        if let Some(note) = &self.outlier_note {
            writeln!(f, "Outlier removal skipped: {note}")?;
        }
        write!(
            f,
            "Plot style: {}",
            if self.time_series {
                "time series"
            } else {
                "scatter"
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::model::{Axis, XValues};
    use crate::data::model::{Column, ColumnData};
    use crate::error::Error;

    fn table() -> Table {
        let mut sales: Vec<Option<String>> = (1..=20).map(|v| Some(format!("{v}"))).collect();
        sales[7] = Some("1000000".to_string());
        Table::new(vec![
            Column::new(
                "Date",
                ColumnData::Text((1..=20).map(|d| Some(format!("2024-01-{d:02}"))).collect()),
            ),
            Column::new("Sales", ColumnData::Text(sales)),
            Column::new(
                "Cost",
                ColumnData::Numeric((1..=20).map(|v| Some(f64::from(v) * 0.5)).collect()),
            ),
        ])
    }

    fn request() -> ScatterRequest {
        ScatterRequest::new(
            ColumnSelection::new("Date", vec!["Sales".into()]).with_secondary(vec!["Cost".into()]),
        )
    }

    #[test]
    fn date_column_makes_a_time_series() {
        let req = ScatterRequest {
            date_column: Some("Date".into()),
            ..request()
        };
        let (chart, report) = req.prepare(&table()).unwrap();
        assert!(report.time_series);
        assert!(matches!(chart.series()[0].x, XValues::Temporal(_)));
        assert_eq!(chart.series()[0].mode, PlotMode::LinesAndMarkers);
        assert_eq!(chart.series()[1].axis, Axis::Secondary);
        assert_eq!(report.rows_plotted, 20);
        assert!(report.coercions.iter().all(|(_, o)| *o == CoercionOutcome::Coerced));
    }

    #[test]
    fn without_date_column_plots_markers() {
        let (chart, report) = request().prepare(&table()).unwrap();
        assert_eq!(chart.series()[0].mode, PlotMode::Markers);
        assert!(!report.time_series);
    }

    #[test]
    fn text_columns_do_not_take_part_in_outlier_scores() {
        // Sales is text until coerced, so only Cost takes part in the z-scores.
        let req = ScatterRequest {
            outlier_threshold: Some(4.0),
            ..request()
        };
        let (_, report) = req.prepare(&table()).unwrap();
        assert_eq!(report.outliers_removed, 0);
        assert_eq!(report.outlier_note, None);
    }

    #[test]
    fn numeric_outlier_is_removed_and_reported() {
        let mut t = table();
        let mut values: Vec<Option<f64>> = (1..=20).map(|v| Some(f64::from(v))).collect();
        values[7] = Some(1.0e9);
        t = t.with_column(Column::new("Sales", ColumnData::Numeric(values)));
        let req = ScatterRequest {
            outlier_threshold: Some(4.0),
            ..request()
        };
        let (_, report) = req.prepare(&t).unwrap();
        assert_eq!(report.outliers_removed, 1);
        assert_eq!(report.rows_plotted, 19);
        assert!((report.outliers_removed_pct - 5.0).abs() < 1e-9);
        assert!(report.to_string().contains("Outliers removed: 1 (5.0%)"));
    }

    #[test]
    fn unknown_columns_fail_before_any_work() {
        let req = ScatterRequest::new(ColumnSelection::new("Day", vec!["Sales".into()]));
        assert!(matches!(req.prepare(&table()), Err(Error::Validation(_))));
    }

    #[test]
    fn prepare_reads_a_stored_snapshot() {
        let store = DatasetStore::new();
        store.insert("sales", table());
        let snapshot = store.get("sales").unwrap();
        let (chart, report) = request().prepare(&snapshot).unwrap();
        assert_eq!(chart.series().len(), 2);
        assert_eq!(report.rows_plotted, snapshot.len());
    }

    #[test]
    fn stored_dataset_lookup() {
        let store = DatasetStore::new();
        let renderer = Renderer::from_config(&crate::config::RenderConfig::default());
        let req = ScatterRequest {
            format: ImageFormat::Svg,
            ..request()
        };
        assert!(matches!(
            req.run_stored(&store, "missing", &renderer),
            Err(Error::UnknownDataset(_))
        ));
        store.insert("sales", table());
        let out = req.run_stored(&store, "sales", &renderer).unwrap();
        assert!(out.image.starts_with(b"<svg"));
        assert_eq!(out.report.rows_plotted, 20);
    }
}
