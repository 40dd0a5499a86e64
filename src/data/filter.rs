use thiserror::Error;

use super::model::Table;
use super::stats;

/// Default z-score cut-off for outlier removal.
pub const DEFAULT_THRESHOLD: f64 = 4.0;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of an outlier-removal pass. Every branch carries a usable table.
#[derive(Debug, Clone)]
pub enum OutlierOutcome {
    /// Rows with an extreme numeric value were dropped.
    Filtered { table: Table, removed: usize },
    /// The table has no numeric column; returned unchanged.
    NoNumericColumns(Table),
    /// The statistics could not be computed; the original table is returned.
    FellBack { table: Table, reason: String },
}

impl OutlierOutcome {
    pub fn table(&self) -> &Table {
        match self {
            OutlierOutcome::Filtered { table, .. }
            | OutlierOutcome::NoNumericColumns(table)
            | OutlierOutcome::FellBack { table, .. } => table,
        }
    }

    pub fn into_table(self) -> Table {
        match self {
            OutlierOutcome::Filtered { table, .. }
            | OutlierOutcome::NoNumericColumns(table)
            | OutlierOutcome::FellBack { table, .. } => table,
        }
    }

    /// Number of rows dropped (zero unless filtered).
    pub fn removed(&self) -> usize {
        match self {
            OutlierOutcome::Filtered { removed, .. } => *removed,
            _ => 0,
        }
    }
}

#[derive(Debug, Error)]
enum ZScoreError {
    #[error("column '{0}' has non-finite statistics")]
    NonFinite(String),
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Drop rows where any numeric column's |z-score| reaches `threshold`.
///
/// Never fails; see [`remove_outliers_with_report`] for what happened.
pub fn remove_outliers(table: &Table, threshold: f64) -> Table {
    remove_outliers_with_report(table, threshold).into_table()
}

pub fn remove_outliers_with_report(table: &Table, threshold: f64) -> OutlierOutcome {
    if table.numeric_columns().next().is_none() {
        return OutlierOutcome::NoNumericColumns(table.clone());
    }

    match retention_mask(table, threshold) {
        Ok(keep) => {
            let filtered = table.filter_rows(&keep);
            let removed = table.len() - filtered.len();
            OutlierOutcome::Filtered {
                table: filtered,
                removed,
            }
        }
        Err(e) => {
            log::warn!("Outlier removal failed: {e}");
            OutlierOutcome::FellBack {
                table: table.clone(),
                reason: e.to_string(),
            }
        }
    }
}

/// `true` for rows whose every numeric |z| is strictly below `threshold`.
///
/// Missing cells and columns without a defined z-score (no spread, no
/// observations) score zero, so a non-positive threshold rejects every row.
fn retention_mask(table: &Table, threshold: f64) -> Result<Vec<bool>, ZScoreError> {
    let mut keep = vec![true; table.len()];
    for column in table.numeric_columns() {
        let Some(values) = column.as_numeric() else {
            continue;
        };
        let spread = match (stats::mean(values), stats::std_dev(values, 0)) {
            (Some(mean), Some(std)) if !mean.is_finite() || !std.is_finite() => {
                return Err(ZScoreError::NonFinite(column.name.clone()));
            }
            (Some(mean), Some(std)) if std > 0.0 => Some((mean, std)),
            _ => None,
        };
        for (row, value) in values.iter().enumerate() {
            let z = match (value, spread) {
                (Some(v), Some((mean, std))) => (v - mean) / std,
                _ => 0.0,
            };
            if !(z.abs() < threshold) {
                keep[row] = false;
            }
        }
    }
    Ok(keep)
}
