use std::collections::HashSet;

use serde::Serialize;

use super::model::{ColumnKind, Table, Value};
use super::stats;
use crate::error::ValidationError;

/// Rows included in previews.
pub const PREVIEW_ROWS: usize = 5;

/// Non-numeric columns list their distinct values up to this many.
const MAX_LISTED_DISTINCT: usize = 10;

// ---------------------------------------------------------------------------
// Table summary
// ---------------------------------------------------------------------------

/// Shape, column types, missing counts and the first rows of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    pub column_kinds: Vec<ColumnKind>,
    pub missing_values: Vec<usize>,
    pub preview: Vec<Vec<Value>>,
}

pub fn summarize(table: &Table) -> Summary {
    Summary {
        rows: table.len(),
        columns: table.width(),
        column_names: table.column_names(),
        column_kinds: table.columns().iter().map(|c| c.kind()).collect(),
        missing_values: table.columns().iter().map(|c| c.missing_count()).collect(),
        preview: (0..table.len().min(PREVIEW_ROWS))
            .map(|r| table.row(r))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Column profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; absent with fewer than two values.
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistinctValues {
    pub count: usize,
    /// Listed only when there are few of them.
    pub values: Option<Vec<Value>>,
}

/// Detailed information about a single column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub non_missing: usize,
    pub total: usize,
    pub missing: usize,
    pub numeric: Option<NumericStats>,
    pub distinct: Option<DistinctValues>,
    pub sample: Vec<Value>,
}

pub fn profile_column(table: &Table, name: &str) -> Result<ColumnProfile, ValidationError> {
    let column = table.column(name).ok_or_else(|| ValidationError::MissingX {
        column: name.to_string(),
        available: table.column_names(),
    })?;

    let missing = column.missing_count();
    let sample = (0..column.len().min(PREVIEW_ROWS))
        .map(|r| column.data.value(r))
        .collect();

    let (numeric, distinct) = match column.as_numeric() {
        Some(values) => (numeric_stats(values), None),
        None => (None, Some(distinct_values(table, name))),
    };

    Ok(ColumnProfile {
        name: column.name.clone(),
        kind: column.kind(),
        non_missing: column.len() - missing,
        total: column.len(),
        missing,
        numeric,
        distinct,
        sample,
    })
}

fn numeric_stats(values: &[Option<f64>]) -> Option<NumericStats> {
    Some(NumericStats {
        mean: stats::mean(values)?,
        median: stats::median(values)?,
        std: stats::std_dev(values, 1),
        min: stats::min(values)?,
        max: stats::max(values)?,
    })
}

fn distinct_values(table: &Table, name: &str) -> DistinctValues {
    let mut seen = HashSet::new();
    let mut values = Vec::new();
    if let Some(column) = table.column(name) {
        for row in 0..column.len() {
            let value = column.data.value(row);
            if !value.is_missing() && seen.insert(value.to_string()) {
                values.push(value);
            }
        }
    }
    DistinctValues {
        count: values.len(),
        values: (values.len() <= MAX_LISTED_DISTINCT).then_some(values),
    }
}
