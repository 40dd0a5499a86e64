use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

use super::model::{Column, ColumnData, Table};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one requested column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CoercionOutcome {
    /// Converted (or already of the requested kind).
    Coerced,
    /// Left as it was because conversion did not apply.
    KeptOriginal { reason: String },
    /// No column of that name exists.
    Absent,
}

/// A coerced table plus the per-column outcome, in request order.
#[derive(Debug, Clone)]
pub struct Coercion {
    pub table: Table,
    pub outcomes: Vec<(String, CoercionOutcome)>,
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Convert `columns` to numeric and `date_column` to datetime.
///
/// Never fails: numeric conversion nulls unparseable cells, and a date column
/// that does not parse is kept unchanged.
pub fn coerce(table: &Table, columns: &[impl AsRef<str>], date_column: Option<&str>) -> Table {
    coerce_with_report(table, columns, date_column).table
}

pub fn coerce_with_report(
    table: &Table,
    columns: &[impl AsRef<str>],
    date_column: Option<&str>,
) -> Coercion {
    let mut out = table.clone();
    let mut outcomes = Vec::with_capacity(columns.len());

    for name in columns.iter().map(AsRef::as_ref) {
        let Some(column) = out.column(name) else {
            outcomes.push((name.to_string(), CoercionOutcome::Absent));
            continue;
        };

        let (converted, outcome) = if date_column == Some(name) {
            match to_datetime(&column.data) {
                Ok(data) => (Some(data), CoercionOutcome::Coerced),
                Err(reason) => {
                    log::debug!("kept '{name}' as {}: {reason}", column.kind());
                    (None, CoercionOutcome::KeptOriginal { reason })
                }
            }
        } else {
            (Some(to_numeric(&column.data)), CoercionOutcome::Coerced)
        };

        if let Some(data) = converted {
            out = out.with_column(Column::new(name, data));
        }
        outcomes.push((name.to_string(), outcome));
    }

    Coercion {
        table: out,
        outcomes,
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn to_numeric(data: &ColumnData) -> ColumnData {
    match data {
        ColumnData::Numeric(v) => ColumnData::Numeric(v.clone()),
        ColumnData::DateTime(v) => ColumnData::Numeric(
            v.iter()
                .map(|d| d.and_then(|d| d.and_utc().timestamp_nanos_opt()).map(|n| n as f64))
                .collect(),
        ),
        ColumnData::Text(v) => ColumnData::Numeric(
            v.iter()
                .map(|s| parse_number(s.as_deref()))
                .collect(),
        ),
    }
}

/// Parse a cell as a number; `NaN` spellings count as missing.
pub(crate) fn parse_number(cell: Option<&str>) -> Option<f64> {
    cell.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| !v.is_nan())
}

fn to_datetime(data: &ColumnData) -> Result<ColumnData, String> {
    match data {
        ColumnData::DateTime(v) => Ok(ColumnData::DateTime(v.clone())),
        ColumnData::Numeric(_) => Err("numeric values are not timestamps".into()),
        ColumnData::Text(v) => v
            .iter()
            .map(|cell| match cell {
                None => Ok(None),
                Some(s) => parse_datetime(s)
                    .map(Some)
                    .ok_or_else(|| format!("'{s}' is not a recognised date")),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ColumnData::DateTime),
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d.%m.%Y", "%d %b %Y", "%b %d, %Y", "%B %d, %Y",
];

/// Parse the common textual date and date-time layouts. Offsets are
/// normalised to UTC.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::data::model::{ColumnKind, Value};

    fn table() -> Table {
        Table::new(vec![
            Column::new(
                "Date",
                ColumnData::Text(vec![Some("2024-01-05".into()), None, Some("01/07/2024".into())]),
            ),
            Column::new(
                "Sales",
                ColumnData::Text(vec![Some("10".into()), Some("ten".into()), Some(" 3.5 ".into())]),
            ),
        ])
    }

    #[test]
    fn date_and_numeric_columns_are_converted() {
        let report = coerce_with_report(&table(), &["Date", "Sales", "Nope"], Some("Date"));
        let out = &report.table;

        assert_eq!(out.column("Date").unwrap().kind(), ColumnKind::DateTime);
        let expected = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(out.row(2)[0], Value::DateTime(expected));
        assert_eq!(
            out.column("Sales").unwrap().as_numeric().unwrap(),
            &[Some(10.0), None, Some(3.5)]
        );
        assert_eq!(report.outcomes[2], ("Nope".to_string(), CoercionOutcome::Absent));
    }

    #[test]
    fn unparseable_date_column_is_kept() {
        let t = Table::new(vec![Column::new(
            "When",
            ColumnData::Text(vec![Some("2024-01-01".into()), Some("soon".into())]),
        )]);
        let report = coerce_with_report(&t, &["When"], Some("When"));
        assert_eq!(report.table, t);
        assert!(matches!(
            &report.outcomes[0].1,
            CoercionOutcome::KeptOriginal { reason } if reason.contains("soon")
        ));
    }

    #[test]
    fn input_table_is_not_mutated() {
        let t = table();
        let _ = coerce(&t, &["Sales"], None);
        assert_eq!(t, table());
    }

    #[test]
    fn rfc3339_offsets_are_normalised() {
        let dt = parse_datetime("2024-03-01T10:00:00+02:00").unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "08:00");
    }

    proptest! {
        #[test]
        fn numeric_coercion_never_fails(cells in proptest::collection::vec(proptest::option::of(".{0,8}"), 0..20)) {
            let t = Table::new(vec![Column::new("c", ColumnData::Text(cells.clone()))]);
            let out = coerce(&t, &["c"], None);
            let col = out.column("c").unwrap();
            prop_assert_eq!(col.kind(), ColumnKind::Numeric);
            prop_assert_eq!(col.len(), cells.len());
            for (cell, value) in cells.iter().zip(col.as_numeric().unwrap()) {
                let parsed = cell
                    .as_deref()
                    .and_then(|s| s.trim().parse::<f64>().ok())
                    .filter(|v| !v.is_nan());
                prop_assert_eq!(parsed, *value);
            }
        }
    }
}
