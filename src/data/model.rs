use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::coerce::parse_number;

// ---------------------------------------------------------------------------
// Value – a single cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell, used for previews and display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    DateTime(NaiveDateTime),
    Text(String),
    Missing,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{v}"),
            Value::DateTime(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
            Value::Text(s) => write!(f, "{s}"),
            Value::Missing => write!(f, "NaN"),
        }
    }
}

impl Value {
    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

// ---------------------------------------------------------------------------
// Column – one named, homogeneously typed sequence
// ---------------------------------------------------------------------------

/// The inferred scalar kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    DateTime,
    Text,
}

impl ColumnKind {
    pub fn name(self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::DateTime => "datetime",
            ColumnKind::Text => "text",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cell storage for a column. `None` is the missing marker.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    DateTime(Vec<Option<NaiveDateTime>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::DateTime(_) => ColumnKind::DateTime,
            ColumnData::Text(_) => ColumnKind::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::DateTime(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnData::Numeric(v) => v[row].is_none(),
            ColumnData::DateTime(v) => v[row].is_none(),
            ColumnData::Text(v) => v[row].is_none(),
        }
    }

    pub fn value(&self, row: usize) -> Value {
        match self {
            ColumnData::Numeric(v) => v[row].map_or(Value::Missing, Value::Number),
            ColumnData::DateTime(v) => v[row].map_or(Value::Missing, Value::DateTime),
            ColumnData::Text(v) => v[row]
                .as_ref()
                .map_or(Value::Missing, |s| Value::Text(s.clone())),
        }
    }

    /// Keep only the rows whose mask entry is `true`.
    fn select(&self, keep: &[bool]) -> ColumnData {
        fn pick<T: Clone>(values: &[T], keep: &[bool]) -> Vec<T> {
            values
                .iter()
                .zip(keep)
                .filter(|(_, &k)| k)
                .map(|(v, _)| v.clone())
                .collect()
        }
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(pick(v, keep)),
            ColumnData::DateTime(v) => ColumnData::DateTime(pick(v, keep)),
            ColumnData::Text(v) => ColumnData::Text(pick(v, keep)),
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Column {
            name: name.into(),
            data,
        }
    }

    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        (0..self.len()).filter(|&r| self.data.is_missing(r)).count()
    }

    /// Numeric cells, or `None` if the column is not numeric.
    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Read the column through a numeric lens: numbers as-is, datetimes as
    /// epoch milliseconds, text parsed the way numeric coercion parses it.
    pub fn numeric_view(&self) -> Vec<Option<f64>> {
        match &self.data {
            ColumnData::Numeric(v) => v.clone(),
            ColumnData::DateTime(v) => v
                .iter()
                .map(|d| d.map(|d| d.and_utc().timestamp_millis() as f64))
                .collect(),
            ColumnData::Text(v) => v
                .iter()
                .map(|s| parse_number(s.as_deref()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Table – the complete normalized dataset
// ---------------------------------------------------------------------------

/// Ordered collection of equal-length, uniquely named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Build a table, renaming duplicate names and checking equal lengths.
    ///
    /// Panics if the columns differ in length; loaders always pad rows
    /// before building.
    pub fn new(columns: Vec<Column>) -> Self {
        let rows = columns.first().map_or(0, Column::len);
        assert!(
            columns.iter().all(|c| c.len() == rows),
            "all columns of a table must have the same length"
        );
        let names = dedupe_names(columns.iter().map(|c| c.name.clone()).collect());
        let columns = columns
            .into_iter()
            .zip(names)
            .map(|(c, name)| Column { name, data: c.data })
            .collect();
        Table { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Numeric columns, in table order.
    pub fn numeric_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| c.kind() == ColumnKind::Numeric)
    }

    /// One row as display values.
    pub fn row(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.data.value(row)).collect()
    }

    /// A new table with the same columns but only the rows kept by `keep`.
    pub fn filter_rows(&self, keep: &[bool]) -> Table {
        debug_assert_eq!(keep.len(), self.rows);
        let columns: Vec<Column> = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                data: c.data.select(keep),
            })
            .collect();
        let rows = keep.iter().filter(|&&k| k).count();
        Table { columns, rows }
    }

    /// A new table with `column` replacing the column of the same name.
    pub(crate) fn with_column(&self, column: Column) -> Table {
        let mut next = self.clone();
        if let Some(slot) = next.columns.iter_mut().find(|c| c.name == column.name) {
            *slot = column;
        }
        next
    }
}

/// Rename duplicate or blank headers: `a, a, ""` -> `a, a.1, Unnamed: 2`.
pub(crate) fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(names.len());
    for (idx, name) in names.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {idx}")
        } else {
            name
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        seen.push(candidate);
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_and_blank_headers_are_renamed() {
        let names = dedupe_names(vec!["a".into(), "a".into(), "".into(), "a".into()]);
        assert_eq!(names, vec!["a", "a.1", "Unnamed: 2", "a.2"]);
    }

    #[test]
    fn filter_rows_keeps_order() {
        let table = Table::new(vec![
            Column::new("n", ColumnData::Numeric(vec![Some(1.0), None, Some(3.0)])),
            Column::new(
                "t",
                ColumnData::Text(vec![Some("a".into()), Some("b".into()), None]),
            ),
        ]);
        let kept = table.filter_rows(&[true, false, true]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.row(1), vec![Value::Number(3.0), Value::Missing]);
        assert_eq!(table.len(), 3, "source table is untouched");
    }

    #[test]
    fn numeric_view_parses_text() {
        let col = Column::new(
            "t",
            ColumnData::Text(vec![Some(" 2.5".into()), Some("x".into()), None]),
        );
        assert_eq!(col.numeric_view(), vec![Some(2.5), None, None]);
    }

    #[test]
    fn numeric_view_treats_nan_spellings_as_missing() {
        let col = Column::new(
            "t",
            ColumnData::Text(vec![Some("NAN".into()), Some("nan".into()), Some("-3".into())]),
        );
        assert_eq!(col.numeric_view(), vec![None, None, Some(-3.0)]);
    }
}
