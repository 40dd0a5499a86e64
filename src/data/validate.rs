use super::model::Table;
use crate::error::ValidationError;

/// Check that `x` and every name in `ys` are columns of `table`.
///
/// A missing x-column is reported on its own; otherwise all missing
/// y-columns are listed together.
pub fn validate(table: &Table, x: &str, ys: &[impl AsRef<str>]) -> Result<(), ValidationError> {
    if !table.contains(x) {
        return Err(ValidationError::MissingX {
            column: x.to_string(),
            available: table.column_names(),
        });
    }

    let missing: Vec<String> = ys
        .iter()
        .map(AsRef::as_ref)
        .filter(|y| !table.contains(y))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingY {
            missing,
            available: table.column_names(),
        });
    }
    Ok(())
}

/// Like [`validate`], in `(is_valid, message)` form.
pub fn check_columns(table: &Table, x: &str, ys: &[impl AsRef<str>]) -> (bool, String) {
    match validate(table, x, ys) {
        Ok(()) => (true, String::new()),
        Err(e) => (false, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Column, ColumnData};

    fn table() -> Table {
        Table::new(vec![
            Column::new("Date", ColumnData::Text(vec![])),
            Column::new("Sales", ColumnData::Numeric(vec![])),
        ])
    }

    #[test]
    fn present_columns_pass() {
        assert_eq!(validate(&table(), "Date", &["Sales"]), Ok(()));
        assert_eq!(check_columns(&table(), "Date", &["Sales"]), (true, String::new()));
    }

    #[test]
    fn missing_x_is_reported_first() {
        let err = validate(&table(), "When", &["Nope"]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingX {
                column: "When".into(),
                available: vec!["Date".into(), "Sales".into()],
            }
        );
    }

    #[test]
    fn every_missing_y_is_listed() {
        let (ok, msg) = check_columns(&table(), "Date", &["A", "Sales", "B"]);
        assert!(!ok);
        assert!(msg.contains(r#"["A", "B"]"#), "{msg}");
        assert!(msg.contains(r#"["Date", "Sales"]"#), "{msg}");
    }
}
