use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::model::{Column, ColumnData, Table};
use super::xlsx;
use crate::error::{AttemptFailure, IngestionError};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// One interpretation of an opaque payload.
struct Attempt {
    name: &'static str,
    parse: fn(&[u8]) -> Result<Table, String>,
}

/// Interpretations tried in order; the first success wins.
const ATTEMPTS: [Attempt; 3] = [
    Attempt {
        name: "csv text",
        parse: parse_csv_text,
    },
    Attempt {
        name: "base64 csv",
        parse: parse_base64_csv,
    },
    Attempt {
        name: "base64 excel",
        parse: parse_base64_excel,
    },
];

/// Load a table from a payload whose format is not declared.
///
/// Supported interpretations, in order:
/// * literal CSV text
/// * base64-encoded CSV
/// * base64-encoded `.xlsx` workbook (first sheet)
pub fn load(payload: impl AsRef<[u8]>) -> Result<Table, IngestionError> {
    let payload = payload.as_ref();
    let mut failures = Vec::with_capacity(ATTEMPTS.len());

    for attempt in &ATTEMPTS {
        match (attempt.parse)(payload) {
            Ok(table) => {
                log::debug!(
                    "loaded {} rows x {} columns as {}",
                    table.len(),
                    table.width(),
                    attempt.name
                );
                return Ok(table);
            }
            Err(reason) => {
                log::debug!("{} rejected: {reason}", attempt.name);
                failures.push(AttemptFailure {
                    attempt: attempt.name,
                    reason,
                });
            }
        }
    }

    Err(IngestionError { attempts: failures })
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

fn parse_csv_text(payload: &[u8]) -> Result<Table, String> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err("no data".into());
    }
    if payload.contains(&0) {
        return Err("payload is binary".into());
    }
    let table = parse_csv(&String::from_utf8_lossy(payload))?;
    if table.width() == 1 && is_encoded_document(payload) {
        return Err("payload is a base64-encoded document".into());
    }
    Ok(table)
}

fn parse_base64_csv(payload: &[u8]) -> Result<Table, String> {
    let decoded = decode_base64(payload)?;
    if !is_text_like(&decoded) {
        return Err("decoded bytes are not text".into());
    }
    parse_csv(&String::from_utf8_lossy(&decoded))
}

fn parse_base64_excel(payload: &[u8]) -> Result<Table, String> {
    let decoded = decode_base64(payload)?;
    xlsx::read_first_sheet(&decoded).map_err(|e| e.to_string())
}

/// Decode standard base64, ignoring line breaks and other whitespace.
fn decode_base64(payload: &[u8]) -> Result<Vec<u8>, String> {
    let compact: Vec<u8> = payload
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err("no data".into());
    }
    BASE64.decode(&compact).map_err(|e| e.to_string())
}

/// Text as far as CSV is concerned: valid UTF-8 with no control bytes
/// besides tab, CR and LF.
fn is_text_like(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes).is_ok()
        && bytes
            .iter()
            .all(|&b| b >= 0x20 || matches!(b, b'\t' | b'\n' | b'\r'))
}

/// Whether the payload decodes as base64 into text or a zip container.
fn is_encoded_document(payload: &[u8]) -> bool {
    match decode_base64(payload) {
        Ok(decoded) => decoded.starts_with(b"PK\x03\x04") || is_text_like(&decoded),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Cell contents treated as missing values.
const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub(crate) fn is_na_token(cell: &str) -> bool {
    NA_TOKENS.contains(&cell)
}

/// Header row followed by data rows. Short rows are padded with missing
/// values; rows wider than the header are an error.
fn parse_csv(text: &str) -> Result<Table, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("reading header: {e}"))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.is_empty() {
        return Err("no columns to parse".into());
    }

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for result in reader.records() {
        let record = result.map_err(|e| e.to_string())?;
        if record.len() > headers.len() {
            let line = record.position().map_or(0, |p| p.line());
            return Err(format!(
                "expected {} fields in line {line}, saw {}",
                headers.len(),
                record.len()
            ));
        }
        for (idx, column) in cells.iter_mut().enumerate() {
            let cell = record.get(idx).unwrap_or("");
            column.push((!is_na_token(cell)).then(|| cell.to_string()));
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, values)| Column::new(name, infer_column(values)))
        .collect();
    Ok(Table::new(columns))
}

/// Numeric when every present cell parses as a number, otherwise text.
fn infer_column(values: Vec<Option<String>>) -> ColumnData {
    let numbers: Option<Vec<Option<f64>>> = values
        .iter()
        .map(|v| match v {
            None => Some(None),
            Some(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .map(|v| (!v.is_nan()).then_some(v)),
        })
        .collect();
    match numbers {
        Some(numbers) => ColumnData::Numeric(numbers),
        None => ColumnData::Text(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{ColumnKind, Value};
    use crate::data::xlsx::tests::workbook;

    const CSV: &str = "Date,Sales,Region\n2024-01-01,10,north\n2024-01-02,,south\n2024-01-03,12.5,NA\n";

    #[test]
    fn literal_csv_is_typed() {
        let table = load(CSV).unwrap();
        assert_eq!(table.column_names(), vec!["Date", "Sales", "Region"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.column("Date").unwrap().kind(), ColumnKind::Text);
        assert_eq!(table.column("Sales").unwrap().kind(), ColumnKind::Numeric);
        assert_eq!(table.row(1)[1], Value::Missing);
        assert_eq!(table.row(2)[2], Value::Missing);
    }

    #[test]
    fn base64_csv_matches_literal() {
        let encoded = BASE64.encode(CSV);
        assert_eq!(load(&encoded).unwrap(), load(CSV).unwrap());
    }

    #[test]
    fn wrapped_base64_csv_matches_literal() {
        let encoded = BASE64.encode(CSV.repeat(3));
        let wrapped: String = encoded
            .as_bytes()
            .chunks(20)
            .map(|c| format!("{}\n", String::from_utf8_lossy(c)))
            .collect();
        assert_eq!(load(&wrapped).unwrap(), load(CSV.repeat(3)).unwrap());
    }

    #[test]
    fn one_column_csv_that_also_decodes_as_base64_stays_literal() {
        // "Sales100" is valid base64, but it decodes to bytes that are not UTF-8.
        let table = load("Sales\n100\n").unwrap();
        assert_eq!(table.column_names(), vec!["Sales"]);
        assert_eq!(table.row(0), vec![Value::Number(100.0)]);

        for body in ["Units\n120\n", "Count\n512\n", "Temp\n2048\n"] {
            let table = load(body).unwrap();
            assert_eq!(table.column_names(), vec![body.lines().next().unwrap()]);
        }
    }

    #[test]
    fn encoded_one_column_csv_is_decoded() {
        let table = load(BASE64.encode("Sales\n7\n")).unwrap();
        assert_eq!(table.column_names(), vec!["Sales"]);
        assert_eq!(table.row(0), vec![Value::Number(7.0)]);
    }

    #[test]
    fn base64_excel_is_third_attempt() {
        let sheet = r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row><row r="2"><c r="A2"><v>7</v></c></row>"#;
        let bytes = workbook(sheet, &["Sales"], None);
        let table = load(BASE64.encode(bytes)).unwrap();
        assert_eq!(table.column_names(), vec!["Sales"]);
        assert_eq!(table.row(0), vec![Value::Number(7.0)]);
    }

    #[test]
    fn malformed_workbook_reference_fails_every_attempt() {
        let sheet = r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row><row r="2"><c r="AAAAAAAAA2"><v>7</v></c></row>"#;
        let bytes = workbook(sheet, &["Sales"], None);
        let err = load(BASE64.encode(bytes)).unwrap_err();
        assert_eq!(err.attempts.len(), ATTEMPTS.len());
    }

    #[test]
    fn short_rows_are_padded_and_long_rows_fail() {
        let table = load("a,b\n1\n").unwrap();
        assert_eq!(table.row(0), vec![Value::Number(1.0), Value::Missing]);

        let err = parse_csv("a,b\n1,2,3\n").unwrap_err();
        assert!(err.contains("expected 2 fields"), "{err}");
    }

    #[test]
    fn invalid_utf8_is_tolerated() {
        let mut bytes = b"name,value\ncaf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b",3\n");
        let table = load(bytes).unwrap();
        assert_eq!(table.row(0)[1], Value::Number(3.0));
    }

    #[test]
    fn single_column_text_that_is_not_base64_stays_text() {
        let table = load("abcd\n1234\n").unwrap();
        assert_eq!(table.column_names(), vec!["abcd"]);
        assert_eq!(table.row(0), vec![Value::Number(1234.0)]);
    }

    #[test]
    fn exhausted_attempts_are_all_reported() {
        let err = load("").unwrap_err();
        assert_eq!(err.attempts.len(), 3);
        let names: Vec<_> = err.attempts.iter().map(|a| a.attempt).collect();
        assert_eq!(names, vec!["csv text", "base64 csv", "base64 excel"]);
    }
}
