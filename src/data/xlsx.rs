//! Reader for OOXML spreadsheet containers (`.xlsx`).
//!
//! Only the first worksheet is read. The first non-blank row is the header;
//! fully blank rows below it are skipped. Numeric cells formatted with a date
//! number format are converted to datetimes.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

use super::loader::is_na_token;
use super::model::{Column, ColumnData, Table};

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("not a zip container: {0}")]
    Zip(#[from] ZipError),
    #[error("reading part {part}: {source}")]
    Io {
        part: String,
        #[source]
        source: std::io::Error,
    },
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("missing part {0}")]
    MissingPart(String),
    #[error("workbook has no worksheets")]
    NoSheets,
    #[error("invalid cell reference '{0}'")]
    BadReference(String),
}

type Result<T> = std::result::Result<T, XlsxError>;

/// One parsed cell value before column typing.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Number(f64),
    Date(NaiveDateTime),
    Text(String),
    Bool(bool),
    Empty,
}

impl Cell {
    fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn into_text(self) -> Option<String> {
        match self {
            Cell::Number(v) => Some(format_number(v)),
            Cell::Date(d) => Some(d.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::Text(s) => Some(s),
            Cell::Bool(b) => Some(if b { "True" } else { "False" }.to_string()),
            Cell::Empty => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Read the first worksheet of an `.xlsx` container into a [`Table`].
pub fn read_first_sheet(bytes: &[u8]) -> Result<Table> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let workbook = read_part(&mut archive, "xl/workbook.xml")?
        .ok_or_else(|| XlsxError::MissingPart("xl/workbook.xml".into()))?;
    let info = parse_workbook(&workbook)?;

    let sheet_path = match read_part(&mut archive, "xl/_rels/workbook.xml.rels")? {
        Some(rels) => parse_relationships(&rels)?
            .remove(&info.first_sheet_rid)
            .map(|target| resolve_target(&target))
            .unwrap_or_else(|| "xl/worksheets/sheet1.xml".to_string()),
        None => "xl/worksheets/sheet1.xml".to_string(),
    };

    let shared = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    let date_styles = match read_part(&mut archive, "xl/styles.xml")? {
        Some(xml) => parse_date_styles(&xml)?,
        None => Vec::new(),
    };

    let sheet = read_part(&mut archive, &sheet_path)?
        .ok_or_else(|| XlsxError::MissingPart(sheet_path.clone()))?;
    let ctx = SheetContext {
        shared: &shared,
        date_styles: &date_styles,
        date1904: info.date1904,
    };
    let rows = parse_sheet(&sheet, &ctx)?;
    log::debug!("xlsx: read {} rows from {sheet_path}", rows.len());

    Ok(build_table(rows))
}

fn read_part(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut text = String::new();
    file.read_to_string(&mut text).map_err(|source| XlsxError::Io {
        part: name.to_string(),
        source,
    })?;
    Ok(Some(text))
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(quick_xml::Error::from)?;
        if a.key.local_name().as_ref() == key {
            return Ok(Some(a.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Workbook / relationships
// ---------------------------------------------------------------------------

struct WorkbookInfo {
    first_sheet_rid: String,
    date1904: bool,
}

fn parse_workbook(xml: &str) -> Result<WorkbookInfo> {
    let mut reader = Reader::from_str(xml);
    let mut first_sheet_rid = None;
    let mut date1904 = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"workbookPr" => {
                    date1904 = matches!(attr(&e, b"date1904")?.as_deref(), Some("1" | "true"));
                }
                b"sheet" if first_sheet_rid.is_none() => {
                    first_sheet_rid = attr(&e, b"id")?;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(WorkbookInfo {
        first_sheet_rid: first_sheet_rid.ok_or(XlsxError::NoSheets)?,
        date1904,
    })
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, b"Id")?, attr(&e, b"Target")?) {
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

/// Relationship targets are relative to `xl/` unless absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(abs) => abs.to_string(),
        None => format!("xl/{target}"),
    }
}

// ---------------------------------------------------------------------------
// Shared strings / styles
// ---------------------------------------------------------------------------

fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    // Phonetic runs carry their own <t> elements which are not cell text.
    let mut in_phonetic = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = !in_phonetic,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_t => current.push_str(&t.unescape()?),
            Event::CData(c) if in_t => current.push_str(&String::from_utf8_lossy(&c)),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

/// For each cell format (`cellXfs/xf`, by index) whether it displays a date.
fn parse_date_styles(xml: &str) -> Result<Vec<bool>> {
    let mut reader = Reader::from_str(xml);
    let mut custom: HashMap<u32, bool> = HashMap::new();
    let mut xf_formats: Vec<u32> = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"numFmt" => {
                    let id = attr(&e, b"numFmtId")?.and_then(|v| v.parse().ok());
                    let code = attr(&e, b"formatCode")?;
                    if let (Some(id), Some(code)) = (id, code) {
                        custom.insert(id, is_date_format(&code));
                    }
                }
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => {
                    let id = attr(&e, b"numFmtId")?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    xf_formats.push(id);
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(xf_formats
        .into_iter()
        .map(|id| custom.get(&id).copied().unwrap_or_else(|| is_builtin_date(id)))
        .collect())
}

fn is_builtin_date(id: u32) -> bool {
    matches!(id, 14..=22 | 45..=47)
}

/// A custom format is a date format if, outside quoted literals, escapes and
/// bracketed sections, it uses any of the date/time tokens.
fn is_date_format(code: &str) -> bool {
    let mut chars = code.chars();
    let mut stripped = String::new();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut section = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    section.push(c);
                }
                // Elapsed-time sections like [h] or [mm] are time tokens.
                let lower = section.to_ascii_lowercase();
                if !lower.is_empty() && lower.chars().all(|c| matches!(c, 'h' | 'm' | 's')) {
                    stripped.push('h');
                }
            }
            c => stripped.push(c.to_ascii_lowercase()),
        }
    }
    stripped
        .chars()
        .any(|c| matches!(c, 'd' | 'm' | 'y' | 'h' | 's'))
}

// ---------------------------------------------------------------------------
// Worksheet
// ---------------------------------------------------------------------------

struct SheetContext<'a> {
    shared: &'a [String],
    date_styles: &'a [bool],
    date1904: bool,
}

/// Raw attributes and text of a `<c>` element while it is being read.
#[derive(Default)]
struct PendingCell {
    column: u32,
    kind: Option<String>,
    style: Option<usize>,
    value: Option<String>,
    inline: String,
}

/// Parse `<sheetData>` into `row number -> [(column index, cell)]`, both 0-based.
fn parse_sheet(xml: &str, ctx: &SheetContext<'_>) -> Result<BTreeMap<u32, Vec<(u32, Cell)>>> {
    let mut reader = Reader::from_str(xml);
    let mut rows: BTreeMap<u32, Vec<(u32, Cell)>> = BTreeMap::new();
    let mut row_idx: u32 = 0;
    let mut next_row: u32 = 0;
    let mut next_col: u32 = 0;
    let mut pending: Option<PendingCell> = None;
    let mut in_v = false;
    let mut in_inline_t = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_idx = start_row(&e, next_row)?;
                    next_row = row_idx + 1;
                    next_col = 0;
                }
                b"c" => {
                    let cell = start_cell(&e, next_col)?;
                    next_col = cell.column + 1;
                    pending = Some(cell);
                }
                b"v" => in_v = true,
                b"t" => in_inline_t = pending.is_some(),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_idx = start_row(&e, next_row)?;
                    next_row = row_idx + 1;
                }
                b"c" => {
                    let cell = start_cell(&e, next_col)?;
                    next_col = cell.column + 1;
                }
                _ => {}
            },
            Event::Text(t) => {
                if let Some(cell) = pending.as_mut() {
                    if in_v {
                        cell.value.get_or_insert_with(String::new).push_str(&t.unescape()?);
                    } else if in_inline_t {
                        cell.inline.push_str(&t.unescape()?);
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"t" => in_inline_t = false,
                b"c" => {
                    if let Some(cell) = pending.take() {
                        let column = cell.column;
                        let value = resolve_cell(cell, ctx);
                        if !value.is_empty() {
                            rows.entry(row_idx).or_default().push((column, value));
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rows)
}

fn start_row(e: &BytesStart<'_>, fallback: u32) -> Result<u32> {
    Ok(match attr(e, b"r")? {
        Some(r) => r
            .parse::<u32>()
            .ok()
            .and_then(|r| r.checked_sub(1))
            .ok_or(XlsxError::BadReference(r))?,
        None => fallback,
    })
}

fn start_cell(e: &BytesStart<'_>, fallback: u32) -> Result<PendingCell> {
    let column = match attr(e, b"r")? {
        Some(reference) => reference_to_column(&reference)?,
        None => fallback,
    };
    Ok(PendingCell {
        column,
        kind: attr(e, b"t")?,
        style: attr(e, b"s")?.and_then(|s| s.parse().ok()),
        ..PendingCell::default()
    })
}

/// Widest sheet Excel allows (column `XFD`).
const MAX_COLUMNS: u32 = 16_384;

/// Column letters of a reference like `AB12`, as a 0-based index.
fn reference_to_column(reference: &str) -> Result<u32> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return Err(XlsxError::BadReference(reference.to_string()));
    }
    let bad = || XlsxError::BadReference(reference.to_string());
    let mut col = 0u32;
    for b in letters.bytes() {
        col = col
            .checked_mul(26)
            .and_then(|acc| acc.checked_add(u32::from(b.to_ascii_uppercase() - b'A' + 1)))
            .filter(|&c| c <= MAX_COLUMNS)
            .ok_or_else(bad)?;
    }
    Ok(col - 1)
}

fn resolve_cell(cell: PendingCell, ctx: &SheetContext<'_>) -> Cell {
    let text_cell = |s: String| {
        if is_na_token(&s) {
            Cell::Empty
        } else {
            Cell::Text(s)
        }
    };
    match (cell.kind.as_deref(), cell.value) {
        (Some("s"), Some(v)) => v
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| ctx.shared.get(i).cloned())
            .map_or(Cell::Empty, text_cell),
        (Some("inlineStr"), _) => text_cell(cell.inline),
        (Some("str"), Some(v)) => text_cell(v),
        (Some("b"), Some(v)) => Cell::Bool(v.trim() == "1"),
        (Some("e"), _) => Cell::Empty,
        (Some("d"), Some(v)) => parse_iso(&v).map_or_else(|| text_cell(v), Cell::Date),
        (_, Some(v)) => match v.trim().parse::<f64>() {
            Ok(n) => {
                let is_date = cell
                    .style
                    .and_then(|s| ctx.date_styles.get(s).copied())
                    .unwrap_or(false);
                match is_date.then(|| serial_to_datetime(n, ctx.date1904)).flatten() {
                    Some(d) => Cell::Date(d),
                    None => Cell::Number(n),
                }
            }
            Err(_) => text_cell(v),
        },
        (_, None) => Cell::Empty,
    }
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Convert an Excel serial date. The 1900 system counts the nonexistent
/// 1900-02-29, so serials before 60 are shifted by a day.
fn serial_to_datetime(serial: f64, date1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let (base, serial) = if date1904 {
        (NaiveDate::from_ymd_opt(1904, 1, 1)?, serial)
    } else if serial < 60.0 {
        (NaiveDate::from_ymd_opt(1899, 12, 31)?, serial)
    } else {
        (NaiveDate::from_ymd_opt(1899, 12, 30)?, serial)
    };
    let millis = (serial * 86_400_000.0).round() as i64;
    base.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::milliseconds(millis))
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

// ---------------------------------------------------------------------------
// Table assembly
// ---------------------------------------------------------------------------

fn build_table(mut rows: BTreeMap<u32, Vec<(u32, Cell)>>) -> Table {
    let Some((&header_row, _)) = rows.iter().next() else {
        return Table::default();
    };
    let header = rows.remove(&header_row).unwrap_or_default();

    let width = header
        .iter()
        .chain(rows.values().flatten())
        .map(|(c, _)| c + 1)
        .max()
        .unwrap_or(0) as usize;

    let mut names = vec![String::new(); width];
    for (col, cell) in header {
        names[col as usize] = cell.into_text().unwrap_or_default();
    }

    let mut grid: Vec<Vec<Cell>> = vec![Vec::with_capacity(rows.len()); width];
    for cells in rows.into_values() {
        let mut row = vec![Cell::Empty; width];
        for (col, cell) in cells {
            row[col as usize] = cell;
        }
        for (col, cell) in row.into_iter().enumerate() {
            grid[col].push(cell);
        }
    }

    let columns = names
        .into_iter()
        .zip(grid)
        .map(|(name, cells)| Column::new(name, type_cells(cells)))
        .collect();
    Table::new(columns)
}

fn type_cells(cells: Vec<Cell>) -> ColumnData {
    let present = || cells.iter().filter(|c| !c.is_empty());
    if present().all(|c| matches!(c, Cell::Number(_))) {
        ColumnData::Numeric(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::Number(v) => Some(v),
                    _ => None,
                })
                .collect(),
        )
    } else if present().all(|c| matches!(c, Cell::Date(_))) {
        ColumnData::DateTime(
            cells
                .into_iter()
                .map(|c| match c {
                    Cell::Date(d) => Some(d),
                    _ => None,
                })
                .collect(),
        )
    } else {
        ColumnData::Text(cells.into_iter().map(Cell::into_text).collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;
    use crate::data::model::Value;

    /// Assemble a minimal workbook from a sheet body and shared strings.
    pub(crate) fn workbook(sheet_data: &str, shared: &[&str], styles: Option<&str>) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();
        let mut put = |name: &str, body: String| {
            zip.start_file(name, opts).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        };
        put(
            "xl/workbook.xml",
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Data" sheetId="1" r:id="rId1"/></sheets></workbook>"#.to_string(),
        );
        put(
            "xl/_rels/workbook.xml.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="worksheet" Target="worksheets/data.xml"/></Relationships>"#.to_string(),
        );
        let items: String = shared.iter().map(|s| format!("<si><t>{s}</t></si>")).collect();
        put(
            "xl/sharedStrings.xml",
            format!(r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">{items}</sst>"#),
        );
        if let Some(styles) = styles {
            put("xl/styles.xml", styles.to_string());
        }
        put(
            "xl/worksheets/data.xml",
            format!(r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{sheet_data}</sheetData></worksheet>"#),
        );
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn reads_shared_strings_numbers_and_gaps() {
        let sheet = r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
<row r="2"><c r="A2"><v>1.5</v></c><c r="B2" t="s"><v>2</v></c></row>
<row r="4"><c r="B4" t="inlineStr"><is><t>z</t></is></c></row>"#;
        let bytes = workbook(sheet, &["x", "label", "a"], None);
        let table = read_first_sheet(&bytes).unwrap();

        assert_eq!(table.column_names(), vec!["x", "label"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(0), vec![Value::Number(1.5), Value::Text("a".into())]);
        assert_eq!(table.row(1), vec![Value::Missing, Value::Text("z".into())]);
    }

    #[test]
    fn date_styled_numbers_become_datetimes() {
        let styles = r#"<styleSheet><numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd"/></numFmts><cellXfs count="3"><xf numFmtId="0"/><xf numFmtId="164"/><xf numFmtId="14"/></cellXfs></styleSheet>"#;
        let sheet = r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
<row r="2"><c r="A2" s="1"><v>44927</v></c><c r="B2" s="0"><v>3</v></c></row>
<row r="3"><c r="A3" s="2"><v>44928.5</v></c><c r="B3"><v>4</v></c></row>"#;
        let bytes = workbook(sheet, &["Date", "n"], Some(styles));
        let table = read_first_sheet(&bytes).unwrap();

        let date = table.column("Date").unwrap();
        let expected = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(date.data.value(0), Value::DateTime(expected));
        assert_eq!(
            date.data.value(1),
            Value::DateTime(expected + Duration::hours(36))
        );
        assert_eq!(table.column("n").unwrap().kind(), crate::data::model::ColumnKind::Numeric);
    }

    #[test]
    fn format_code_detection() {
        assert!(is_date_format("yyyy-mm-dd"));
        assert!(is_date_format("[$-409]h:mm AM/PM"));
        assert!(is_date_format("[h]:mm"));
        assert!(!is_date_format("0.00"));
        assert!(!is_date_format("\"days\" 0"));
        assert!(!is_date_format("[Red]#,##0"));
    }

    #[test]
    fn column_references_stop_at_xfd() {
        assert_eq!(reference_to_column("A1").unwrap(), 0);
        assert_eq!(reference_to_column("ab12").unwrap(), 27);
        assert_eq!(reference_to_column("XFD1").unwrap(), 16_383);
        assert!(matches!(reference_to_column("XFE1"), Err(XlsxError::BadReference(_))));
        assert!(matches!(
            reference_to_column("AAAAAAAAA1"),
            Err(XlsxError::BadReference(_))
        ));
    }

    #[test]
    fn oversized_cell_reference_is_an_error() {
        let sheet = r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row><row r="2"><c r="AAAAAAAAA2"><v>1</v></c></row>"#;
        let bytes = workbook(sheet, &["Sales"], None);
        assert!(matches!(
            read_first_sheet(&bytes),
            Err(XlsxError::BadReference(_))
        ));
    }

    #[test]
    fn non_zip_bytes_are_rejected() {
        assert!(matches!(
            read_first_sheet(b"not a zip"),
            Err(XlsxError::Zip(_))
        ));
    }
}
