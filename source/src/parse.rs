//! Delimited-text parsing into typed records.
//!
//! Tokenizing (quoted fields, embedded separators and newlines, doubled
//! quotes) is delegated to the `csv` crate. This module adds what the
//! catalog needs on top:
//!
//! - `\r\n` and lone `\r` line endings are normalized to `\n` first.
//! - Header names lose control characters (including a BOM) and
//!   surrounding whitespace; columns whose header ends up empty are dropped.
//! - Each cell is typed with [`Value::infer`]; empty cells are omitted.
//! - Rows the tokenizer rejects are skipped and counted.

use catalog_cache_core::{Record, Value};
use tracing::warn;

use crate::error::Result;

/// Records parsed from one file, plus the number of rejected rows.
#[derive(Debug, Clone, Default)]
pub struct ParsedTable {
    pub records: Vec<Record>,
    pub skipped_rows: usize,
}

/// Normalizes every line-ending style to `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Strips control characters and surrounding whitespace from a header name.
pub fn clean_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() && *c != '\u{feff}')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parses one delimited file whose first row is the header.
///
/// # Errors
///
/// Returns [`CsvError`](crate::SourceError::CsvError) only when the header
/// row itself cannot be read. Bad data rows are skipped.
///
/// # Examples
///
/// ```
/// use catalog_cache_core::Value;
/// use catalog_cache_source::parse_delimited;
///
/// let parsed = parse_delimited("id,name,is_trans\r\n1,\"Brick, 2x4\",FALSE\r\n").unwrap();
/// let row = &parsed.records[0];
/// assert_eq!(row.get("id"), Some(&Value::Int(1)));
/// assert_eq!(row.text("name"), Some("Brick, 2x4"));
/// assert_eq!(row.flag("is_trans"), Some(false));
/// ```
pub fn parse_delimited(text: &str) -> Result<ParsedTable> {
    parse_delimited_with(text, b',')
}

/// Like [`parse_delimited`], splitting fields on `delimiter` instead of a
/// comma.
///
/// ```
/// use catalog_cache_source::parse_delimited_with;
///
/// let parsed = parse_delimited_with("id\tname\n1\tBrick, 2x4\n", b'\t').unwrap();
/// assert_eq!(parsed.records[0].text("name"), Some("Brick, 2x4"));
/// ```
pub fn parse_delimited_with(text: &str, delimiter: u8) -> Result<ParsedTable> {
    let normalized = normalize_line_endings(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(normalized.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(clean_header).collect();
    let mut parsed = ParsedTable::default();

    for (line, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!(row = line + 1, error = %e, "Skipping malformed row");
                parsed.skipped_rows += 1;
                continue;
            }
        };

        let record: Record = headers
            .iter()
            .zip(row.iter())
            .filter(|(header, _)| !header.is_empty())
            .filter_map(|(header, cell)| Value::infer(cell).map(|v| (header.clone(), v)))
            .collect();

        if !record.is_empty() {
            parsed.records.push(record);
        }
    }

    Ok(parsed)
}
