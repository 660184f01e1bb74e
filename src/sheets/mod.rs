//! Spreadsheet capability surface: list, create, read, append, clear.
//!
//! The report pipeline only talks to [`SheetService`]. [`google::GoogleSheets`]
//! is the real Sheets v4 client; [`memory::MemorySheets`] keeps a grid in
//! process for dry runs and tests.

pub mod google;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// One row of cell values, in column order.
pub type Row = Vec<Value>;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("sheets request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sheets API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid API base URL '{0}'")]
    BaseUrl(String),

    #[error("invalid A1 range '{0}'")]
    InvalidRange(String),

    #[error("no sheet titled '{0}'")]
    NoSuchSheet(String),

    #[error("a sheet titled '{0}' already exists")]
    SheetExists(String),
}

/// Operations the report needs from a spreadsheet.
#[async_trait]
pub trait SheetService: Send + Sync {
    /// Titles of all sheets, in the order the service lists them.
    async fn sheet_titles(&self) -> Result<Vec<String>, SheetError>;

    /// Add an empty sheet with the given title.
    async fn add_sheet(&self, title: &str) -> Result<(), SheetError>;

    /// Values in `range`. Trailing empty rows and cells are omitted.
    async fn get_values(&self, range: &str) -> Result<Vec<Row>, SheetError>;

    /// Append `rows` after the last non-empty row of `range`, letting the
    /// service interpret values as if typed by a user.
    async fn append_values(&self, range: &str, rows: Vec<Row>) -> Result<(), SheetError>;

    /// Clear values (not formatting) in `range`.
    async fn clear_values(&self, range: &str) -> Result<(), SheetError>;
}

/// Build an A1 range for `cells` on the sheet `title`.
///
/// The title is always single-quoted: names such as `db1` would otherwise
/// parse as cell references.
pub fn a1_range(title: &str, cells: &str) -> String {
    format!("'{}'!{}", title.replace('\'', "''"), cells)
}

/// A parsed A1 range such as `'db1'!A3:D3` or `Sheet1!A:D`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: String,
    /// Zero-based inclusive column bounds.
    pub start_col: usize,
    pub end_col: usize,
    /// One-based inclusive row bounds; `None` means unbounded.
    pub start_row: Option<usize>,
    pub end_row: Option<usize>,
}

impl A1Range {
    pub fn parse(range: &str) -> Result<Self, SheetError> {
        let invalid = || SheetError::InvalidRange(range.to_string());

        let bang = range.rfind('!').ok_or_else(invalid)?;
        let (sheet_part, cells) = (&range[..bang], &range[bang + 1..]);

        let sheet = if sheet_part.len() >= 2
            && sheet_part.starts_with('\'')
            && sheet_part.ends_with('\'')
        {
            sheet_part[1..sheet_part.len() - 1].replace("''", "'")
        } else {
            sheet_part.to_string()
        };
        if sheet.is_empty() {
            return Err(invalid());
        }

        let (start, end) = match cells.split_once(':') {
            Some((s, e)) => (s, e),
            None => (cells, cells),
        };
        let (start_col, start_row) = parse_cell(start).ok_or_else(invalid)?;
        let (end_col, end_row) = parse_cell(end).ok_or_else(invalid)?;
        if end_col < start_col {
            return Err(invalid());
        }

        Ok(Self {
            sheet,
            start_col,
            end_col,
            start_row,
            end_row,
        })
    }
}

/// `"D7"` -> `(3, Some(7))`, `"A"` -> `(0, None)`.
fn parse_cell(cell: &str) -> Option<(usize, Option<usize>)> {
    let letters: String = cell.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &cell[letters.len()..];
    if letters.is_empty() {
        return None;
    }

    let col = letters
        .to_ascii_uppercase()
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize)
        - 1;
    let row = if digits.is_empty() {
        None
    } else {
        match digits.parse::<usize>() {
            Ok(0) | Err(_) => return None,
            Ok(n) => Some(n),
        }
    };
    Some((col, row))
}

/// A cell counts as empty when it is null or a blank string.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// One-based index of the last row holding at least one non-blank cell.
pub fn last_non_empty_row(rows: &[Row]) -> Option<usize> {
    rows.iter()
        .rposition(|row| row.iter().any(|v| !is_blank(v)))
        .map(|idx| idx + 1)
}
