//! In-process spreadsheet with Sheets-like append semantics.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{is_blank, A1Range, Row, SheetError, SheetService};

#[derive(Debug, Clone)]
struct Sheet {
    title: String,
    rows: Vec<Row>,
}

/// A spreadsheet held in memory. Every mutating call is recorded so callers
/// can inspect what would have been sent to a real service.
#[derive(Debug, Default)]
pub struct MemorySheets {
    sheets: Mutex<Vec<Sheet>>,
    log: Mutex<Vec<String>>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a sheet with existing rows.
    pub fn with_sheet(self, title: &str, rows: Vec<Row>) -> Self {
        self.lock_sheets().push(Sheet {
            title: title.to_string(),
            rows,
        });
        self
    }

    /// Current rows of `title` with trailing blanks trimmed, as the API
    /// would return them for `A:ZZ`.
    pub fn rows(&self, title: &str) -> Option<Vec<Row>> {
        let sheets = self.lock_sheets();
        let sheet = sheets.iter().find(|s| s.title == title)?;
        Some(trim(sheet.rows.clone()))
    }

    /// Mutations applied so far, e.g. `append 'db1'!A:D ["db1","free",97.5,"2024-01-01"]`.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn lock_sheets(&self) -> std::sync::MutexGuard<'_, Vec<Sheet>> {
        // A poisoned lock only means a test panicked mid-call.
        self.sheets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, entry: String) {
        if let Ok(mut log) = self.log.lock() {
            log.push(entry);
        }
    }
}

fn trim(mut rows: Vec<Row>) -> Vec<Row> {
    for row in rows.iter_mut() {
        while row.last().is_some_and(is_blank) {
            row.pop();
        }
    }
    while rows.last().is_some_and(|r| r.is_empty()) {
        rows.pop();
    }
    rows
}

#[async_trait]
impl SheetService for MemorySheets {
    async fn sheet_titles(&self) -> Result<Vec<String>, SheetError> {
        Ok(self.lock_sheets().iter().map(|s| s.title.clone()).collect())
    }

    async fn add_sheet(&self, title: &str) -> Result<(), SheetError> {
        {
            let mut sheets = self.lock_sheets();
            if sheets.iter().any(|s| s.title == title) {
                return Err(SheetError::SheetExists(title.to_string()));
            }
            sheets.push(Sheet {
                title: title.to_string(),
                rows: Vec::new(),
            });
        }
        self.record(format!("add_sheet {}", title));
        Ok(())
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Row>, SheetError> {
        let r = A1Range::parse(range)?;
        let sheets = self.lock_sheets();
        let sheet = sheets
            .iter()
            .find(|s| s.title == r.sheet)
            .ok_or_else(|| SheetError::NoSuchSheet(r.sheet.clone()))?;

        let first = r.start_row.unwrap_or(1);
        let last = r.end_row.unwrap_or(sheet.rows.len()).min(sheet.rows.len());
        let mut out = Vec::new();
        for row_no in first..=last {
            let row = &sheet.rows[row_no - 1];
            out.push(
                (r.start_col..=r.end_col)
                    .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                    .collect(),
            );
        }
        Ok(trim(out))
    }

    async fn append_values(&self, range: &str, rows: Vec<Row>) -> Result<(), SheetError> {
        let r = A1Range::parse(range)?;
        {
            let mut sheets = self.lock_sheets();
            let sheet = sheets
                .iter_mut()
                .find(|s| s.title == r.sheet)
                .ok_or_else(|| SheetError::NoSuchSheet(r.sheet.clone()))?;

            let occupied = sheet
                .rows
                .iter()
                .rposition(|row| {
                    (r.start_col..=r.end_col).any(|c| row.get(c).is_some_and(|v| !is_blank(v)))
                })
                .map(|idx| idx + 1)
                .unwrap_or(0);
            let mut at = occupied.max(r.start_row.map(|n| n - 1).unwrap_or(0));

            for values in &rows {
                if sheet.rows.len() <= at {
                    sheet.rows.resize(at + 1, Vec::new());
                }
                let target = &mut sheet.rows[at];
                for (offset, value) in values.iter().enumerate() {
                    let col = r.start_col + offset;
                    if target.len() <= col {
                        target.resize(col + 1, Value::Null);
                    }
                    target[col] = value.clone();
                }
                at += 1;
            }
        }
        for values in rows {
            self.record(format!("append {} {}", range, Value::Array(values)));
        }
        Ok(())
    }

    async fn clear_values(&self, range: &str) -> Result<(), SheetError> {
        let r = A1Range::parse(range)?;
        {
            let mut sheets = self.lock_sheets();
            let sheet = sheets
                .iter_mut()
                .find(|s| s.title == r.sheet)
                .ok_or_else(|| SheetError::NoSuchSheet(r.sheet.clone()))?;

            let first = r.start_row.unwrap_or(1);
            let last = r.end_row.unwrap_or(sheet.rows.len()).min(sheet.rows.len());
            for row_no in first..=last {
                let row = &mut sheet.rows[row_no - 1];
                for col in r.start_col..=r.end_col {
                    if let Some(cell) = row.get_mut(col) {
                        *cell = Value::Null;
                    }
                }
            }
        }
        self.record(format!("clear {}", range));
        Ok(())
    }
}
