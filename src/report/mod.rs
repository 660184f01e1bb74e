//! Size and free-space snapshots and the run that writes them.

pub mod pipeline;
pub mod reconcile;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::CredentialError;
use crate::db::DbError;
use crate::sheets::{Row, SheetError};

/// Header written to a freshly created server sheet.
pub const HEADER: [&str; 4] = ["Server", "Database", "Size in GB", "Update Date"];

/// Column-B label marking the free-space snapshot row.
pub const FREE_LABEL: &str = "free";

/// Columns every report row spans.
pub const COLUMNS: &str = "A:D";

/// Any failure that aborts a run.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Sheet(#[from] SheetError),
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Remaining capacity after the database. Negative means over capacity.
pub fn free_space_gb(total_capacity_gb: f64, size_gb: f64) -> f64 {
    round2(total_capacity_gb - size_gb)
}

/// Measured size of one database on one server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeReport {
    pub server_name: String,
    pub database_name: String,
    pub size_gb: f64,
    pub report_date: NaiveDate,
}

/// Remaining disk capacity on one server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreeSpaceReport {
    pub server_name: String,
    pub free_gb: f64,
    pub report_date: NaiveDate,
}

impl SizeReport {
    pub fn to_row(&self, date_format: &str) -> Row {
        vec![
            json!(self.server_name),
            json!(self.database_name),
            json!(self.size_gb),
            json!(self.report_date.format(date_format).to_string()),
        ]
    }

    /// Derive the free-space snapshot for a disk of `total_capacity_gb`.
    pub fn free_space(&self, total_capacity_gb: f64) -> FreeSpaceReport {
        FreeSpaceReport {
            server_name: self.server_name.clone(),
            free_gb: free_space_gb(total_capacity_gb, self.size_gb),
            report_date: self.report_date,
        }
    }
}

impl FreeSpaceReport {
    pub fn to_row(&self, date_format: &str) -> Row {
        vec![
            json!(self.server_name),
            json!(FREE_LABEL),
            json!(self.free_gb),
            json!(self.report_date.format(date_format).to_string()),
        ]
    }

    pub fn is_over_capacity(&self) -> bool {
        self.free_gb < 0.0
    }
}

pub fn header_row() -> Row {
    HEADER.iter().map(|h| Value::from(*h)).collect()
}

/// Whether `row` is a free-space snapshot (column B holds [`FREE_LABEL`]).
pub fn is_free_space_row(row: &[Value]) -> bool {
    row.get(1)
        .and_then(Value::as_str)
        .is_some_and(|label| label.trim() == FREE_LABEL)
}
