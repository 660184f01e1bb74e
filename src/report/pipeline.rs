//! One report run: measure, derive, reconcile, append.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{measure_size, SizeSource};
use crate::sheets::{a1_range, SheetService};

use super::reconcile::{reconcile, Reconciliation};
use super::{FreeSpaceReport, ReportError, SizeReport, COLUMNS};

/// Everything a finished run wrote.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub sheet: Reconciliation,
    pub size: SizeReport,
    pub free: FreeSpaceReport,
}

/// Runs the report against injected collaborators.
pub struct Reporter<'a> {
    config: &'a Config,
    source: &'a dyn SizeSource,
    sheets: &'a dyn SheetService,
    progress: bool,
}

impl<'a> Reporter<'a> {
    pub fn new(
        config: &'a Config,
        source: &'a dyn SizeSource,
        sheets: &'a dyn SheetService,
    ) -> Self {
        Self {
            config,
            source,
            sheets,
            progress: true,
        }
    }

    /// Suppress the human-readable progress lines on stdout.
    pub fn quiet(mut self) -> Self {
        self.progress = false;
        self
    }

    fn say(&self, line: &str) {
        if self.progress {
            println!("{}", line);
        }
    }

    /// Execute every step in order, stopping at the first failure.
    pub async fn run(&self, today: NaiveDate) -> Result<RunSummary, ReportError> {
        let server = &self.config.spreadsheet.server_name;
        let database = &self.config.database.name;
        let date_format = &self.config.spreadsheet.date_format;

        let size_gb = measure_size(self.source, database).await?;
        let size = SizeReport {
            server_name: server.clone(),
            database_name: database.clone(),
            size_gb,
            report_date: today,
        };
        info!(%server, %database, size_gb, "database size measured");
        self.say(&format!("Database size: {:.2} GB", size.size_gb));

        let free = size.free_space(self.config.disk.total_capacity_gb);
        if free.is_over_capacity() {
            warn!(
                %server,
                free_gb = free.free_gb,
                capacity_gb = self.config.disk.total_capacity_gb,
                "database exceeds configured disk capacity"
            );
        }
        self.say(&format!("Free disk space: {:.2} GB", free.free_gb));

        let sheet = reconcile(self.sheets, server, &self.config.spreadsheet.settle).await?;
        if sheet.created {
            self.say(&format!("Created sheet '{}'", sheet.title));
        } else {
            self.say(&format!("Using sheet '{}'", sheet.title));
        }

        let range = a1_range(&sheet.title, COLUMNS);
        self.say("Writing size row");
        self.sheets
            .append_values(&range, vec![size.to_row(date_format)])
            .await?;
        self.say("Writing free-space row");
        self.sheets
            .append_values(&range, vec![free.to_row(date_format)])
            .await?;

        info!(sheet = %sheet.title, "report written");
        self.say("Done.");
        Ok(RunSummary { sheet, size, free })
    }
}
