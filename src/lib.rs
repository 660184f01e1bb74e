//! sizedb -- report PostgreSQL database size and free disk space to a Google
//! Sheets dashboard.
//!
//! One invocation measures one database, appends a size row to the server's
//! sheet and replaces the sheet's trailing free-space row.

pub mod auth;
pub mod config;
pub mod db;
pub mod report;
pub mod sheets;

use chrono::Local;

use crate::config::Config;
use crate::db::PgSizeSource;
use crate::report::pipeline::{Reporter, RunSummary};
use crate::report::reconcile::mirror;
use crate::report::ReportError;
use crate::sheets::google::GoogleSheets;
use crate::sheets::memory::MemorySheets;
use crate::sheets::SheetService;

/// Knobs for a single run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Measure the database but write to an in-memory copy of the remote
    /// spreadsheet instead of the spreadsheet itself.
    pub dry_run: bool,
    /// No progress lines on stdout.
    pub quiet: bool,
}

/// Run one report with real collaborators built from `config`.
pub async fn run(config: &Config, opts: RunOptions) -> Result<RunSummary, ReportError> {
    let say = |line: &str| {
        if !opts.quiet {
            println!("{}", line);
        }
    };
    let today = Local::now().date_naive();

    if opts.dry_run {
        tracing::info!("dry run, the spreadsheet will not be modified");
        let sheets = dry_run_sheets(config).await?;
        say("Connecting to database");
        let source = PgSizeSource::connect(&config.database).await?;
        let result = reporter(config, &source, &sheets, opts.quiet).run(today).await;
        source.close().await;
        for entry in sheets.log() {
            say(&format!("[dry-run] {}", entry));
        }
        return result;
    }

    say("Getting credentials");
    let token = auth::access_token(&config.credentials).await?;
    let sheets = GoogleSheets::new(
        &config.spreadsheet.id,
        &token,
        &config.credentials.app_name,
    )?;

    say("Connecting to database");
    let source = PgSizeSource::connect(&config.database).await?;
    let result = reporter(config, &source, &sheets, opts.quiet).run(today).await;
    source.close().await;
    result
}

/// Read-only copy of the remote spreadsheet for a dry run. Without usable
/// credentials the run starts from an empty spreadsheet instead.
async fn dry_run_sheets(config: &Config) -> Result<MemorySheets, ReportError> {
    let token = match auth::access_token(&config.credentials).await {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(error = %e, "no credentials, dry run assumes the server has no sheet yet");
            return Ok(MemorySheets::new());
        }
    };
    let remote = GoogleSheets::new(
        &config.spreadsheet.id,
        &token,
        &config.credentials.app_name,
    )?;
    Ok(mirror(&remote, &config.spreadsheet.server_name).await?)
}

fn reporter<'a>(
    config: &'a Config,
    source: &'a PgSizeSource,
    sheets: &'a dyn SheetService,
    quiet: bool,
) -> Reporter<'a> {
    let reporter = Reporter::new(config, source, sheets);
    if quiet {
        reporter.quiet()
    } else {
        reporter
    }
}
