//! Find or create the server's sheet and clear its stale free-space row.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SettleConfig;
use crate::sheets::memory::MemorySheets;
use crate::sheets::{a1_range, last_non_empty_row, Row, SheetError, SheetService};

use super::{header_row, is_free_space_row, COLUMNS};

/// What reconciliation did to the spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Title of the sheet rows will be written to.
    pub title: String,
    /// The sheet did not exist and was added.
    pub created: bool,
    /// The header row was written during this run.
    pub header_written: bool,
    /// One-based row whose values were cleared.
    pub cleared_row: Option<usize>,
}

/// Choose the sheet for `server` among `titles`.
///
/// A title equal to `server` wins. Otherwise the first title containing
/// `server` is used, so `db1` matches `db1-prod`.
pub fn find_sheet<'a>(titles: &'a [String], server: &str) -> Option<&'a str> {
    if let Some(exact) = titles.iter().find(|t| t.as_str() == server) {
        return Some(exact.as_str());
    }

    let mut matches = titles.iter().filter(|t| t.contains(server));
    let first = matches.next()?;
    let others: Vec<&str> = matches.map(String::as_str).collect();
    if !others.is_empty() {
        warn!(%server, chosen = %first, ?others, "several sheets match server name, using the first");
    }
    Some(first.as_str())
}

/// Read `range` until two consecutive reads agree on the last row, pausing
/// `settle.delay()` between reads. After `settle.max_attempts` reads the
/// latest one is used.
pub async fn read_settled(
    sheets: &dyn SheetService,
    range: &str,
    settle: &SettleConfig,
) -> Result<Vec<Row>, SheetError> {
    let mut rows = sheets.get_values(range).await?;
    if settle.max_attempts <= 1 {
        return Ok(rows);
    }

    for attempt in 2..=settle.max_attempts {
        tokio::time::sleep(settle.delay()).await;
        let next = sheets.get_values(range).await?;
        if last_non_empty_row(&next) == last_non_empty_row(&rows) {
            debug!(%range, attempt, "sheet settled");
            return Ok(next);
        }
        rows = next;
    }

    warn!(
        %range,
        attempts = settle.max_attempts,
        "sheet still changing, using latest read"
    );
    Ok(rows)
}

/// Make sure the sheet for `server` exists and holds no free-space row, so
/// the next two appends leave exactly one.
pub async fn reconcile(
    sheets: &dyn SheetService,
    server: &str,
    settle: &SettleConfig,
) -> Result<Reconciliation, SheetError> {
    let titles = sheets.sheet_titles().await?;

    let Some(title) = find_sheet(&titles, server).map(str::to_string) else {
        info!(%server, "creating sheet");
        sheets.add_sheet(server).await?;
        sheets
            .append_values(&a1_range(server, COLUMNS), vec![header_row()])
            .await?;
        return Ok(Reconciliation {
            title: server.to_string(),
            created: true,
            header_written: true,
            cleared_row: None,
        });
    };

    info!(%server, sheet = %title, "using existing sheet");
    let range = a1_range(&title, COLUMNS);
    let rows = read_settled(sheets, &range, settle).await?;

    let Some(last) = last_non_empty_row(&rows) else {
        info!(sheet = %title, "sheet is empty, writing header");
        sheets.append_values(&range, vec![header_row()]).await?;
        return Ok(Reconciliation {
            title,
            created: false,
            header_written: true,
            cleared_row: None,
        });
    };

    if last == 1 || !is_free_space_row(&rows[last - 1]) {
        warn!(sheet = %title, row = last, "last row is not a free-space row, leaving it in place");
        return Ok(Reconciliation {
            title,
            created: false,
            header_written: false,
            cleared_row: None,
        });
    }

    let row_range = a1_range(&title, &format!("A{last}:D{last}"));
    sheets.clear_values(&row_range).await?;
    info!(sheet = %title, row = last, "cleared previous free-space row");

    Ok(Reconciliation {
        title,
        created: false,
        header_written: false,
        cleared_row: Some(last),
    })
}

/// Copy what reconciliation would look at into an in-memory spreadsheet:
/// every sheet title, plus the `A:D` rows of the sheet `server` resolves to.
/// Nothing is written to `source`.
pub async fn mirror(sheets: &dyn SheetService, server: &str) -> Result<MemorySheets, SheetError> {
    let titles = sheets.sheet_titles().await?;
    let target = find_sheet(&titles, server);

    let mut mirror = MemorySheets::new();
    for title in &titles {
        let rows = if Some(title.as_str()) == target {
            sheets.get_values(&a1_range(title, COLUMNS)).await?
        } else {
            Vec::new()
        };
        mirror = mirror.with_sheet(title, rows);
    }
    debug!(%server, sheets = titles.len(), ?target, "mirrored spreadsheet");
    Ok(mirror)
}
