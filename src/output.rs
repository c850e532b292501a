//! Result types returned by a batch run.
//!
//! Every type here derives `Serialize` so the CLI can print the whole report
//! with `--json`.

use crate::config::SheetColumnSet;
use crate::error::CellError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened to one non-blank cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellOutcome {
    /// 1-based spreadsheet row; also the PNG file stem.
    pub row: usize,

    /// Path of the written PNG, when rendering succeeded.
    pub path: Option<PathBuf>,

    /// Why the cell produced no PNG, when it failed.
    pub error: Option<CellError>,
}

impl CellOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.path.is_some()
    }
}

/// Summary of one `{sheet}_{COL}` folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnReport {
    pub sheet: String,

    /// Spreadsheet label of the column (`"B"`, `"AA"`).
    pub column: String,

    /// Folder the PNGs were written to.
    pub folder: PathBuf,

    /// Number of non-blank cells.
    pub attempted: usize,

    /// Number of PNGs written.
    pub succeeded: usize,

    /// Rows that were attempted but produced no PNG, ascending.
    pub missing_rows: Vec<usize>,

    pub outcomes: Vec<CellOutcome>,
}

impl ColumnReport {
    /// Build a report from per-cell outcomes, deriving the counts.
    pub fn from_outcomes(
        sheet: impl Into<String>,
        column: impl Into<String>,
        folder: PathBuf,
        outcomes: Vec<CellOutcome>,
    ) -> Self {
        let attempted = outcomes.len();
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let mut missing_rows: Vec<usize> = outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.row)
            .collect();
        missing_rows.sort_unstable();

        Self {
            sheet: sheet.into(),
            column: column.into(),
            folder,
            attempted,
            succeeded,
            missing_rows,
            outcomes,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing_rows.is_empty()
    }
}

/// Result of one sheet/column-span entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetReport {
    pub set: SheetColumnSet,

    /// Set-level failure (missing sheet, bad column); no columns were processed.
    pub error: Option<String>,

    pub columns: Vec<ColumnReport>,
}

impl SetReport {
    pub fn failed(set: SheetColumnSet, error: impl ToString) -> Self {
        Self {
            set,
            error: Some(error.to_string()),
            columns: Vec::new(),
        }
    }

    pub fn attempted(&self) -> usize {
        self.columns.iter().map(|c| c.attempted).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.columns.iter().map(|c| c.succeeded).sum()
    }
}

/// Result of a whole batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub sets: Vec<SetReport>,

    /// Wall-clock time of the run.
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.sets.iter().map(SetReport::attempted).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.sets.iter().map(SetReport::succeeded).sum()
    }

    /// Whether at least one set wrote at least one PNG.
    pub fn any_rendered(&self) -> bool {
        self.sets.iter().any(|s| s.succeeded() > 0)
    }
}
