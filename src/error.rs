//! Error types for the cell2png library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`Cell2PngError`] (**fatal**): the run cannot proceed at all (workbook
//!   missing, configuration invalid). Returned as `Err` from
//!   [`crate::batch::run_batch`].
//!
//! * [`CellError`] (**non-fatal**): a single cell failed to render but every
//!   other cell is fine. Stored inside [`crate::output::CellOutcome`] so the
//!   column report can list the missing rows.
//!
//! * [`ToolError`]: one failed attempt of one external backend. A
//!   [`CellError::Rasterize`] carries one of these per backend tried.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the cell2png library.
#[derive(Debug, Error)]
pub enum Cell2PngError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Workbook file was not found at the given path.
    #[error("Workbook not found: '{path}'\nCheck the path exists and is readable.")]
    WorkbookNotFound { path: PathBuf },

    /// The file exists but could not be opened as a spreadsheet.
    #[error("Workbook '{path}' could not be read: {detail}")]
    WorkbookUnreadable { path: PathBuf, detail: String },

    /// A configured sheet is absent from the workbook.
    ///
    /// Recorded on the set report; the batch moves on to the next set.
    #[error("Sheet '{sheet}' not found in workbook")]
    SheetNotFound { sheet: String },

    /// A column label contains something other than ASCII letters.
    #[error("Invalid column label '{label}': expected letters such as A, Z or AA")]
    InvalidColumn { label: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not prepare a column output directory.
    #[error("Failed to prepare output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single cell.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum CellError {
    /// The LaTeX compiler failed or produced no document.
    #[error("Row {row}: compile failed: {detail}")]
    Compile { row: usize, detail: String },

    /// Every rasterizer backend failed.
    #[error("Row {row}: rasterisation failed ({} backend(s) tried): {}", attempts.len(), attempts.join("; "))]
    Rasterize { row: usize, attempts: Vec<String> },

    /// Writing the source or copying the result failed.
    #[error("Row {row}: I/O error: {detail}")]
    Io { row: usize, detail: String },
}

impl CellError {
    /// The 1-based spreadsheet row this error belongs to.
    pub fn row(&self) -> usize {
        match self {
            CellError::Compile { row, .. }
            | CellError::Rasterize { row, .. }
            | CellError::Io { row, .. } => *row,
        }
    }
}

/// One failed attempt of one external tool or in-process backend.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The binary could not be spawned (usually: not on `PATH`).
    #[error("{tool}: not available: {detail}")]
    NotAvailable { tool: String, detail: String },

    /// The process exited non-zero.
    #[error("{tool}: exited with {code}: {diagnostic}")]
    Failed {
        tool: String,
        code: String,
        diagnostic: String,
    },

    /// The process exceeded the configured budget and was killed.
    #[error("{tool}: timed out after {secs}s")]
    TimedOut { tool: String, secs: u64 },

    /// The tool succeeded but its output is missing or has the wrong size.
    #[error("{tool}: bad output: {detail}")]
    BadOutput { tool: String, detail: String },
}
