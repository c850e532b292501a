//! Grid ingestion: the two-dimensional cell text the batch renders from.
//!
//! The batch never talks to a spreadsheet library directly. It asks a
//! [`GridSource`] for one [`Grid`] per sheet, so tests and library callers can
//! feed in-memory grids while the CLI reads `.xlsx` files through
//! [`XlsxWorkbook`].

use crate::error::Cell2PngError;
use calamine::{open_workbook_auto, Data, Reader, Sheets};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ── Column labels ────────────────────────────────────────────────────────

/// Convert a spreadsheet column label to a 0-based index.
///
/// `A → 0`, `Z → 25`, `AA → 26`. Labels are trimmed and case-insensitive.
pub fn column_to_index(label: &str) -> Result<usize, Cell2PngError> {
    let invalid = || Cell2PngError::InvalidColumn {
        label: label.to_string(),
    };
    let label = label.trim();
    if label.is_empty() || !label.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }

    let mut result: usize = 0;
    for c in label.bytes() {
        let digit = (c.to_ascii_uppercase() - b'A') as usize + 1;
        result = result
            .checked_mul(26)
            .and_then(|r| r.checked_add(digit))
            .ok_or_else(invalid)?;
    }
    Ok(result - 1)
}

/// Convert a 0-based column index to its spreadsheet label.
pub fn index_to_column(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index;
    loop {
        letters.push(b'A' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

// ── Grid ─────────────────────────────────────────────────────────────────

/// Row-major cell text of one sheet, bounded at the first fully blank row.
///
/// Cells that carried no usable text (empty, error values) are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<Option<String>>>,
    width: usize,
}

impl Grid {
    /// Build a grid, dropping the first fully blank row and everything after it.
    pub fn from_rows(rows: Vec<Vec<Option<String>>>) -> Self {
        let end = rows
            .iter()
            .position(|row| row.iter().all(|c| is_blank(c.as_deref())))
            .unwrap_or(rows.len());
        let mut rows = rows;
        rows.truncate(end);
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self { rows, width }
    }

    /// Number of rows kept.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns (the widest row).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Text at `(row, col)`, both 0-based. Missing cells read as `None`.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)?.as_deref()
    }

    /// Iterate `(row_index, text)` for one column, including blank cells.
    pub fn column(&self, col: usize) -> impl Iterator<Item = (usize, Option<&str>)> + '_ {
        (0..self.rows.len()).map(move |r| (r, self.cell(r, col)))
    }
}

/// Whether a cell counts as "no content".
pub fn is_blank(cell: Option<&str>) -> bool {
    cell.is_none_or(|s| s.trim().is_empty())
}

// ── Sources ──────────────────────────────────────────────────────────────

/// Anything that can hand out one [`Grid`] per sheet name.
pub trait GridSource {
    /// Names of the sheets available.
    fn sheet_names(&self) -> Vec<String>;

    /// Read one sheet. A missing sheet is [`Cell2PngError::SheetNotFound`].
    fn grid(&mut self, sheet: &str) -> Result<Grid, Cell2PngError>;
}

impl GridSource for HashMap<String, Grid> {
    fn sheet_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.keys().cloned().collect();
        names.sort();
        names
    }

    fn grid(&mut self, sheet: &str) -> Result<Grid, Cell2PngError> {
        self.get(sheet)
            .cloned()
            .ok_or_else(|| Cell2PngError::SheetNotFound {
                sheet: sheet.to_string(),
            })
    }
}

/// A spreadsheet file read through calamine (`.xlsx`, `.xlsm`, `.xls`, `.ods`).
pub struct XlsxWorkbook {
    path: PathBuf,
    sheets: Sheets<BufReader<File>>,
}

impl XlsxWorkbook {
    /// Open a workbook. A missing file is fatal for the whole run.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Cell2PngError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(Cell2PngError::WorkbookNotFound { path });
        }
        let sheets = open_workbook_auto(&path).map_err(|e| Cell2PngError::WorkbookUnreadable {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        info!("Opened workbook: {}", path.display());
        Ok(Self { path, sheets })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GridSource for XlsxWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    fn grid(&mut self, sheet: &str) -> Result<Grid, Cell2PngError> {
        if !self.sheets.sheet_names().iter().any(|s| s == sheet) {
            return Err(Cell2PngError::SheetNotFound {
                sheet: sheet.to_string(),
            });
        }
        let range = self
            .sheets
            .worksheet_range(sheet)
            .map_err(|e| Cell2PngError::WorkbookUnreadable {
                path: self.path.clone(),
                detail: format!("sheet '{sheet}': {e}"),
            })?;

        // Positions are absolute so that column A is index 0 even when the
        // used range starts further right.
        let Some((end_row, end_col)) = range.end() else {
            return Ok(Grid::default());
        };
        let rows = (0..=end_row)
            .map(|r| {
                (0..=end_col)
                    .map(|c| range.get_value((r, c)).and_then(cell_text))
                    .collect()
            })
            .collect();
        let grid = Grid::from_rows(rows);
        debug!(
            "Sheet '{}': {} rows x {} columns",
            sheet,
            grid.height(),
            grid.width()
        );
        Ok(grid)
    }
}

/// Text of one calamine cell; error cells and empties carry none.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::Error(e) => {
            debug!("Skipping error cell: {:?}", e);
            None
        }
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
