//! Batch entry points: every configured sheet/column span → PNG folders.
//!
//! A run walks [`RenderConfig::sets`] in order. For each column it wipes and
//! recreates `{output_dir}/{sheet}_{COL}`, renders every non-blank cell to
//! `{row}.png` and records one [`CellOutcome`] per cell. Cell failures are
//! logged and counted but never stop the run; a missing sheet is recorded on
//! its [`SetReport`] and the next set proceeds. Only an unreadable workbook is
//! fatal.

use crate::config::{RenderConfig, SheetColumnSet};
use crate::error::Cell2PngError;
use crate::grid::{index_to_column, is_blank, Grid, GridSource, XlsxWorkbook};
use crate::output::{BatchReport, CellOutcome, ColumnReport, SetReport};
use crate::pipeline::assemble::to_markup;
use crate::pipeline::render::{RenderSpec, Renderer};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Characters of cell text shown when a cell fails.
const PREVIEW_CHARS: usize = 50;

/// A set whose sheet was read and whose columns were resolved.
struct PlannedSet {
    set: SheetColumnSet,
    grid: Grid,
    columns: Vec<usize>,
}

enum Plan {
    Ready(PlannedSet),
    Failed(SetReport),
}

/// Render every configured set from `source`.
///
/// # Returns
/// `Ok(BatchReport)` even when some cells or sets failed; inspect
/// [`ColumnReport::missing_rows`] and [`SetReport::error`].
///
/// # Errors
/// Returns `Err` only when the workbook itself cannot be read.
pub async fn run_batch(
    source: &mut dyn GridSource,
    config: &RenderConfig,
    renderer: &Renderer,
    progress: Option<ProgressCallback>,
) -> Result<BatchReport, Cell2PngError> {
    let started = Instant::now();
    let progress = progress.unwrap_or_else(|| Arc::new(NoopProgressCallback) as ProgressCallback);
    info!(
        "Starting batch: {} set(s) → {}",
        config.sets.len(),
        config.output_dir.display()
    );

    // ── Step 1: Read sheets and resolve column spans ─────────────────────
    let mut plans = Vec::with_capacity(config.sets.len());
    for set in &config.sets {
        plans.push(plan_set(source, set)?);
    }

    let total_cells: usize = plans
        .iter()
        .filter_map(|p| match p {
            Plan::Ready(ready) => Some(ready),
            Plan::Failed(_) => None,
        })
        .flat_map(|ready| ready.columns.iter().map(move |&c| non_blank_count(&ready.grid, c)))
        .sum();
    progress.on_batch_start(total_cells);

    // ── Step 2: Render column by column ──────────────────────────────────
    let mut sets = Vec::with_capacity(plans.len());
    for plan in plans {
        let planned = match plan {
            Plan::Failed(report) => {
                sets.push(report);
                continue;
            }
            Plan::Ready(planned) => planned,
        };
        sets.push(render_set(planned, config, renderer, &progress).await);
    }

    let report = BatchReport {
        sets,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        "Batch complete: {}/{} cells rendered in {}ms",
        report.succeeded(),
        report.attempted(),
        report.duration_ms
    );
    progress.on_batch_complete(report.attempted(), report.succeeded());
    Ok(report)
}

/// Synchronous wrapper around [`run_batch`].
///
/// Creates a new Tokio runtime internally. Do not call from within an
/// existing async context (use [`run_batch`] directly instead).
pub fn run_batch_sync(
    source: &mut dyn GridSource,
    config: &RenderConfig,
    renderer: &Renderer,
    progress: Option<ProgressCallback>,
) -> Result<BatchReport, Cell2PngError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Cell2PngError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_batch(source, config, renderer, progress))
}

/// Open the workbook at `path` and render it with the standard toolchain.
pub async fn render_workbook(
    path: impl AsRef<Path>,
    config: &RenderConfig,
    progress: Option<ProgressCallback>,
) -> Result<BatchReport, Cell2PngError> {
    let mut workbook = XlsxWorkbook::open(path)?;
    let renderer = Renderer::from_config(config);
    debug!("Renderer: {:?}", renderer);
    run_batch(&mut workbook, config, &renderer, progress).await
}

// ── Planning ─────────────────────────────────────────────────────────────────

fn plan_set(source: &mut dyn GridSource, set: &SheetColumnSet) -> Result<Plan, Cell2PngError> {
    let grid = match source.grid(&set.sheet) {
        Ok(grid) => grid,
        Err(e @ (Cell2PngError::WorkbookNotFound { .. } | Cell2PngError::WorkbookUnreadable { .. })) => {
            return Err(e)
        }
        Err(e) => {
            error!("Skipping set {}: {}", set, e);
            return Ok(Plan::Failed(SetReport::failed(set.clone(), e)));
        }
    };

    let columns = match resolve_columns(set, &grid) {
        Ok(columns) => columns,
        Err(e) => {
            error!("Skipping set {}: {}", set, e);
            return Ok(Plan::Failed(SetReport::failed(set.clone(), e)));
        }
    };
    if columns.is_empty() {
        warn!("Set {}: no columns within the sheet's used range", set);
    }

    Ok(Plan::Ready(PlannedSet {
        set: set.clone(),
        grid,
        columns,
    }))
}

/// Column indices covered by `set`, clamped to the grid.
///
/// An open end runs to the last column holding any text.
fn resolve_columns(set: &SheetColumnSet, grid: &Grid) -> Result<Vec<usize>, Cell2PngError> {
    let start = set.start.index()?;
    let end = match &set.end {
        Some(end) => end.index()?,
        None => match last_populated_column(grid) {
            Some(last) => last,
            None => return Ok(Vec::new()),
        },
    };
    let end = end.min(grid.width().saturating_sub(1));
    if grid.width() == 0 || start > end {
        return Ok(Vec::new());
    }
    Ok((start..=end).collect())
}

fn last_populated_column(grid: &Grid) -> Option<usize> {
    (0..grid.width())
        .rev()
        .find(|&c| non_blank_count(grid, c) > 0)
}

fn non_blank_count(grid: &Grid, col: usize) -> usize {
    grid.column(col).filter(|(_, text)| !is_blank(*text)).count()
}

// ── Rendering ────────────────────────────────────────────────────────────────

async fn render_set(
    planned: PlannedSet,
    config: &RenderConfig,
    renderer: &Renderer,
    progress: &ProgressCallback,
) -> SetReport {
    let PlannedSet { set, grid, columns } = planned;
    info!("Set {}: {} column(s)", set, columns.len());

    let mut reports = Vec::with_capacity(columns.len());
    for col in columns {
        match render_column(&set.sheet, &grid, col, config, renderer, progress).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!("Set {}: {}", set, e);
                return SetReport {
                    set,
                    error: Some(e.to_string()),
                    columns: reports,
                };
            }
        }
    }

    SetReport {
        set,
        error: None,
        columns: reports,
    }
}

async fn render_column(
    sheet: &str,
    grid: &Grid,
    col: usize,
    config: &RenderConfig,
    renderer: &Renderer,
    progress: &ProgressCallback,
) -> Result<ColumnReport, Cell2PngError> {
    let label = index_to_column(col);
    let folder = config.output_dir.join(format!("{sheet}_{label}"));
    prepare_folder(&folder).await?;

    let geometry = config.geometry_for(sheet);
    let cells: Vec<(usize, &str)> = grid
        .column(col)
        .filter_map(|(r, text)| text.filter(|t| !t.trim().is_empty()).map(|t| (r + 1, t)))
        .collect();
    progress.on_column_start(sheet, &label, cells.len());
    debug!(
        "{}_{}: {} cell(s) at {}x{} @ {} DPI",
        sheet,
        label,
        cells.len(),
        geometry.width,
        geometry.height,
        geometry.dpi
    );

    let mut outcomes = Vec::with_capacity(cells.len());
    for (row, text) in cells {
        progress.on_cell_start(sheet, &label, row);

        let body = to_markup(text, &config.profile);
        let spec = RenderSpec {
            row,
            body: &body,
            geometry,
            fit: config.fit,
            font: &config.font,
            font_size: config.font_size.as_deref(),
        };
        let output = folder.join(format!("{row}.png"));

        match renderer.render(&spec, &output).await {
            Ok(()) => {
                progress.on_cell_complete(sheet, &label, row);
                outcomes.push(CellOutcome {
                    row,
                    path: Some(output),
                    error: None,
                });
            }
            Err(e) => {
                warn!("{}_{}: {} (cell: {:?})", sheet, label, e, preview(text));
                progress.on_cell_error(sheet, &label, row, &e.to_string());
                outcomes.push(CellOutcome {
                    row,
                    path: None,
                    error: Some(e),
                });
            }
        }
    }

    let report = ColumnReport::from_outcomes(sheet, label.clone(), folder, outcomes);
    if report.is_complete() {
        info!(
            "{}_{}: {}/{} rendered",
            sheet, label, report.succeeded, report.attempted
        );
    } else {
        warn!(
            "{}_{}: {}/{} rendered, missing rows {:?}",
            sheet, label, report.succeeded, report.attempted, report.missing_rows
        );
    }
    progress.on_column_complete(sheet, &label, report.attempted, report.succeeded);
    Ok(report)
}

/// Delete and recreate a column folder.
async fn prepare_folder(folder: &Path) -> Result<(), Cell2PngError> {
    let failed = |source: std::io::Error| Cell2PngError::OutputDirFailed {
        path: PathBuf::from(folder),
        source,
    };
    if tokio::fs::try_exists(folder).await.map_err(failed)? {
        debug!("Removing existing folder {}", folder.display());
        tokio::fs::remove_dir_all(folder).await.map_err(failed)?;
    }
    tokio::fs::create_dir_all(folder).await.map_err(failed)
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push('…');
    }
    out
}
