//! # cell2png
//!
//! Render spreadsheet cells containing Japanese prose and `$...$` math into
//! fixed-size PNG images.
//!
//! ## Why this crate?
//!
//! Quiz sheets are authored in a spreadsheet: one question or answer per cell,
//! with prose and inline math typed however the author found convenient
//! (`sinx`, `×`, a literal `\n` for a line break). Each cell has to become an
//! image of exactly the same size so it can be dropped into slides and
//! printouts. This crate repairs the cell text into LaTeX, typesets it with
//! `xelatex`, rasterizes it with ImageMagick or pdfium and writes one
//! `{sheet}_{COL}/{row}.png` per cell.
//!
//! ## Pipeline Overview
//!
//! ```text
//! workbook
//!  │
//!  ├─ 1. Grid      read each sheet through calamine, stop at first blank row
//!  ├─ 2. Assemble  unify line breaks, repair `$` pairs, fix math, escape prose
//!  ├─ 3. Document  wrap in a standalone class with the configured font
//!  ├─ 4. Compile   xelatex, bounded by a timeout
//!  ├─ 5. Raster    magick → convert → pdfium fallback chain, size verified
//!  └─ 6. Report    per-column attempted / succeeded / missing rows
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cell2png::{render_workbook, RenderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RenderConfig::builder().output_dir("output").build()?;
//!     let report = render_workbook("スロット.xlsx", &config, None).await?;
//!     eprintln!("{}/{} cells rendered", report.succeeded(), report.attempted());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cell2png` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! cell2png = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! `xelatex` must be on `PATH`. At least one of `magick`, `convert` or the
//! pdfium shared library (`PDFIUM_LIB_PATH` or the system library path) must
//! be available to rasterize.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod grid;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{render_workbook, run_batch, run_batch_sync};
pub use config::{
    ColumnRef, EscapeRules, FitPolicy, Geometry, PipelineProfile, RenderConfig,
    RenderConfigBuilder, SheetColumnSet,
};
pub use error::{Cell2PngError, CellError, ToolError};
pub use grid::{column_to_index, index_to_column, Grid, GridSource, XlsxWorkbook};
pub use output::{BatchReport, CellOutcome, ColumnReport, SetReport};
pub use pipeline::assemble::to_markup;
pub use pipeline::render::{
    Compiler, MagickRasterizer, PdfiumRasterizer, Rasterizer, RenderSpec, Renderer,
    XelatexCompiler,
};
pub use progress::{NoopProgressCallback, ProgressCallback, RenderProgressCallback};
