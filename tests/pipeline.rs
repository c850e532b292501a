//! Batch integration tests with fake backends.
//!
//! The fake compiler copies the `.tex` source to the "PDF" path so the fake
//! rasterizers can decide what to do from the cell text alone. No external
//! tool is ever spawned.

use async_trait::async_trait;
use cell2png::{
    run_batch, run_batch_sync, CellError, Compiler, FitPolicy, Geometry, Grid, GridSource,
    Rasterizer, RenderConfig, RenderProgressCallback, Renderer, SheetColumnSet, ToolError,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Fakes ────────────────────────────────────────────────────────────────────

struct CopyCompiler;

#[async_trait]
impl Compiler for CopyCompiler {
    fn name(&self) -> &str {
        "copy"
    }

    async fn compile(&self, tex: &Path, out_dir: &Path) -> Result<PathBuf, ToolError> {
        let source = std::fs::read_to_string(tex).unwrap();
        if source.contains("NOCOMPILE") {
            return Err(ToolError::Failed {
                tool: "copy".into(),
                code: "1".into(),
                diagnostic: "! Undefined control sequence.".into(),
            });
        }
        let pdf = out_dir.join("cell.pdf");
        std::fs::write(&pdf, source).unwrap();
        Ok(pdf)
    }
}

/// Writes a white PNG of the requested size unless the source contains
/// `marker`.
struct FakeRaster {
    name: &'static str,
    marker: &'static str,
    /// Pixels added to the width, to simulate a tool ignoring the geometry.
    width_error: u32,
    calls: AtomicUsize,
}

impl FakeRaster {
    fn new(name: &'static str, marker: &'static str) -> Self {
        Self {
            name,
            marker,
            width_error: 0,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Rasterizer for FakeRaster {
    fn name(&self) -> &str {
        self.name
    }

    async fn rasterize(
        &self,
        pdf: &Path,
        png: &Path,
        geometry: Geometry,
        _fit: FitPolicy,
    ) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let source = std::fs::read_to_string(pdf).unwrap();
        if source.contains(self.marker) {
            return Err(ToolError::Failed {
                tool: self.name.into(),
                code: "1".into(),
                diagnostic: "no images defined".into(),
            });
        }
        image::RgbImage::from_pixel(
            geometry.width + self.width_error,
            geometry.height,
            image::Rgb([255, 255, 255]),
        )
        .save(png)
        .unwrap();
        Ok(())
    }
}

#[derive(Default)]
struct Counter {
    total: AtomicUsize,
    completes: AtomicUsize,
    errors: AtomicUsize,
    columns: AtomicUsize,
}

impl RenderProgressCallback for Counter {
    fn on_batch_start(&self, total_cells: usize) {
        self.total.store(total_cells, Ordering::SeqCst);
    }
    fn on_cell_complete(&self, _: &str, _: &str, _: usize) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
    fn on_cell_error(&self, _: &str, _: &str, _: usize, _: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_column_complete(&self, _: &str, _: &str, _: usize, _: usize) {
        self.columns.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn sheet(rows: &[&[&str]]) -> Grid {
    Grid::from_rows(
        rows.iter()
            .map(|r| {
                r.iter()
                    .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
                    .collect()
            })
            .collect(),
    )
}

fn workbook(sheets: Vec<(&str, Grid)>) -> HashMap<String, Grid> {
    sheets
        .into_iter()
        .map(|(name, grid)| (name.to_string(), grid))
        .collect()
}

fn config(out: &Path, sets: &[&str]) -> RenderConfig {
    RenderConfig::builder()
        .sets(sets.iter().map(|s| s.parse::<SheetColumnSet>().unwrap()).collect())
        .output_dir(out)
        .default_geometry(Geometry::new(800, 600, 300))
        .answer_geometry(Geometry::new(400, 300, 300))
        .build()
        .unwrap()
}

fn renderer(rasterizers: Vec<Arc<dyn Rasterizer>>) -> Renderer {
    Renderer::new(Arc::new(CopyCompiler), rasterizers)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ten_cells_two_failures() {
    let dir = tempfile::tempdir().unwrap();
    let rows: Vec<Vec<String>> = (1..=10)
        .map(|i| {
            let text = if i == 3 || i == 7 {
                format!("問{i} BROKEN $x$")
            } else {
                format!("問{i} $x^{i}$")
            };
            vec![format!("{i}"), text]
        })
        .collect();
    let row_refs: Vec<Vec<&str>> = rows
        .iter()
        .map(|r| r.iter().map(String::as_str).collect())
        .collect();
    let slices: Vec<&[&str]> = row_refs.iter().map(Vec::as_slice).collect();
    let mut source = workbook(vec![("Que_L", sheet(&slices))]);

    let cfg = config(dir.path(), &["Que_L:B:B"]);
    let r = renderer(vec![Arc::new(FakeRaster::new("fake", "BROKEN"))]);
    let report = run_batch(&mut source, &cfg, &r, None).await.unwrap();

    let column = &report.sets[0].columns[0];
    assert_eq!(column.attempted, 10);
    assert_eq!(column.succeeded, 8);
    assert_eq!(column.missing_rows, vec![3, 7]);

    let folder = dir.path().join("Que_L_B");
    for row in 1..=10 {
        let png = folder.join(format!("{row}.png"));
        if row == 3 || row == 7 {
            assert!(!png.exists(), "row {row} should have no PNG");
        } else {
            assert_eq!(image::image_dimensions(&png).unwrap(), (800, 600));
        }
    }
    assert!(report.any_rendered());
}

#[tokio::test]
async fn fallback_rasterizer_used_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = workbook(vec![("Que_C", sheet(&[&["1", "a"], &["2", "b"]]))]);
    let first = Arc::new(FakeRaster::new("always-fails", "document"));
    let second = Arc::new(FakeRaster::new("works", "NEVER"));

    let cfg = config(dir.path(), &["Que_C:B"]);
    let r = renderer(vec![
        first.clone() as Arc<dyn Rasterizer>,
        second.clone() as Arc<dyn Rasterizer>,
    ]);
    let report = run_batch(&mut source, &cfg, &r, None).await.unwrap();

    assert_eq!(report.succeeded(), 2);
    assert_eq!(first.calls.load(Ordering::SeqCst), 2);
    assert_eq!(second.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn wrong_size_counts_as_backend_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = workbook(vec![("Que_R", sheet(&[&["1", "text"]]))]);
    let sloppy = FakeRaster {
        width_error: 5,
        ..FakeRaster::new("sloppy", "NEVER")
    };

    let cfg = config(dir.path(), &["Que_R:B"]);
    let r = renderer(vec![Arc::new(sloppy)]);
    let report = run_batch(&mut source, &cfg, &r, None).await.unwrap();

    let outcome = &report.sets[0].columns[0].outcomes[0];
    match outcome.error.as_ref().unwrap() {
        CellError::Rasterize { row, attempts } => {
            assert_eq!(*row, 1);
            assert_eq!(attempts.len(), 1);
            assert!(attempts[0].contains("805x600"), "got: {}", attempts[0]);
        }
        other => panic!("expected rasterize error, got {other:?}"),
    }
    assert!(!dir.path().join("Que_R_B/1.png").exists());
}

#[tokio::test]
async fn compile_failure_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = workbook(vec![("Que_L", sheet(&[&["1", "ok"], &["2", "NOCOMPILE"]]))]);

    let cfg = config(dir.path(), &["Que_L:B"]);
    let r = renderer(vec![Arc::new(FakeRaster::new("fake", "NEVER"))]);
    let report = run_batch(&mut source, &cfg, &r, None).await.unwrap();

    let column = &report.sets[0].columns[0];
    assert_eq!(column.missing_rows, vec![2]);
    assert!(matches!(
        column.outcomes[1].error,
        Some(CellError::Compile { row: 2, .. })
    ));
}

#[tokio::test]
async fn missing_sheet_does_not_stop_other_sets() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = workbook(vec![("Ans", sheet(&[&["1", "", "", "x"]]))]);

    let cfg = config(dir.path(), &["Que_L:B", "Ans:D"]);
    let r = renderer(vec![Arc::new(FakeRaster::new("fake", "NEVER"))]);
    let report = run_batch(&mut source, &cfg, &r, None).await.unwrap();

    assert!(report.sets[0].error.as_deref().unwrap().contains("Que_L"));
    assert!(report.sets[0].columns.is_empty());
    assert_eq!(report.sets[1].succeeded(), 1);
    assert!(report.any_rendered());
}

#[tokio::test]
async fn answer_sheets_use_answer_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = workbook(vec![
        ("Ans", sheet(&[&["1", "答え"]])),
        ("Que_L", sheet(&[&["1", "問題"]])),
    ]);

    let cfg = config(dir.path(), &["Ans:B", "Que_L:B"]);
    let r = renderer(vec![Arc::new(FakeRaster::new("fake", "NEVER"))]);
    run_batch(&mut source, &cfg, &r, None).await.unwrap();

    let ans = image::image_dimensions(dir.path().join("Ans_B/1.png")).unwrap();
    let que = image::image_dimensions(dir.path().join("Que_L_B/1.png")).unwrap();
    assert_eq!(ans, (400, 300));
    assert_eq!(que, (800, 600));
}

#[tokio::test]
async fn column_folder_is_recreated() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("Que_L_B");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("99.png"), b"stale").unwrap();

    let mut source = workbook(vec![("Que_L", sheet(&[&["1", "x"]]))]);
    let cfg = config(dir.path(), &["Que_L:B"]);
    let r = renderer(vec![Arc::new(FakeRaster::new("fake", "NEVER"))]);
    run_batch(&mut source, &cfg, &r, None).await.unwrap();

    assert!(!stale.join("99.png").exists());
    assert!(stale.join("1.png").exists());
}

#[tokio::test]
async fn blank_cells_skipped_and_rows_stop_at_gap() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = workbook(vec![(
        "Que_L",
        sheet(&[
            &["1", "first"],
            &["2", ""],
            &["3", "third"],
            &["", ""],
            &["5", "after the gap"],
        ]),
    )]);

    let cfg = config(dir.path(), &["Que_L:B"]);
    let r = renderer(vec![Arc::new(FakeRaster::new("fake", "NEVER"))]);
    let report = run_batch(&mut source, &cfg, &r, None).await.unwrap();

    let column = &report.sets[0].columns[0];
    assert_eq!(column.attempted, 2);
    let rows: Vec<usize> = column.outcomes.iter().map(|o| o.row).collect();
    assert_eq!(rows, vec![1, 3]);
}

#[tokio::test]
async fn progress_callback_sees_every_cell() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = workbook(vec![(
        "Ans",
        sheet(&[&["1", "a", "BROKEN"], &["2", "b", "c"]]),
    )]);
    let counter = Arc::new(Counter::default());

    let cfg = config(dir.path(), &["Ans:B:C"]);
    let r = renderer(vec![Arc::new(FakeRaster::new("fake", "BROKEN"))]);
    run_batch(
        &mut source,
        &cfg,
        &r,
        Some(counter.clone() as Arc<dyn RenderProgressCallback>),
    )
        .await
        .unwrap();

    assert_eq!(counter.total.load(Ordering::SeqCst), 4);
    assert_eq!(counter.completes.load(Ordering::SeqCst), 3);
    assert_eq!(counter.errors.load(Ordering::SeqCst), 1);
    assert_eq!(counter.columns.load(Ordering::SeqCst), 2);
}

#[test]
fn sync_wrapper_runs_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = workbook(vec![("Que_L", sheet(&[&["1", "$sin x = 1$"]]))]);

    let cfg = config(dir.path(), &["Que_L:B"]);
    let r = renderer(vec![Arc::new(FakeRaster::new("fake", "NEVER"))]);
    let report = run_batch_sync(&mut source, &cfg, &r, None).unwrap();
    assert_eq!(report.succeeded(), 1);
}

#[test]
fn grid_source_lists_sheets() {
    let source = workbook(vec![("Que_R", Grid::default()), ("Ans", Grid::default())]);
    assert_eq!(source.sheet_names(), vec!["Ans", "Que_R"]);
}
