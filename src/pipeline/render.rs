//! Render orchestration: document body → exact-size PNG on disk.
//!
//! One [`Renderer::render`] call owns a fresh temporary directory, writes
//! `cell.tex` into it, compiles it to PDF and then tries each rasterizer in
//! order until one produces a PNG of exactly the requested size. Only a
//! verified PNG is copied to the output path, so a failed backend never
//! leaves a partial file behind. The directory is removed when the call
//! returns, on every path.
//!
//! ## Why traits for the backends?
//!
//! `xelatex`, ImageMagick and pdfium are all optional on a given machine.
//! [`Compiler`] and [`Rasterizer`] let the fallback chain be assembled at
//! runtime and let tests swap in fakes that never spawn a process.
//!
//! ## Why spawn_blocking for pdfium?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy rendering.
//! Running it on the blocking pool keeps the Tokio workers free, the same way
//! external tools are awaited instead of blocked on.

use crate::config::{FitPolicy, Geometry, RenderConfig};
use crate::error::{CellError, ToolError};
use crate::pipeline::{document, fit};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Environment variable naming the pdfium shared library (file or directory).
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// Number of compiler log lines carried in a compile failure.
const LOG_TAIL_LINES: usize = 15;

/// Everything needed to render one cell.
#[derive(Debug, Clone, Copy)]
pub struct RenderSpec<'a> {
    /// 1-based spreadsheet row, used in errors and logs.
    pub row: usize,
    /// Document body produced by [`crate::pipeline::assemble::to_markup`].
    pub body: &'a str,
    pub geometry: Geometry,
    pub fit: FitPolicy,
    pub font: &'a str,
    pub font_size: Option<&'a str>,
}

impl RenderSpec<'_> {
    /// Full LaTeX source for this cell.
    pub fn document(&self) -> String {
        document::standalone(self.body, self.font, self.font_size)
    }
}

// ── Backend traits ───────────────────────────────────────────────────────────

/// Turns a `.tex` file into a PDF.
#[async_trait]
pub trait Compiler: Send + Sync {
    fn name(&self) -> &str;

    /// Compile `tex` into `out_dir` and return the PDF path.
    async fn compile(&self, tex: &Path, out_dir: &Path) -> Result<PathBuf, ToolError>;
}

/// Turns the first page of a PDF into a PNG of exactly `geometry` pixels.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    fn name(&self) -> &str;

    async fn rasterize(
        &self,
        pdf: &Path,
        png: &Path,
        geometry: Geometry,
        fit: FitPolicy,
    ) -> Result<(), ToolError>;
}

// ── Renderer ─────────────────────────────────────────────────────────────────

/// A compiler plus an ordered rasterizer fallback chain.
#[derive(Clone)]
pub struct Renderer {
    compiler: Arc<dyn Compiler>,
    rasterizers: Vec<Arc<dyn Rasterizer>>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("compiler", &self.compiler.name())
            .field(
                "rasterizers",
                &self.rasterizers.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Renderer {
    pub fn new(compiler: Arc<dyn Compiler>, rasterizers: Vec<Arc<dyn Rasterizer>>) -> Self {
        Self {
            compiler,
            rasterizers,
        }
    }

    /// The standard toolchain for `config`.
    ///
    /// The extent policy prefers ImageMagick (`magick`, then `convert`) and
    /// falls back to pdfium; the scale policy prefers pdfium and falls back to
    /// ImageMagick.
    pub fn from_config(config: &RenderConfig) -> Self {
        let timeout = Duration::from_secs(config.tool_timeout_secs);
        let magick: Arc<dyn Rasterizer> = Arc::new(MagickRasterizer::new("magick", timeout));
        let convert: Arc<dyn Rasterizer> = Arc::new(MagickRasterizer::new("convert", timeout));
        let pdfium: Arc<dyn Rasterizer> = Arc::new(PdfiumRasterizer::from_env());

        let rasterizers = match config.fit {
            FitPolicy::Extent { .. } => vec![magick, convert, pdfium],
            FitPolicy::Scale => vec![pdfium, magick, convert],
        };
        Self::new(Arc::new(XelatexCompiler::new(timeout)), rasterizers)
    }

    /// Names of the rasterizers, in the order they are tried.
    pub fn rasterizer_names(&self) -> Vec<&str> {
        self.rasterizers.iter().map(|r| r.name()).collect()
    }

    /// Render one cell to `output`.
    pub async fn render(&self, spec: &RenderSpec<'_>, output: &Path) -> Result<(), CellError> {
        let row = spec.row;
        let io_err = |detail: String| CellError::Io { row, detail };

        let workdir = tempfile::Builder::new()
            .prefix("cell2png-")
            .tempdir()
            .map_err(|e| io_err(format!("temp dir: {e}")))?;
        let tex = workdir.path().join("cell.tex");
        tokio::fs::write(&tex, spec.document())
            .await
            .map_err(|e| io_err(format!("write {}: {e}", tex.display())))?;

        debug!("Row {}: compiling with {}", row, self.compiler.name());
        let pdf = self
            .compiler
            .compile(&tex, workdir.path())
            .await
            .map_err(|e| CellError::Compile {
                row,
                detail: e.to_string(),
            })?;

        let mut attempts = Vec::new();
        for (i, rasterizer) in self.rasterizers.iter().enumerate() {
            let staged = workdir.path().join(format!("raster-{i}.png"));
            debug!("Row {}: rasterizing with {}", row, rasterizer.name());

            let result = rasterizer
                .rasterize(&pdf, &staged, spec.geometry, spec.fit)
                .await
                .and_then(|()| verify_dimensions(rasterizer.name(), &staged, spec.geometry));
            match result {
                Ok(()) => {
                    tokio::fs::copy(&staged, output)
                        .await
                        .map_err(|e| io_err(format!("copy to {}: {e}", output.display())))?;
                    debug!("Row {}: wrote {}", row, output.display());
                    return Ok(());
                }
                Err(e) => {
                    warn!("Row {}: {}", row, e);
                    attempts.push(e.to_string());
                }
            }
        }

        Err(CellError::Rasterize { row, attempts })
    }
}

fn verify_dimensions(tool: &str, png: &Path, geometry: Geometry) -> Result<(), ToolError> {
    let bad = |detail: String| ToolError::BadOutput {
        tool: tool.to_string(),
        detail,
    };
    let (w, h) = image::image_dimensions(png).map_err(|e| bad(e.to_string()))?;
    if (w, h) != (geometry.width, geometry.height) {
        return Err(bad(format!(
            "got {w}x{h}, expected {}x{}",
            geometry.width, geometry.height
        )));
    }
    Ok(())
}

// ── External processes ───────────────────────────────────────────────────────

/// Run `program` with `args`, killing it once `timeout` expires.
async fn run_tool(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<std::process::Output, ToolError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn().map_err(|e| ToolError::NotAvailable {
        tool: program.to_string(),
        detail: e.to_string(),
    })?;

    // Dropping the future on expiry drops the child, which kills it.
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ToolError::TimedOut {
            tool: program.to_string(),
            secs: timeout.as_secs(),
        })?
        .map_err(|e| ToolError::Failed {
            tool: program.to_string(),
            code: "io error".to_string(),
            diagnostic: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: program.to_string(),
            code: output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
            diagnostic: tail(&String::from_utf8_lossy(&output.stderr), LOG_TAIL_LINES),
        });
    }
    Ok(output)
}

/// The last `n` non-empty lines of `text`, joined with newlines.
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

// ── xelatex ──────────────────────────────────────────────────────────────────

/// `xelatex` in non-interactive mode, stopping at the first error.
#[derive(Debug, Clone)]
pub struct XelatexCompiler {
    program: String,
    timeout: Duration,
}

impl XelatexCompiler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "xelatex".to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl Compiler for XelatexCompiler {
    fn name(&self) -> &str {
        &self.program
    }

    async fn compile(&self, tex: &Path, out_dir: &Path) -> Result<PathBuf, ToolError> {
        let args = vec![
            "-interaction=nonstopmode".to_string(),
            "-halt-on-error".to_string(),
            "-output-directory".to_string(),
            out_dir.display().to_string(),
            tex.display().to_string(),
        ];

        let log = tex.with_extension("log");
        match run_tool(&self.program, &args, Some(out_dir), self.timeout).await {
            Ok(_) => {}
            // xelatex reports errors on stdout and in the log, not on stderr.
            Err(ToolError::Failed { tool, code, .. }) => {
                let log_text = tokio::fs::read_to_string(&log).await.unwrap_or_default();
                return Err(ToolError::Failed {
                    tool,
                    code,
                    diagnostic: latex_diagnostic(&log_text),
                });
            }
            Err(e) => return Err(e),
        }

        let pdf = tex.with_extension("pdf");
        if !pdf.exists() {
            return Err(ToolError::BadOutput {
                tool: self.program.clone(),
                detail: format!("no PDF produced at {}", pdf.display()),
            });
        }
        Ok(pdf)
    }
}

/// The first `!` error line of a LaTeX log and what follows it, or the log's
/// tail when there is none.
fn latex_diagnostic(log: &str) -> String {
    let lines: Vec<&str> = log.lines().collect();
    match lines.iter().position(|l| l.starts_with('!')) {
        Some(i) => lines[i..]
            .iter()
            .take(LOG_TAIL_LINES)
            .copied()
            .collect::<Vec<_>>()
            .join("\n"),
        None => tail(log, LOG_TAIL_LINES),
    }
}

// ── ImageMagick ──────────────────────────────────────────────────────────────

/// ImageMagick, invoked as `magick` (v7) or `convert` (v6).
#[derive(Debug, Clone)]
pub struct MagickRasterizer {
    program: String,
    timeout: Duration,
}

impl MagickRasterizer {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Command-line arguments for one conversion.
    pub fn args(pdf: &Path, png: &Path, geometry: Geometry, fit: FitPolicy) -> Vec<String> {
        let size = format!("{}x{}", geometry.width, geometry.height);
        let mut args: Vec<String> = vec![
            "-density".into(),
            geometry.dpi.to_string(),
            "-colorspace".into(),
            "RGB".into(),
            "-background".into(),
            "white".into(),
            "-alpha".into(),
            "remove".into(),
            "-alpha".into(),
            "off".into(),
            pdf.display().to_string(),
            "-quality".into(),
            "100".into(),
        ];

        match fit {
            FitPolicy::Extent { border } => args.extend([
                "-trim".into(),
                "+repage".into(),
                "-bordercolor".into(),
                "white".into(),
                "-border".into(),
                border.to_string(),
            ]),
            // `>` only ever shrinks.
            FitPolicy::Scale => args.extend(["-resize".into(), format!("{size}>")]),
        }
        args.extend([
            "-gravity".into(),
            "center".into(),
            "-extent".into(),
            size,
            png.display().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl Rasterizer for MagickRasterizer {
    fn name(&self) -> &str {
        &self.program
    }

    async fn rasterize(
        &self,
        pdf: &Path,
        png: &Path,
        geometry: Geometry,
        fit: FitPolicy,
    ) -> Result<(), ToolError> {
        let args = Self::args(pdf, png, geometry, fit);
        run_tool(&self.program, &args, None, self.timeout).await?;
        Ok(())
    }
}

// ── pdfium ───────────────────────────────────────────────────────────────────

/// In-process rasterizer using pdfium, fitted with [`fit::fit`].
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Bind to the library named by `PDFIUM_LIB_PATH`, else the system one.
    pub fn from_env() -> Self {
        Self {
            library: std::env::var_os(PDFIUM_LIB_ENV).map(PathBuf::from),
        }
    }

    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library: Some(path.into()),
        }
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    fn name(&self) -> &str {
        "pdfium"
    }

    async fn rasterize(
        &self,
        pdf: &Path,
        png: &Path,
        geometry: Geometry,
        fit: FitPolicy,
    ) -> Result<(), ToolError> {
        let library = self.library.clone();
        let pdf = pdf.to_path_buf();
        let png = png.to_path_buf();

        tokio::task::spawn_blocking(move || {
            rasterize_blocking(library.as_deref(), &pdf, &png, geometry, fit)
        })
        .await
        .map_err(|e| ToolError::Failed {
            tool: "pdfium".to_string(),
            code: "panic".to_string(),
            diagnostic: e.to_string(),
        })?
    }
}

fn rasterize_blocking(
    library: Option<&Path>,
    pdf: &Path,
    png: &Path,
    geometry: Geometry,
    fit_policy: FitPolicy,
) -> Result<(), ToolError> {
    let failed = |detail: String| ToolError::Failed {
        tool: "pdfium".to_string(),
        code: "error".to_string(),
        diagnostic: detail,
    };

    let bindings = match library {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ToolError::NotAvailable {
        tool: "pdfium".to_string(),
        detail: format!("{:?}", e),
    })?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_file(pdf, None)
        .map_err(|e| failed(format!("load {}: {:?}", pdf.display(), e)))?;
    let page = document
        .pages()
        .get(0)
        .map_err(|e| failed(format!("page 1: {:?}", e)))?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(geometry.dpi as f32 / 72.0)
        .set_clear_color(PdfColor::WHITE);
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| failed(format!("render: {:?}", e)))?;

    let image = bitmap.as_image();
    debug!(
        "pdfium rendered page 1 → {}x{} px at {} DPI",
        image.width(),
        image.height(),
        geometry.dpi
    );

    fit::fit(&image, fit_policy, geometry.width, geometry.height)
        .save(png)
        .map_err(|e| failed(format!("save {}: {e}", png.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magick_extent_args() {
        let args = MagickRasterizer::args(
            Path::new("/t/cell.pdf"),
            Path::new("/t/out.png"),
            Geometry::new(2000, 1600, 600),
            FitPolicy::Extent { border: 20 },
        );
        let joined = args.join(" ");
        assert_eq!(
            joined,
            "-density 600 -colorspace RGB -background white -alpha remove -alpha off \
             /t/cell.pdf -quality 100 -trim +repage -bordercolor white -border 20 \
             -gravity center -extent 2000x1600 /t/out.png"
        );
    }

    #[test]
    fn magick_scale_args_shrink_only() {
        let args = MagickRasterizer::args(
            Path::new("in.pdf"),
            Path::new("out.png"),
            Geometry::new(600, 480, 300),
            FitPolicy::Scale,
        );
        assert!(args.contains(&"600x480>".to_string()));
        assert!(!args.contains(&"-trim".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.png"));
    }

    #[test]
    fn latex_diagnostic_starts_at_error() {
        let log = "This is XeTeX\n(./cell.tex\n! Undefined control sequence.\nl.12 \\foo\n";
        let diag = latex_diagnostic(log);
        assert!(diag.starts_with("! Undefined control sequence."));
        assert!(diag.contains("l.12"));
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text = (1..=30).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let t = tail(&text, 3);
        assert_eq!(t, "28\n29\n30");
    }

    #[tokio::test]
    async fn missing_program_is_not_available() {
        let err = run_tool(
            "cell2png-no-such-tool",
            &[],
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::NotAvailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_is_killed_at_timeout() {
        let started = std::time::Instant::now();
        let err = run_tool("sleep", &["30".to_string()], None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ToolError::TimedOut { ref tool, secs: 1 } if tool == "sleep"),
            "got: {err}"
        );
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn chain_order_follows_fit_policy() {
        let extent = Renderer::from_config(&RenderConfig::default());
        assert_eq!(extent.rasterizer_names(), vec!["magick", "convert", "pdfium"]);

        let config = RenderConfig {
            fit: FitPolicy::Scale,
            ..RenderConfig::default()
        };
        let scale = Renderer::from_config(&config);
        assert_eq!(scale.rasterizer_names(), vec!["pdfium", "magick", "convert"]);
    }
}
