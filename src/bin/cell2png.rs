//! CLI binary for cell2png.
//!
//! A thin shim over the library crate that maps CLI flags to `RenderConfig`
//! and prints the batch report.

use anyhow::{Context, Result};
use clap::Parser;
use cell2png::{
    render_workbook, BatchReport, FitPolicy, Geometry, PipelineProfile, ProgressCallback,
    RenderConfig, RenderProgressCallback, SheetColumnSet,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar across every cell of the run, plus a
/// line per finished column and per failed cell.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until the batch knows how many cells it will render.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading workbook…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} cells  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
    }
}

impl RenderProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_cells: usize) {
        self.activate_bar(total_cells);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rendering {total_cells} cells…"))
        ));
    }

    fn on_cell_start(&self, sheet: &str, column: &str, row: usize) {
        self.bar.set_message(format!("{sheet}_{column}/{row}.png"));
    }

    fn on_cell_complete(&self, _sheet: &str, _column: &str, _row: usize) {
        self.bar.inc(1);
    }

    fn on_cell_error(&self, sheet: &str, column: &str, row: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let first_line = error.lines().next().unwrap_or_default();
        let msg: String = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {sheet}_{column} row {row:<4} {}",
            red("✗"),
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_column_complete(&self, sheet: &str, column: &str, attempted: usize, succeeded: usize) {
        let mark = if succeeded == attempted {
            green("✓")
        } else {
            cyan("⚠")
        };
        self.bar.println(format!(
            "  {mark} {:<12} {}",
            format!("{sheet}_{column}"),
            dim(&format!("{succeeded}/{attempted}"))
        ));
    }

    fn on_batch_complete(&self, attempted: usize, succeeded: usize) {
        let failed = attempted.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} cells rendered successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} cells rendered  ({} failed)",
                if failed == attempted {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&succeeded.to_string()),
                attempted,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Render the default sheets of スロット.xlsx into ./output
  cell2png

  # One workbook, explicit sets
  cell2png quiz.xlsx -o images --set Que_L:B --set Ans:D:G

  # Sets from a JSON file: [{"sheet":"Ans","start":"D","end":"G"}]
  cell2png quiz.xlsx --sets-file sets.json

  # Smaller cards, shrink-to-fit with pdfium at 300 DPI
  cell2png quiz.xlsx --fit scale --size 600x480 --answer-size 600x450

  # Older markup rules (bare single letters become math)
  cell2png quiz.xlsx --classic

  # Machine-readable report
  cell2png quiz.xlsx --json > report.json

SETS:
  SHEET:COL           one column            (Ans:I)
  SHEET:START:END     inclusive span        (Ans:D:G)
  SHEET:START:        to the last used col  (Ans:D:)
  Columns are letters (A, AA) or 0-based indices.
  Sheets whose name starts with the answer prefix ("ans", any case) use
  the answer size.

OUTPUT:
  {output}/{sheet}_{COL}/{row}.png, rows 1-based. Each column folder is
  deleted and recreated when its column is processed.

TOOLS:
  xelatex                 required
  magick / convert        ImageMagick 7 / 6
  PDFIUM_LIB_PATH         pdfium shared library (file or directory); the
                          system library is used when unset
"#;

/// Render spreadsheet cells with prose and $...$ math into fixed-size PNGs.
#[derive(Parser, Debug)]
#[command(
    name = "cell2png",
    version,
    about = "Render spreadsheet cells with prose and $...$ math into fixed-size PNGs",
    long_about = "Read sheet/column spans from a workbook, repair each cell's text into LaTeX, \
typeset it with xelatex and rasterize it to an exact-size PNG per cell.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Workbook to read (.xlsx, .xlsm, .xls, .ods).
    #[arg(env = "CELL2PNG_INPUT", default_value = "スロット.xlsx")]
    input: PathBuf,

    /// Root output directory.
    #[arg(short, long, env = "CELL2PNG_OUTPUT", default_value = "output")]
    output: PathBuf,

    /// Sheet/column span to render; repeatable. Replaces the default sets.
    #[arg(long = "set", value_name = "SHEET:START[:END]")]
    sets: Vec<SheetColumnSet>,

    /// JSON file holding an array of sets.
    #[arg(long, env = "CELL2PNG_SETS_FILE", conflicts_with = "sets")]
    sets_file: Option<PathBuf>,

    /// How the page is fitted onto the canvas.
    #[arg(long, env = "CELL2PNG_FIT", value_enum, default_value = "extent")]
    fit: FitArg,

    /// White border in pixels around trimmed content (extent fit).
    #[arg(long, env = "CELL2PNG_BORDER", default_value_t = 20)]
    border: u32,

    /// Canvas size for question sheets, WIDTHxHEIGHT.
    #[arg(long, env = "CELL2PNG_SIZE", value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Canvas size for answer sheets, WIDTHxHEIGHT.
    #[arg(long, env = "CELL2PNG_ANSWER_SIZE", value_parser = parse_size)]
    answer_size: Option<(u32, u32)>,

    /// Case-insensitive sheet-name prefix that selects the answer size.
    #[arg(long, env = "CELL2PNG_ANSWER_PREFIX", default_value = "ans")]
    answer_prefix: String,

    /// Use the older markup rules (basic escapes, bare-variable wrapping).
    #[arg(long, env = "CELL2PNG_CLASSIC")]
    classic: bool,

    /// Main document font.
    #[arg(long, env = "CELL2PNG_FONT")]
    font: Option<String>,

    /// Document class font size option, e.g. 12pt.
    #[arg(long, env = "CELL2PNG_FONT_SIZE")]
    font_size: Option<String>,

    /// Rasterisation DPI (72–1200). Default: 600, or 300 with --fit scale.
    #[arg(long, env = "CELL2PNG_DPI",
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    dpi: Option<u32>,

    /// Budget per external tool invocation, in seconds.
    #[arg(long, env = "CELL2PNG_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "CELL2PNG_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "CELL2PNG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CELL2PNG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CELL2PNG_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FitArg {
    Extent,
    Scale,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .to_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w: u32 = w.parse().map_err(|_| format!("invalid width '{w}'"))?;
    let h: u32 = h.parse().map_err(|_| format!("invalid height '{h}'"))?;
    if w == 0 || h == 0 {
        return Err("width and height must be non-zero".to_string());
    }
    Ok((w, h))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level column summaries when active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli).await?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn RenderProgressCallback>)
    } else {
        None
    };

    // ── Run batch ────────────────────────────────────────────────────────
    let report = render_workbook(&cli.input, &config, progress_cb)
        .await
        .with_context(|| format!("Failed to render {}", cli.input.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report, &config.output_dir);
    }

    if !report.any_rendered() {
        std::process::exit(1);
    }
    Ok(())
}

/// Map CLI args to `RenderConfig`.
async fn build_config(cli: &Cli) -> Result<RenderConfig> {
    let sets = if let Some(ref path) = cli.sets_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read sets from {:?}", path))?;
        serde_json::from_str::<Vec<SheetColumnSet>>(&text)
            .with_context(|| format!("Invalid sets file {:?}", path))?
    } else if cli.sets.is_empty() {
        SheetColumnSet::default_sets()
    } else {
        cli.sets.clone()
    };

    let fit = match cli.fit {
        FitArg::Extent => FitPolicy::Extent { border: cli.border },
        FitArg::Scale => FitPolicy::Scale,
    };
    let dpi = cli.dpi.unwrap_or(match fit {
        FitPolicy::Scale => 300,
        FitPolicy::Extent { .. } => 600,
    });
    let defaults = RenderConfig::default();
    let geometry = |size: Option<(u32, u32)>, fallback: Geometry| {
        let (w, h) = size.unwrap_or((fallback.width, fallback.height));
        Geometry::new(w, h, dpi)
    };

    let mut builder = RenderConfig::builder()
        .sets(sets)
        .output_dir(&cli.output)
        .default_geometry(geometry(cli.size, defaults.default_geometry))
        .answer_geometry(geometry(cli.answer_size, defaults.answer_geometry))
        .answer_prefix(&cli.answer_prefix)
        .fit(fit)
        .tool_timeout_secs(cli.timeout)
        .profile(if cli.classic {
            PipelineProfile::classic()
        } else {
            PipelineProfile::standard()
        });

    if let Some(ref font) = cli.font {
        builder = builder.font(font);
    }
    if let Some(ref size) = cli.font_size {
        builder = builder.font_size(size);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(report: &BatchReport, output_dir: &Path) {
    for set in &report.sets {
        if let Some(ref err) = set.error {
            eprintln!("{} {}  {}", red("✘"), bold(&set.set.to_string()), red(err));
            continue;
        }
        for column in &set.columns {
            if column.is_complete() {
                continue;
            }
            eprintln!(
                "{} {}_{}  missing rows {:?}",
                cyan("⚠"),
                column.sheet,
                column.column,
                column.missing_rows
            );
        }
    }
    eprintln!(
        "{}  {}/{} cells  {}ms  →  {}",
        if report.succeeded() == report.attempted() {
            green("✔")
        } else {
            cyan("⚠")
        },
        report.succeeded(),
        report.attempted(),
        report.duration_ms,
        bold(&output_dir.display().to_string()),
    );
}
