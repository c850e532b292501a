//! Configuration types for a cell-rendering run.
//!
//! Everything a run needs is held in one [`RenderConfig`], built via its
//! [`RenderConfigBuilder`] and validated once in `build()`. Nothing is read
//! from module-level state, so two runs with different geometries or sheet
//! lists can coexist in one process.

use crate::error::Cell2PngError;
use crate::grid::column_to_index;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default main font, a Mincho face suited to Japanese quiz text.
pub const DEFAULT_FONT: &str = "Hiragino Mincho ProN";

/// Configuration for a batch run.
///
/// # Example
/// ```rust
/// use cell2png::{RenderConfig, SheetColumnSet};
///
/// let config = RenderConfig::builder()
///     .sets(vec!["Que_L:B:B".parse::<SheetColumnSet>().unwrap()])
///     .output_dir("out")
///     .build()
///     .unwrap();
/// assert_eq!(config.geometry_for("Que_L").width, 2000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Which sheets and column spans to render, processed in order.
    pub sets: Vec<SheetColumnSet>,

    /// Geometry for every sheet that is not an answer sheet. Default: 2000×1600 @ 600 DPI.
    pub default_geometry: Geometry,

    /// Geometry for answer sheets. Default: 1250×1000 @ 600 DPI.
    pub answer_geometry: Geometry,

    /// Case-insensitive sheet-name prefix selecting [`RenderConfig::answer_geometry`]. Default: "ans".
    pub answer_prefix: String,

    /// Root directory receiving one `{sheet}_{column}` folder per column. Default: "output".
    pub output_dir: PathBuf,

    /// Markup rules applied to each cell.
    pub profile: PipelineProfile,

    /// Main document font passed to `\setmainfont`.
    pub font: String,

    /// Optional class option such as `"14pt"` appended to the standalone options.
    pub font_size: Option<String>,

    /// How the rasterised page is fitted onto the target canvas.
    pub fit: FitPolicy,

    /// Budget for each external process invocation, in seconds. Default: 120.
    pub tool_timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sets: SheetColumnSet::default_sets(),
            default_geometry: Geometry::new(2000, 1600, 600),
            answer_geometry: Geometry::new(1250, 1000, 600),
            answer_prefix: "ans".to_string(),
            output_dir: PathBuf::from("output"),
            profile: PipelineProfile::standard(),
            font: DEFAULT_FONT.to_string(),
            font_size: None,
            fit: FitPolicy::default(),
            tool_timeout_secs: 120,
        }
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether `sheet` is an answer sheet (case-insensitive prefix match).
    pub fn is_answer_sheet(&self, sheet: &str) -> bool {
        sheet
            .to_lowercase()
            .starts_with(&self.answer_prefix.to_lowercase())
    }

    /// Geometry profile selected for `sheet`.
    pub fn geometry_for(&self, sheet: &str) -> Geometry {
        if self.is_answer_sheet(sheet) {
            self.answer_geometry
        } else {
            self.default_geometry
        }
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn sets(mut self, sets: Vec<SheetColumnSet>) -> Self {
        self.config.sets = sets;
        self
    }

    pub fn default_geometry(mut self, geometry: Geometry) -> Self {
        self.config.default_geometry = geometry;
        self
    }

    pub fn answer_geometry(mut self, geometry: Geometry) -> Self {
        self.config.answer_geometry = geometry;
        self
    }

    /// Override the rasterisation DPI of both geometry profiles.
    pub fn dpi(mut self, dpi: u32) -> Self {
        let dpi = dpi.clamp(72, 1200);
        self.config.default_geometry.dpi = dpi;
        self.config.answer_geometry.dpi = dpi;
        self
    }

    pub fn answer_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.answer_prefix = prefix.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn profile(mut self, profile: PipelineProfile) -> Self {
        self.config.profile = profile;
        self
    }

    pub fn font(mut self, font: impl Into<String>) -> Self {
        self.config.font = font.into();
        self
    }

    pub fn font_size(mut self, size: impl Into<String>) -> Self {
        self.config.font_size = Some(size.into());
        self
    }

    pub fn fit(mut self, fit: FitPolicy) -> Self {
        self.config.fit = fit;
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tool_timeout_secs = secs.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, Cell2PngError> {
        let c = &self.config;
        if c.sets.is_empty() {
            return Err(Cell2PngError::InvalidConfig(
                "at least one sheet/column set is required".into(),
            ));
        }
        for (i, set) in c.sets.iter().enumerate() {
            set.validate()
                .map_err(|e| Cell2PngError::InvalidConfig(format!("set {}: {}", i + 1, e)))?;
        }
        for (name, g) in [("default", c.default_geometry), ("answer", c.answer_geometry)] {
            if g.width == 0 || g.height == 0 {
                return Err(Cell2PngError::InvalidConfig(format!(
                    "{name} geometry must be non-zero, got {}x{}",
                    g.width, g.height
                )));
            }
        }
        if c.font.trim().is_empty() {
            return Err(Cell2PngError::InvalidConfig("font must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Geometry ─────────────────────────────────────────────────────────────

/// Target pixel size plus rasterisation resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

impl Geometry {
    pub const fn new(width: u32, height: u32, dpi: u32) -> Self {
        Self { width, height, dpi }
    }
}

// ── Sheet / column sets ──────────────────────────────────────────────────

/// A column given either as a spreadsheet label (`"B"`, `"AA"`) or a 0-based index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Label(String),
}

impl ColumnRef {
    /// Resolve to a 0-based column index.
    pub fn index(&self) -> Result<usize, Cell2PngError> {
        match self {
            ColumnRef::Index(i) => Ok(*i),
            ColumnRef::Label(label) => column_to_index(label),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(label: &str) -> Self {
        ColumnRef::Label(label.to_string())
    }
}

impl From<usize> for ColumnRef {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Index(i) => write!(f, "{i}"),
            ColumnRef::Label(l) => write!(f, "{l}"),
        }
    }
}

/// One `(sheet, start column, end column)` entry of a run.
///
/// `end = None` means "through the last populated column".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetColumnSet {
    pub sheet: String,
    pub start: ColumnRef,
    #[serde(default)]
    pub end: Option<ColumnRef>,
}

impl SheetColumnSet {
    pub fn new(sheet: impl Into<String>, start: impl Into<ColumnRef>, end: Option<ColumnRef>) -> Self {
        Self {
            sheet: sheet.into(),
            start: start.into(),
            end,
        }
    }

    /// The five sets used by the quiz workbooks this tool was written for.
    pub fn default_sets() -> Vec<SheetColumnSet> {
        vec![
            SheetColumnSet::new("Que_L", "B", Some("B".into())),
            SheetColumnSet::new("Que_C", "B", Some("B".into())),
            SheetColumnSet::new("Que_R", "B", Some("B".into())),
            SheetColumnSet::new("Ans", "D", Some("G".into())),
            SheetColumnSet::new("Ans", "I", Some("I".into())),
        ]
    }

    fn validate(&self) -> Result<(), String> {
        if self.sheet.trim().is_empty() {
            return Err("sheet name is empty".into());
        }
        let start = self.start.index().map_err(|e| e.to_string())?;
        if let Some(end) = &self.end {
            let end = end.index().map_err(|e| e.to_string())?;
            if start > end {
                return Err(format!(
                    "start column ({}) is after end column ({})",
                    self.start,
                    end_label(&self.end)
                ));
            }
        }
        Ok(())
    }
}

fn end_label(end: &Option<ColumnRef>) -> String {
    end.as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "last".into())
}

impl fmt::Display for SheetColumnSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.sheet, self.start, end_label(&self.end))
    }
}

/// Parses `sheet:start[:end]`.
///
/// `sheet:B` is the single column B; `sheet:B:` and `sheet:B:*` run to the
/// last populated column. Numeric columns are 0-based indices.
impl FromStr for SheetColumnSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let column = |p: &str| -> ColumnRef {
            match p.trim().parse::<usize>() {
                Ok(i) => ColumnRef::Index(i),
                Err(_) => ColumnRef::Label(p.trim().to_string()),
            }
        };
        let set = match parts.as_slice() {
            [sheet, start] => SheetColumnSet::new(*sheet, column(start), Some(column(start))),
            [sheet, start, end] => {
                let end = match end.trim() {
                    "" | "*" => None,
                    e => Some(column(e)),
                };
                SheetColumnSet::new(*sheet, column(start), end)
            }
            _ => return Err(format!("expected SHEET:START[:END], got '{s}'")),
        };
        set.validate()?;
        Ok(set)
    }
}

// ── Pipeline profile ─────────────────────────────────────────────────────

/// Which backslash commands prose may keep unescaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EscapeRules {
    /// Functions and Greek letters only.
    Basic,
    /// Functions, Greek letters, relations, arrows, set symbols, spacing and
    /// style commands. (default)
    #[default]
    Extended,
}

/// Knobs that distinguish the markup pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineProfile {
    pub escape_rules: EscapeRules,

    /// Wrap single Latin letters standing alone in prose as inline math.
    pub wrap_bare_variables: bool,
}

impl PipelineProfile {
    /// The current rules: extended allow-list, prose left as written.
    pub const fn standard() -> Self {
        Self {
            escape_rules: EscapeRules::Extended,
            wrap_bare_variables: false,
        }
    }

    /// The older rules: basic allow-list, bare variables promoted to math.
    pub const fn classic() -> Self {
        Self {
            escape_rules: EscapeRules::Basic,
            wrap_bare_variables: true,
        }
    }
}

impl Default for PipelineProfile {
    fn default() -> Self {
        Self::standard()
    }
}

// ── Fit policy ───────────────────────────────────────────────────────────

/// How a rasterised page becomes an exact `width × height` canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitPolicy {
    /// Trim surrounding white, pad with `border` white pixels, then center on
    /// the canvas (cropping content larger than the canvas). (default)
    Extent { border: u32 },
    /// Shrink uniformly to fit (never enlarge) and paste centered on white.
    Scale,
}

impl Default for FitPolicy {
    fn default() -> Self {
        FitPolicy::Extent { border: 20 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_prefix_is_case_insensitive() {
        let config = RenderConfig::default();
        assert!(config.is_answer_sheet("Ans"));
        assert!(config.is_answer_sheet("answers"));
        assert!(config.is_answer_sheet("ANSWERS_2"));
        assert!(!config.is_answer_sheet("Que_L"));
        assert_eq!(config.geometry_for("Ans"), config.answer_geometry);
        assert_eq!(config.geometry_for("Que_L"), config.default_geometry);
    }

    #[test]
    fn parse_set_forms() {
        let single: SheetColumnSet = "Ans:I".parse().unwrap();
        assert_eq!(single.start, ColumnRef::Label("I".into()));
        assert_eq!(single.end, Some(ColumnRef::Label("I".into())));

        let open: SheetColumnSet = "Ans:D:".parse().unwrap();
        assert_eq!(open.end, None);

        let star: SheetColumnSet = "Ans:D:*".parse().unwrap();
        assert_eq!(star.end, None);

        let numeric: SheetColumnSet = "Que_L:1:3".parse().unwrap();
        assert_eq!(numeric.start, ColumnRef::Index(1));
        assert_eq!(numeric.end, Some(ColumnRef::Index(3)));
    }

    #[test]
    fn parse_set_rejects_bad_input() {
        assert!("Ans".parse::<SheetColumnSet>().is_err());
        assert!("Ans:G:D".parse::<SheetColumnSet>().is_err());
        assert!(":B:B".parse::<SheetColumnSet>().is_err());
        assert!("Ans:B1:C".parse::<SheetColumnSet>().is_err());
    }

    #[test]
    fn build_validates_sets() {
        let err = RenderConfig::builder().sets(vec![]).build().unwrap_err();
        assert!(err.to_string().contains("at least one"));

        let err = RenderConfig::builder()
            .sets(vec![SheetColumnSet::new("Ans", "G", Some("D".into()))])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("set 1"), "got: {err}");
    }

    #[test]
    fn build_rejects_zero_geometry() {
        let err = RenderConfig::builder()
            .default_geometry(Geometry::new(0, 600, 300))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("default geometry"));
    }

    #[test]
    fn dpi_override_applies_to_both_profiles() {
        let config = RenderConfig::builder().dpi(300).build().unwrap();
        assert_eq!(config.default_geometry.dpi, 300);
        assert_eq!(config.answer_geometry.dpi, 300);
    }

    #[test]
    fn sets_deserialize_from_json() {
        let json = r#"[{"sheet":"Ans","start":"D","end":"G"},{"sheet":"Que_L","start":1}]"#;
        let sets: Vec<SheetColumnSet> = serde_json::from_str(json).unwrap();
        assert_eq!(sets[0].end, Some(ColumnRef::Label("G".into())));
        assert_eq!(sets[1].start, ColumnRef::Index(1));
        assert_eq!(sets[1].end, None);
    }
}
