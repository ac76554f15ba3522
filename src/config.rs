//! Configuration types for Markdown-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Tool locations, print layout, diagram
//! rendering and subprocess limits all live here so a single value describes
//! one run completely and can be shared across threads.

use crate::error::Md2PdfError;
use crate::process::ToolRunner;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tool_locate::ToolSpec;

/// Configuration for a Markdown-to-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_md2pdf::{ConversionConfig, DiagramFormat, PageSize};
///
/// let config = ConversionConfig::builder()
///     .diagram_format(DiagramFormat::Png)
///     .page_size(PageSize::Letter)
///     .margin_mm(20.0)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Image format produced for each Mermaid block. Default: SVG.
    ///
    /// SVG stays crisp at any zoom level; PNG is the safer choice when the
    /// diagram uses web fonts that Chrome cannot resolve at print time.
    pub diagram_format: DiagramFormat,

    /// How Pandoc renders TeX math in the HTML. Default: MathJax.
    pub math: MathEngine,

    /// Paper size written into the print stylesheet. Default: A4.
    pub page_size: PageSize,

    /// Page margin in millimetres, all four sides. Range: 0–50. Default: 15.
    pub margin_mm: f32,

    /// Extra stylesheet linked into the HTML after the built-in print rules.
    pub stylesheet: Option<PathBuf>,

    /// Explicit browser executable. Overrides `CHROME_PATH` and discovery.
    pub chrome_path: Option<PathBuf>,

    /// Explicit Pandoc executable. Overrides `PANDOC_PATH` and discovery.
    pub pandoc_path: Option<PathBuf>,

    /// Explicit Mermaid CLI executable. Overrides `MMDC_PATH` and discovery.
    pub mmdc_path: Option<PathBuf>,

    /// Discovery rules for each tool when no explicit path is given.
    pub tools: ToolLocations,

    /// Pass `--no-sandbox` to Chrome (and to the Chromium that `mmdc` drives).
    /// Required when running as root inside most containers. Default: false.
    pub browser_no_sandbox: bool,

    /// Virtual time Chrome grants the page before printing, in milliseconds.
    /// Default: 5000.
    ///
    /// MathJax typesets asynchronously after `load`; without a budget Chrome
    /// may print raw `$…$` source.
    pub virtual_time_budget_ms: u64,

    /// Mermaid canvas width in pixels. Default: 800.
    pub diagram_width: u32,

    /// Mermaid canvas height in pixels. Default: 600.
    pub diagram_height: u32,

    /// Mermaid background colour (`transparent`, `white`, `#f0f0f0`, …).
    /// Default: `transparent`.
    pub diagram_background: String,

    /// Wall-clock limit for each external tool invocation, in seconds.
    /// `0` disables the limit. Default: 300.
    pub tool_timeout_secs: u64,

    /// How the output path is derived when the caller does not give one.
    pub output_naming: OutputNaming,

    /// Split inline numbered lists ("steps: 1. a 2. b") onto separate lines
    /// before conversion. Only touches text outside fenced blocks. Default: false.
    pub normalize_lists: bool,

    /// Remove the `**Author**:` / `**Email**:` lines from the body once they
    /// have been captured as metadata. Default: true.
    pub strip_metadata_lines: bool,

    /// Keep the per-run work directory instead of deleting it. Default: false.
    pub keep_work_dir: bool,

    /// Subprocess runner. `None` uses [`crate::process::SystemRunner`].
    pub runner: Option<Arc<dyn ToolRunner>>,

    /// Receives stage and per-diagram progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            diagram_format: DiagramFormat::default(),
            math: MathEngine::default(),
            page_size: PageSize::default(),
            margin_mm: 15.0,
            stylesheet: None,
            chrome_path: None,
            pandoc_path: None,
            mmdc_path: None,
            tools: ToolLocations::default(),
            browser_no_sandbox: false,
            virtual_time_budget_ms: 5000,
            diagram_width: 800,
            diagram_height: 600,
            diagram_background: "transparent".to_string(),
            tool_timeout_secs: 300,
            output_naming: OutputNaming::default(),
            normalize_lists: false,
            strip_metadata_lines: true,
            keep_work_dir: false,
            runner: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("diagram_format", &self.diagram_format)
            .field("math", &self.math)
            .field("page_size", &self.page_size)
            .field("margin_mm", &self.margin_mm)
            .field("stylesheet", &self.stylesheet)
            .field("chrome_path", &self.chrome_path)
            .field("pandoc_path", &self.pandoc_path)
            .field("mmdc_path", &self.mmdc_path)
            .field("browser_no_sandbox", &self.browser_no_sandbox)
            .field("virtual_time_budget_ms", &self.virtual_time_budget_ms)
            .field("diagram_width", &self.diagram_width)
            .field("diagram_height", &self.diagram_height)
            .field("diagram_background", &self.diagram_background)
            .field("tool_timeout_secs", &self.tool_timeout_secs)
            .field("output_naming", &self.output_naming)
            .field("normalize_lists", &self.normalize_lists)
            .field("strip_metadata_lines", &self.strip_metadata_lines)
            .field("keep_work_dir", &self.keep_work_dir)
            .field("runner", &self.runner.as_ref().map(|_| "<dyn ToolRunner>"))
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Per-invocation wait limit, `None` when disabled.
    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_secs > 0).then(|| Duration::from_secs(self.tool_timeout_secs))
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn diagram_format(mut self, format: DiagramFormat) -> Self {
        self.config.diagram_format = format;
        self
    }

    pub fn math(mut self, engine: MathEngine) -> Self {
        self.config.math = engine;
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn margin_mm(mut self, mm: f32) -> Self {
        self.config.margin_mm = if mm.is_finite() { mm.clamp(0.0, 50.0) } else { 15.0 };
        self
    }

    pub fn stylesheet(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.stylesheet = Some(path.into());
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn pandoc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pandoc_path = Some(path.into());
        self
    }

    pub fn mmdc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.mmdc_path = Some(path.into());
        self
    }

    pub fn tools(mut self, tools: ToolLocations) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn browser_no_sandbox(mut self, v: bool) -> Self {
        self.config.browser_no_sandbox = v;
        self
    }

    pub fn virtual_time_budget_ms(mut self, ms: u64) -> Self {
        self.config.virtual_time_budget_ms = ms;
        self
    }

    pub fn diagram_size(mut self, width: u32, height: u32) -> Self {
        self.config.diagram_width = width.clamp(100, 8000);
        self.config.diagram_height = height.clamp(100, 8000);
        self
    }

    pub fn diagram_background(mut self, colour: impl Into<String>) -> Self {
        self.config.diagram_background = colour.into();
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tool_timeout_secs = secs;
        self
    }

    pub fn output_naming(mut self, naming: OutputNaming) -> Self {
        self.config.output_naming = naming;
        self
    }

    pub fn normalize_lists(mut self, v: bool) -> Self {
        self.config.normalize_lists = v;
        self
    }

    pub fn strip_metadata_lines(mut self, v: bool) -> Self {
        self.config.strip_metadata_lines = v;
        self
    }

    pub fn keep_work_dir(mut self, v: bool) -> Self {
        self.config.keep_work_dir = v;
        self
    }

    pub fn runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.config.runner = Some(runner);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Md2PdfError> {
        let c = &self.config;
        if !(0.0..=50.0).contains(&c.margin_mm) {
            return Err(Md2PdfError::InvalidConfig(format!(
                "Margin must be 0–50 mm, got {}",
                c.margin_mm
            )));
        }
        if c.diagram_width == 0 || c.diagram_height == 0 {
            return Err(Md2PdfError::InvalidConfig(
                "Diagram width and height must be ≥ 1".into(),
            ));
        }
        if c.diagram_background.trim().is_empty() {
            return Err(Md2PdfError::InvalidConfig(
                "Diagram background must not be empty (use \"transparent\")".into(),
            ));
        }
        if let Some(ref css) = c.stylesheet {
            if !css.is_file() {
                return Err(Md2PdfError::InvalidConfig(format!(
                    "Stylesheet '{}' does not exist",
                    css.display()
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Tool discovery ───────────────────────────────────────────────────────

/// Discovery rules for the three external tools.
///
/// The defaults search the usual install locations and `$PATH`; tests replace
/// them to isolate themselves from whatever happens to be installed.
#[derive(Debug, Clone)]
pub struct ToolLocations {
    pub mermaid: ToolSpec,
    pub pandoc: ToolSpec,
    pub browser: ToolSpec,
}

impl Default for ToolLocations {
    fn default() -> Self {
        Self {
            mermaid: ToolSpec::mermaid_cli(),
            pandoc: ToolSpec::pandoc(),
            browser: ToolSpec::chrome(),
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Image format for rendered diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramFormat {
    /// Vector output (default).
    #[default]
    Svg,
    /// Raster output.
    Png,
}

impl DiagramFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DiagramFormat::Svg => "svg",
            DiagramFormat::Png => "png",
        }
    }
}

/// Pandoc's math rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MathEngine {
    /// `--mathjax` (default). Needs network access to the MathJax CDN at print time.
    #[default]
    MathJax,
    /// `--katex`. Also loaded from a CDN.
    KaTeX,
    /// `--mathml`. Fully offline; rendered natively by Chrome.
    MathML,
}

impl MathEngine {
    pub fn pandoc_flag(&self) -> &'static str {
        match self {
            MathEngine::MathJax => "--mathjax",
            MathEngine::KaTeX => "--katex",
            MathEngine::MathML => "--mathml",
        }
    }
}

/// Paper size for the `@page` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    Letter,
    Legal,
}

impl PageSize {
    /// CSS `size` keyword.
    pub fn css_name(&self) -> &'static str {
        match self {
            PageSize::A4 => "A4",
            PageSize::Letter => "letter",
            PageSize::Legal => "legal",
        }
    }
}

/// How to name the PDF when no output path is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputNaming {
    /// `doc.md` → `doc.pdf`, overwriting an existing file (default). A run
    /// whose output would be the input file itself fails instead.
    #[default]
    Replace,
    /// `doc.md` → `doc.pdf`, or `doc_001.pdf`, `doc_002.pdf`, … if taken.
    Unique,
}

impl OutputNaming {
    /// Derive the output path for `input`.
    pub fn derive(&self, input: &Path) -> PathBuf {
        let base = input.with_extension("pdf");
        match self {
            OutputNaming::Replace => base,
            OutputNaming::Unique => {
                if !base.exists() {
                    return base;
                }
                let stem = input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "output".to_string());
                let dir = input.parent().unwrap_or_else(|| Path::new(""));
                (1u32..)
                    .map(|n| dir.join(format!("{stem}_{n:03}.pdf")))
                    .find(|p| !p.exists())
                    .unwrap_or(base)
            }
        }
    }
}
