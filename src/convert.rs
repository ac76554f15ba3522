//! Conversion entry points.
//!
//! Every entry point funnels into one sequential pipeline:
//!
//! ```text
//! Start ──diagrams──▶ Extracted ──pandoc──▶ Converted ──chrome──▶ Printed ──▶ Done
//!   │                    │                     │                     │
//!   └────────────────────┴─────────────────────┴─────────────────────┴──▶ Failed(stage)
//! ```
//!
//! There are no retries. Each tool runs once; the first error stops the run,
//! drops the work directory and is returned to the caller.

use crate::config::ConversionConfig;
use crate::error::{Md2PdfError, Stage};
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata};
use crate::pipeline::input::{self, InputDocument};
use crate::pipeline::{diagrams, html, metadata, pdf};
use crate::process::{SystemRunner, ToolRunner};
use crate::progress::ProgressCallback;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert a Markdown file to PDF.
///
/// The output path is derived from the input with
/// [`crate::config::OutputNaming`] (`doc.md` → `doc.pdf` by default).
///
/// # Errors
/// Any [`Md2PdfError`]; use [`Md2PdfError::stage`] to see where it stopped.
/// The output path is never left holding a partial PDF.
pub async fn convert(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let input = input.as_ref();
    let output = config.output_naming.derive(input);
    convert_to_file(input, output, config).await
}

/// Convert a Markdown file to PDF at an explicit output path.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    run_pipeline(
        Source::File(input.as_ref()),
        output_path.as_ref(),
        config,
    )
    .await
}

/// Convert in-memory Markdown to PDF.
///
/// `base_dir` stands in for the directory of a source file: relative links
/// and images in `markdown` resolve against it.
///
/// # Example
/// ```rust,no_run
/// use edgequake_md2pdf::{convert_markdown, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let md = "# Report\n\n```mermaid\ngraph TD; A-->B\n```\n";
/// let out = convert_markdown(md, ".", "report.pdf", &ConversionConfig::default()).await?;
/// println!("{} diagrams", out.stats.diagrams_rendered);
/// # Ok(())
/// # }
/// ```
pub async fn convert_markdown(
    markdown: &str,
    base_dir: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    run_pipeline(
        Source::Text {
            markdown,
            base_dir: base_dir.as_ref(),
        },
        output_path.as_ref(),
        config,
    )
    .await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Md2PdfError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(input, config))
}

/// Read a document's metadata and count its diagrams without running any tool.
///
/// Fails with [`Md2PdfError::MalformedDiagramBlock`] exactly when a full
/// conversion would.
pub async fn inspect(input: impl AsRef<Path>) -> Result<DocumentMetadata, Md2PdfError> {
    let doc = input::read_input(input.as_ref()).await?;
    let extracted = metadata::extract(&doc.text, false);
    let mut meta = extracted.metadata;
    meta.diagram_count = diagrams::extract(&extracted.body)?.blocks.len();
    Ok(meta)
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// True when writing `output` would replace the existing file `input`.
fn overwrites(input: &Path, output: &Path) -> bool {
    match (std::fs::canonicalize(input), resolve(output)) {
        (Ok(input), Some(output)) => input == output,
        _ => false,
    }
}

/// Canonical form of a path whose final component may not exist yet.
fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(p) = std::fs::canonicalize(path) {
        return Some(p);
    }
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Some(std::fs::canonicalize(parent).ok()?.join(path.file_name()?))
}

enum Source<'a> {
    File(&'a Path),
    Text { markdown: &'a str, base_dir: &'a Path },
}

/// Position of a run in the conversion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Start,
    Extracted,
    Converted,
    Printed,
    Done,
    Failed(Stage),
}

impl PipelineState {
    fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Start, Extracted)
                | (Extracted, Converted)
                | (Converted, Printed)
                | (Printed, Done)
                | (Start | Extracted | Converted | Printed, Failed(_))
        )
    }

    /// State reached when `stage` completes.
    fn after(stage: Stage) -> Option<PipelineState> {
        match stage {
            Stage::Diagrams => Some(PipelineState::Extracted),
            Stage::Html => Some(PipelineState::Converted),
            Stage::Pdf => Some(PipelineState::Printed),
            Stage::Setup | Stage::Input => None,
        }
    }
}

/// Tracks state, stage timing and progress events for one run.
struct Run<'a> {
    state: PipelineState,
    stage: Stage,
    stage_start: Instant,
    callback: Option<&'a ProgressCallback>,
}

impl<'a> Run<'a> {
    fn new(callback: Option<&'a ProgressCallback>) -> Self {
        Self {
            state: PipelineState::Start,
            stage: Stage::Setup,
            stage_start: Instant::now(),
            callback,
        }
    }

    fn begin(&mut self, stage: Stage) {
        debug!("Stage {stage} started");
        self.stage = stage;
        self.stage_start = Instant::now();
        if let Some(cb) = self.callback {
            cb.on_stage_start(stage);
        }
    }

    /// Complete the current stage; returns its duration in ms.
    fn finish(&mut self) -> u64 {
        let elapsed_ms = self.stage_start.elapsed().as_millis() as u64;
        if let Some(next) = PipelineState::after(self.stage) {
            self.transition(next);
        }
        debug!("Stage {} finished in {}ms", self.stage, elapsed_ms);
        if let Some(cb) = self.callback {
            cb.on_stage_complete(self.stage, elapsed_ms);
        }
        elapsed_ms
    }

    fn done(&mut self, pdf_path: &Path) {
        self.transition(PipelineState::Done);
        if let Some(cb) = self.callback {
            cb.on_conversion_complete(pdf_path);
        }
    }

    fn fail(&mut self, err: Md2PdfError) -> Md2PdfError {
        let stage = err.stage();
        self.transition(PipelineState::Failed(stage));
        warn!("Conversion failed during {stage}: {err}");
        if let Some(cb) = self.callback {
            cb.on_conversion_failed(stage, &err.to_string());
        }
        err
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }
}

async fn run_pipeline(
    source: Source<'_>,
    output: &Path,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let mut run = Run::new(config.progress_callback.as_ref());
    match execute(&mut run, source, output, config).await {
        Ok(out) => Ok(out),
        Err(e) => Err(run.fail(e)),
    }
}

async fn execute(
    run: &mut Run<'_>,
    source: Source<'_>,
    output: &Path,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let total_start = Instant::now();

    // ── Step 1: Read input and metadata ──────────────────────────────────
    run.begin(Stage::Input);
    let doc = match source {
        Source::File(path) => {
            info!("Starting conversion: {}", path.display());
            if overwrites(path, output) {
                return Err(Md2PdfError::InvalidInput {
                    path: path.to_path_buf(),
                    reason: format!("output '{}' would replace the input", output.display()),
                });
            }
            input::read_input(path).await?
        }
        Source::Text { markdown, base_dir } => {
            info!("Starting conversion of in-memory Markdown");
            InputDocument::from_text(markdown, base_dir)?
        }
    };
    let extracted = metadata::extract(&doc.text, config.strip_metadata_lines);
    let mut meta = extracted.metadata;
    let input_duration_ms = run.finish();
    info!(
        "Document '{}': {} diagram(s), {} words",
        meta.title, meta.diagram_count, meta.word_count
    );

    if let Some(cb) = run.callback {
        cb.on_conversion_start(meta.diagram_count);
    }

    let work_dir = tempfile::Builder::new()
        .prefix("md2pdf-")
        .tempdir()
        .map_err(|e| Md2PdfError::Internal(format!("Failed to create work directory: {e}")))?;
    let runner: Arc<dyn ToolRunner> = config
        .runner
        .clone()
        .unwrap_or_else(|| Arc::new(SystemRunner));
    debug!("Work directory: {}", work_dir.path().display());

    // ── Step 2: Render diagrams ──────────────────────────────────────────
    run.begin(Stage::Diagrams);
    // Fences are located on the source text so reported lines match the file.
    let mut extraction = diagrams::extract(&extracted.body)?;
    if config.normalize_lists {
        extraction.map_verbatim(metadata::normalize_lists);
    }
    meta.diagram_count = extraction.blocks.len();
    let rendered =
        diagrams::render_all(&extraction, work_dir.path(), config, runner.as_ref()).await?;
    let diagram_duration_ms = run.finish();

    // ── Step 3: Markdown → HTML ──────────────────────────────────────────
    run.begin(Stage::Html);
    let html_target = html::convert(
        &rendered.markdown,
        &meta,
        &doc.base_dir,
        work_dir.path(),
        config,
        runner.as_ref(),
    )
    .await?;
    let html_duration_ms = run.finish();

    // ── Step 4: HTML → PDF ───────────────────────────────────────────────
    run.begin(Stage::Pdf);
    let pdf_bytes = pdf::print(
        html_target.path(),
        output,
        work_dir.path(),
        config,
        runner.as_ref(),
    )
    .await?;
    drop(html_target);
    let pdf_duration_ms = run.finish();

    let kept_dir: Option<PathBuf> = if config.keep_work_dir {
        let path = work_dir.keep();
        info!("Work directory kept at {}", path.display());
        Some(path)
    } else {
        None
    };

    let stats = ConversionStats {
        diagrams_rendered: rendered.diagrams.len(),
        input_duration_ms,
        diagram_duration_ms,
        html_duration_ms,
        pdf_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        pdf_bytes,
    };
    info!(
        "Conversion complete: {} ({} bytes, {} diagrams, {}ms)",
        output.display(),
        stats.pdf_bytes,
        stats.diagrams_rendered,
        stats.total_duration_ms
    );
    run.done(output);

    Ok(ConversionOutput {
        pdf_path: output.to_path_buf(),
        metadata: meta,
        diagrams: rendered.diagrams,
        stats,
        work_dir: kept_dir,
    })
}
