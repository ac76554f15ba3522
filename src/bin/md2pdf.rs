//! CLI binary for edgequake-md2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_md2pdf::{
    convert, convert_to_file, inspect, ConversionConfig, ConversionOutput,
    ConversionProgressCallback, DiagramFormat, MathEngine, Md2PdfError, OutputNaming, PageSize,
    ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
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

/// Terminal progress: a spinner naming the current stage, switched to a bar
/// while diagrams render, plus one log line per finished step.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(spinner_style());
        bar.set_prefix("Preparing");
        bar.set_message("Reading Markdown…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} diagrams  ⏱ {elapsed_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS)
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Setup => "Setting up",
        Stage::Input => "Reading Markdown",
        Stage::Diagrams => "Rendering diagrams",
        Stage::Html => "Running pandoc",
        Stage::Pdf => "Printing with Chrome",
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_diagrams: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting ({total_diagrams} diagrams)…"))
        ));
    }

    fn on_stage_start(&self, stage: Stage) {
        if stage == Stage::Diagrams {
            self.bar.set_style(bar_style());
            self.bar.set_position(0);
        } else {
            self.bar.set_style(spinner_style());
        }
        self.bar.set_prefix(stage_label(stage));
        self.bar.set_message("");
    }

    fn on_diagram_rendered(&self, index: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "  {} Diagram {:>3}/{:<3}",
            green("✓"),
            index,
            total
        ));
        self.bar.set_position(index as u64);
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<22} {}",
            green("✓"),
            stage_label(stage),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_conversion_complete(&self, _pdf_path: &Path) {
        self.bar.finish_and_clear();
    }

    fn on_conversion_failed(&self, stage: Stage, _error: &str) {
        self.bar.finish_and_clear();
        eprintln!("  {} {}", red("✗"), stage_label(stage));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # doc.md → doc.pdf
  md2pdf doc.md

  # Explicit output, raster diagrams
  md2pdf doc.md build/report.pdf --png

  # Never overwrite: doc_001.pdf, doc_002.pdf, …
  md2pdf --unique doc.md

  # US Letter, narrow margins, KaTeX math
  md2pdf --page-size letter --margin-mm 10 --math katex doc.md

  # Inside a container (Chrome sandbox unavailable)
  md2pdf --no-sandbox doc.md

  # Title, author and diagram count without running any tool
  md2pdf --inspect-only --json doc.md

EXTERNAL TOOLS:
  Tool          Purpose                 Override
  ────────────  ──────────────────────  ───────────────────────────
  mmdc          Mermaid → SVG / PNG     --mmdc PATH   or MMDC_PATH
  pandoc        Markdown → HTML         --pandoc PATH or PANDOC_PATH
  chrome        HTML → PDF              --chrome PATH or CHROME_PATH

  Each tool is looked up as: flag, environment variable, common install
  locations, then PATH. mmdc is only needed when the document contains
  ```mermaid blocks.

SETUP:
  npm install -g @mermaid-js/mermaid-cli
  brew install pandoc          (or apt install pandoc)
  Google Chrome or Chromium

ENVIRONMENT VARIABLES:
  MMDC_PATH / PANDOC_PATH / CHROME_PATH   Tool executables
  MD2PDF_*                                Defaults for the flags above
  RUST_LOG                                Override log filter

EXIT STATUS:
  0 success, 1 conversion error, 130 interrupted
"#;

/// Convert Markdown with Mermaid diagrams to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Convert Markdown with Mermaid diagrams to PDF",
    long_about = "Convert Markdown documents to PDF. Mermaid blocks are rendered with the \
Mermaid CLI, the document is turned into HTML by Pandoc, and headless Chrome prints the result.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown file to convert.
    input: PathBuf,

    /// Output PDF (default: INPUT with a .pdf extension).
    output: Option<PathBuf>,

    /// Render diagrams as PNG instead of SVG.
    #[arg(long, env = "MD2PDF_PNG")]
    png: bool,

    /// Append _001, _002, … instead of overwriting the derived output.
    #[arg(long, env = "MD2PDF_UNIQUE")]
    unique: bool,

    /// Math rendering engine.
    #[arg(long, env = "MD2PDF_MATH", value_enum, default_value = "mathjax")]
    math: MathArg,

    /// Paper size.
    #[arg(long, env = "MD2PDF_PAGE_SIZE", value_enum, default_value = "a4")]
    page_size: PageSizeArg,

    /// Page margin in millimetres (0–50).
    #[arg(long, env = "MD2PDF_MARGIN_MM", default_value_t = 15.0)]
    margin_mm: f32,

    /// Extra CSS stylesheet passed to pandoc.
    #[arg(long, env = "MD2PDF_CSS")]
    css: Option<PathBuf>,

    /// Chrome/Chromium executable.
    #[arg(long)]
    chrome: Option<PathBuf>,

    /// Pandoc executable.
    #[arg(long)]
    pandoc: Option<PathBuf>,

    /// Mermaid CLI (mmdc) executable.
    #[arg(long)]
    mmdc: Option<PathBuf>,

    /// Run Chrome and mmdc's browser without the sandbox (containers, CI).
    #[arg(long, env = "MD2PDF_NO_SANDBOX")]
    no_sandbox: bool,

    /// Per-tool timeout in seconds (0 disables).
    #[arg(long, env = "MD2PDF_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Split inline numbered lists onto separate lines.
    #[arg(long, env = "MD2PDF_NORMALIZE_LISTS")]
    normalize_lists: bool,

    /// Keep **Author** / **Email** lines in the body.
    #[arg(long, env = "MD2PDF_KEEP_METADATA_LINES")]
    keep_metadata_lines: bool,

    /// Keep the work directory with intermediate files.
    #[arg(long, env = "MD2PDF_KEEP_TEMP")]
    keep_temp: bool,

    /// Print document metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print structured JSON to stdout.
    #[arg(long, env = "MD2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MD2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2PDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MathArg {
    Mathjax,
    Katex,
    Mathml,
}

impl From<MathArg> for MathEngine {
    fn from(v: MathArg) -> Self {
        match v {
            MathArg::Mathjax => MathEngine::MathJax,
            MathArg::Katex => MathEngine::KaTeX,
            MathArg::Mathml => MathEngine::MathML,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageSizeArg {
    A4,
    Letter,
    Legal,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::Letter => PageSize::Letter,
            PageSizeArg::Legal => PageSize::Legal,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
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

    // Dropping the run future on Ctrl-C kills running tools (kill_on_drop)
    // and removes the work directory.
    tokio::select! {
        res = run(&cli, show_progress) => match res {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                report(&e, cli.verbose);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n{} interrupted", red("✘"));
            ExitCode::from(130)
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input)
            .await
            .context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input.display());
            println!("Title:        {}", meta.title);
            if let Some(ref a) = meta.author {
                println!("Author:       {a}");
            }
            if let Some(ref e) = meta.email {
                println!("Email:        {e}");
            }
            if let Some(ref abs) = meta.abstract_text {
                println!("Abstract:     {}", truncate(abs, 72));
            }
            println!("Diagrams:     {}", meta.diagram_count);
            println!("Words:        {}", meta.word_count);
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output = match cli.output {
        Some(ref path) => convert_to_file(&cli.input, path, &config).await,
        None => convert(&cli.input, &config).await,
    }
    .context("Conversion failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    }
    if !cli.quiet {
        print_summary(&output);
    }
    Ok(())
}

fn print_summary(output: &ConversionOutput) {
    eprintln!(
        "{}  {}  {}",
        green("✔"),
        bold(&output.pdf_path.display().to_string()),
        dim(&format!(
            "{} bytes, {} diagrams, {}ms",
            output.stats.pdf_bytes, output.stats.diagrams_rendered, output.stats.total_duration_ms
        )),
    );
    if let Some(ref dir) = output.work_dir {
        eprintln!("   intermediate files kept in {}", dim(&dir.display().to_string()));
    }
}

/// Print `error[<stage>]: …` for library errors, `error: …` otherwise.
fn report(err: &anyhow::Error, verbose: bool) {
    let (label, message) = summary(err);
    eprintln!("{} {message}", red(&label));
    if verbose {
        if let Some(hint) = err
            .chain()
            .find_map(|e| e.downcast_ref::<Md2PdfError>())
            .and_then(Md2PdfError::hint)
        {
            eprintln!("  {} {hint}", dim("hint:"));
        }
    }
}

/// Stage label and message for the error line on stderr.
fn summary(err: &anyhow::Error) -> (String, String) {
    let stage = err
        .chain()
        .find_map(|e| e.downcast_ref::<Md2PdfError>())
        .map(Md2PdfError::stage);
    let label = match stage {
        Some(stage) => format!("error[{stage}]:"),
        None => "error:".to_string(),
    };
    (label, format!("{err:#}"))
}

fn truncate(s: &str, max: usize) -> String {
    let line = s.lines().next().unwrap_or_default();
    if line.chars().count() > max || s.lines().nth(1).is_some() {
        let cut: String = line.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}\u{2026}")
    } else {
        line.to_string()
    }
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .diagram_format(if cli.png {
            DiagramFormat::Png
        } else {
            DiagramFormat::Svg
        })
        .math(cli.math.into())
        .page_size(cli.page_size.into())
        .margin_mm(cli.margin_mm)
        .browser_no_sandbox(cli.no_sandbox)
        .tool_timeout_secs(cli.timeout)
        .output_naming(if cli.unique {
            OutputNaming::Unique
        } else {
            OutputNaming::Replace
        })
        .normalize_lists(cli.normalize_lists)
        .strip_metadata_lines(!cli.keep_metadata_lines)
        .keep_work_dir(cli.keep_temp);

    if let Some(ref css) = cli.css {
        builder = builder.stylesheet(css);
    }
    if let Some(ref p) = cli.chrome {
        builder = builder.chrome_path(p);
    }
    if let Some(ref p) = cli.pandoc {
        builder = builder.pandoc_path(p);
    }
    if let Some(ref p) = cli.mmdc {
        builder = builder.mmdc_path(p);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
