//! # edgequake-md2pdf
//!
//! Convert Markdown documents with embedded Mermaid diagrams into print-ready PDF.
//!
//! ## Why this crate?
//!
//! Pandoc turns Markdown into good HTML but knows nothing about Mermaid, and
//! Pandoc's own PDF route needs a full LaTeX install. This crate renders every
//! ` ```mermaid ` block to an image with the Mermaid CLI, lets Pandoc produce
//! standalone HTML around those images, and prints the result with headless
//! Chrome. Three external tools, one call, one PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Input     read file, check UTF-8, resolve base directory
//!  ├─ 2. Metadata  title / author / email / abstract from the prose
//!  ├─ 3. Diagrams  each ```mermaid block → mmdc → SVG|PNG → <img>
//!  ├─ 4. HTML      pandoc --standalone with print CSS (page size, margins)
//!  └─ 5. PDF       chrome --headless --print-to-pdf, validated, moved into place
//! ```
//!
//! Tools are found in this order: explicit path, environment variable
//! (`CHROME_PATH` / `PANDOC_PATH` / `MMDC_PATH`), well-known install
//! locations, then `PATH`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_md2pdf::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     // report.md → report.pdf
//!     let output = convert("report.md", &config).await?;
//!     eprintln!(
//!         "{}: {} diagrams, {} bytes",
//!         output.pdf_path.display(),
//!         output.stats.diagrams_rendered,
//!         output.stats.pdf_bytes
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2pdf` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-md2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod templates;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, DiagramFormat, MathEngine, OutputNaming, PageSize,
    ToolLocations,
};
pub use convert::{convert, convert_markdown, convert_sync, convert_to_file, inspect};
pub use error::{Md2PdfError, Stage};
pub use output::{ConversionOutput, ConversionStats, DiagramResult, DocumentMetadata};
pub use process::{SystemRunner, Tool, ToolCommand, ToolOutput, ToolRunner};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
