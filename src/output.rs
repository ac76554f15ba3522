//! Result types returned by the conversion entry points.
//!
//! Everything here is `Serialize` so the CLI's `--json` mode can dump a run
//! report without a separate schema.

use crate::config::DiagramFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Where the PDF was written.
    pub pdf_path: PathBuf,
    pub metadata: DocumentMetadata,
    /// One entry per rendered diagram, in document order.
    pub diagrams: Vec<DiagramResult>,
    pub stats: ConversionStats,
    /// Location of the retained work directory when `keep_work_dir` was set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

/// Document-level facts pulled from the Markdown source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// First level-1 heading, or `"Document"` when there is none.
    pub title: String,
    pub author: Option<String>,
    pub email: Option<String>,
    /// Text under a `## Abstract` heading, up to the next heading.
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Number of Mermaid blocks found.
    pub diagram_count: usize,
    /// Number of whitespace-separated words outside fenced blocks.
    pub word_count: usize,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            author: None,
            email: None,
            abstract_text: None,
            diagram_count: 0,
            word_count: 0,
        }
    }
}

/// Title used when the document has no level-1 heading.
pub const DEFAULT_TITLE: &str = "Document";

/// A single rendered diagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramResult {
    /// 0-based index; the image is named `diagram_<index>.<ext>`.
    pub index: usize,
    /// 1-based line of the opening fence in the source document.
    pub line: usize,
    /// Image file name inside the work directory.
    pub image_file: String,
    pub format: DiagramFormat,
    /// Size of the rendered image.
    pub bytes: u64,
    /// Time spent in the diagram renderer.
    pub duration_ms: u64,
}

/// Timing and size figures for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub diagrams_rendered: usize,
    /// Reading the file and extracting metadata.
    pub input_duration_ms: u64,
    /// Scanning and rendering all diagrams.
    pub diagram_duration_ms: u64,
    /// Pandoc.
    pub html_duration_ms: u64,
    /// Chrome plus moving the file into place.
    pub pdf_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Size of the final PDF.
    pub pdf_bytes: u64,
}
