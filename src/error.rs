//! Error types for the edgequake-md2pdf library.
//!
//! The pipeline is strictly fail-fast: a single [`Md2PdfError`] describes why
//! a run stopped, and [`Md2PdfError::stage`] says where. There is no
//! per-diagram "soft" error: a diagram that cannot be rendered would leave a
//! dangling image reference in the PDF, so it aborts the whole conversion.
//!
//! Every variant that wraps an external tool failure carries the tool's own
//! diagnostic text (`stderr`, falling back to `stdout`) so the user sees what
//! Pandoc, `mmdc` or Chrome actually complained about.

use crate::process::Tool;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage, used both for progress events and to attribute failures.
///
/// The conversion stages run strictly in declaration order; `Setup` covers
/// configuration and work-directory creation before the input is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Setup,
    /// Reading the input file and pulling out metadata.
    Input,
    /// Scanning for diagram fences and rendering each diagram.
    Diagrams,
    /// Markdown → HTML via Pandoc.
    Html,
    /// HTML → PDF via headless Chrome.
    Pdf,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Input => "input",
            Stage::Diagrams => "diagrams",
            Stage::Html => "html",
            Stage::Pdf => "pdf",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All fatal errors returned by the edgequake-md2pdf library.
#[derive(Debug, Error)]
pub enum Md2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Markdown file not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The input exists but cannot be used as a Markdown document.
    #[error("Invalid input '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    // ── Diagram errors ────────────────────────────────────────────────────
    /// A Mermaid fence was opened and never closed.
    #[error("Unclosed mermaid block opened at line {line}")]
    MalformedDiagramBlock { line: usize, fence: String },

    /// The diagram renderer failed for one block.
    #[error("Diagram {index} (line {line}) failed to render: {detail}")]
    DiagramRenderFailed {
        index: usize,
        line: usize,
        detail: String,
    },

    // ── Tool errors ───────────────────────────────────────────────────────
    /// Pandoc failed to produce HTML.
    #[error("Document conversion failed: {detail}")]
    DocumentConversionFailed { detail: String },

    /// Chrome failed to produce a usable PDF.
    #[error("PDF generation failed: {detail}")]
    PdfGenerationFailed { detail: String },

    /// A required external program could not be found.
    #[error("Missing dependency: {detail}")]
    MissingDependency {
        tool: Tool,
        /// Environment variable that overrides the tool location.
        env_var: Option<String>,
        detail: String,
    },

    /// An external program could not be started at all.
    #[error("Failed to start {tool} ('{program}'): {source}")]
    ToolSpawnFailed {
        tool: Tool,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external program exceeded the configured wait.
    #[error("{tool} did not finish within {secs}s and was terminated")]
    ToolTimeout { tool: Tool, secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not move the finished PDF to its destination.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (temp dir creation, task join, …).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Md2PdfError {
    /// Build a [`Md2PdfError::MissingDependency`] from a discovery failure.
    pub fn missing_dependency(tool: Tool, e: tool_locate::LocateError) -> Self {
        Md2PdfError::MissingDependency {
            tool,
            env_var: e.env_var().map(str::to_string),
            detail: e.to_string(),
        }
    }

    /// A follow-up suggestion for the user, kept out of the one-line message.
    pub fn hint(&self) -> Option<String> {
        match self {
            Md2PdfError::InputNotFound { .. } => {
                Some("Check the path exists and is readable.".into())
            }
            Md2PdfError::PermissionDenied { path } => Some(format!("Try: chmod +r {path:?}")),
            Md2PdfError::MalformedDiagramBlock { fence, .. } => {
                Some(format!("Add a closing fence ({fence}) after the diagram."))
            }
            Md2PdfError::ToolTimeout { .. } => {
                Some("Increase --timeout if the document is large.".into())
            }
            Md2PdfError::MissingDependency {
                env_var: Some(var), ..
            } => Some(format!("Set {var} to the program's full path.")),
            _ => None,
        }
    }

    /// The pipeline stage this error stopped.
    pub fn stage(&self) -> Stage {
        match self {
            Md2PdfError::InputNotFound { .. }
            | Md2PdfError::PermissionDenied { .. }
            | Md2PdfError::InvalidInput { .. } => Stage::Input,
            Md2PdfError::MalformedDiagramBlock { .. }
            | Md2PdfError::DiagramRenderFailed { .. } => Stage::Diagrams,
            Md2PdfError::DocumentConversionFailed { .. } => Stage::Html,
            Md2PdfError::PdfGenerationFailed { .. } | Md2PdfError::OutputWriteFailed { .. } => {
                Stage::Pdf
            }
            Md2PdfError::MissingDependency { tool, .. }
            | Md2PdfError::ToolSpawnFailed { tool, .. }
            | Md2PdfError::ToolTimeout { tool, .. } => tool.stage(),
            Md2PdfError::InvalidConfig(_) | Md2PdfError::Internal(_) => Stage::Setup,
        }
    }
}

/// Condense a tool's captured output into a diagnostic string.
///
/// Prefers stderr; falls back to stdout; notes when both are empty so the
/// message never ends in a bare colon.
pub(crate) fn tool_diagnostic(stderr: &str, stdout: &str) -> String {
    let stderr = stderr.trim();
    let stdout = stdout.trim();
    match (stderr.is_empty(), stdout.is_empty()) {
        (false, false) => format!("{stderr}\n{stdout}"),
        (false, true) => stderr.to_string(),
        (true, false) => stdout.to_string(),
        (true, true) => "(no output)".to_string(),
    }
}
