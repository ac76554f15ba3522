//! Mermaid extraction, rendering and substitution.
//!
//! ```text
//! markdown ──scan──▶ Extraction { pieces, blocks }
//!                        │
//!                        ├─ block i ─▶ diagram_i.mmd ─mmdc─▶ diagram_i.svg|png
//!                        │
//!                        └─ substitute(<div><img src="file:///…/diagram_i.svg">…)
//! ```
//!
//! Diagrams are rendered one at a time in document order. The first failure
//! aborts the run: a PDF with a missing figure is worse than no PDF.

use crate::config::{ConversionConfig, DiagramFormat};
use crate::error::Md2PdfError;
use crate::output::DiagramResult;
use crate::pipeline::fence::{self, BlockKind, Token};
use crate::process::{Tool, ToolCommand, ToolRunner};
use crate::templates;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// One Mermaid block found in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    /// 0-based, in document order.
    pub index: usize,
    /// 1-based line of the opening fence.
    pub line: usize,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Verbatim(String),
    Diagram(usize),
}

/// A document split into verbatim text and diagram slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pieces: Vec<Piece>,
    pub blocks: Vec<DiagramBlock>,
}

impl Extraction {
    /// Rewrite the text between diagrams in place.
    ///
    /// Block line numbers were taken before the rewrite and keep pointing at
    /// the source document.
    pub fn map_verbatim(&mut self, f: impl Fn(&str) -> String) {
        for piece in &mut self.pieces {
            if let Piece::Verbatim(text) = piece {
                *text = f(text);
            }
        }
    }

    /// Rebuild the document, replacing diagram `i` with `replacements[i]`.
    ///
    /// Missing replacements leave the slot empty; callers always pass one per
    /// block.
    pub fn substitute(&self, replacements: &[String]) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Verbatim(s) => out.push_str(s),
                Piece::Diagram(i) => {
                    if let Some(r) = replacements.get(*i) {
                        out.push_str(r);
                    }
                }
            }
        }
        out
    }
}

/// Split `text` into verbatim pieces and diagram blocks.
///
/// # Errors
/// [`Md2PdfError::MalformedDiagramBlock`] when a Mermaid fence is never closed.
/// An unclosed ordinary code fence is not an error; it is kept as-is.
pub fn extract(text: &str) -> Result<Extraction, Md2PdfError> {
    let scanned = fence::scan(text);

    if let Some(ref open) = scanned.unclosed {
        match open.kind {
            BlockKind::Diagram => {
                return Err(Md2PdfError::MalformedDiagramBlock {
                    line: open.line,
                    fence: open.marker.to_string(),
                });
            }
            BlockKind::Code => warn!(
                "Code block opened at line {} with {} is never closed; passing it through unchanged",
                open.line, open.marker
            ),
        }
    }

    let mut pieces = Vec::new();
    let mut blocks = Vec::new();
    for token in scanned.tokens {
        match token {
            Token::Diagram { line, source, .. } => {
                let index = blocks.len();
                pieces.push(Piece::Diagram(index));
                blocks.push(DiagramBlock {
                    index,
                    line,
                    source,
                });
            }
            other => match pieces.last_mut() {
                Some(Piece::Verbatim(s)) => s.push_str(other.raw()),
                _ => pieces.push(Piece::Verbatim(other.raw().to_string())),
            },
        }
    }

    Ok(Extraction { pieces, blocks })
}

/// Markdown with every diagram replaced, plus what was rendered.
#[derive(Debug, Clone)]
pub struct Processed {
    pub markdown: String,
    pub diagrams: Vec<DiagramResult>,
}

/// Render every diagram in `extraction` into `work_dir` and substitute image
/// references.
///
/// The Mermaid CLI is only located when there is at least one block, so
/// documents without diagrams never need it installed.
pub async fn render_all(
    extraction: &Extraction,
    work_dir: &Path,
    config: &ConversionConfig,
    runner: &dyn ToolRunner,
) -> Result<Processed, Md2PdfError> {
    let total = extraction.blocks.len();
    if total == 0 {
        debug!("No diagrams to render");
        return Ok(Processed {
            markdown: extraction.substitute(&[]),
            diagrams: Vec::new(),
        });
    }

    let mmdc = tool_locate::locate(&config.tools.mermaid, config.mmdc_path.as_deref())
        .map_err(|e| Md2PdfError::missing_dependency(Tool::DiagramRenderer, e))?;
    info!(
        "Rendering {} diagram(s) as {} with {}",
        total,
        config.diagram_format.extension(),
        mmdc.path.display()
    );

    let puppeteer_config = if config.browser_no_sandbox {
        Some(write_puppeteer_config(work_dir).await?)
    } else {
        None
    };

    let mut diagrams = Vec::with_capacity(total);
    let mut replacements = Vec::with_capacity(total);
    for block in &extraction.blocks {
        let result = render_one(
            block,
            &mmdc.path,
            puppeteer_config.as_deref(),
            work_dir,
            config,
            runner,
        )
        .await?;

        let url = file_url(&work_dir.join(&result.image_file))?;
        replacements.push(templates::diagram_block(block.index, &url));

        if let Some(ref cb) = config.progress_callback {
            cb.on_diagram_rendered(block.index + 1, total);
        }
        diagrams.push(result);
    }

    Ok(Processed {
        markdown: extraction.substitute(&replacements),
        diagrams,
    })
}

async fn render_one(
    block: &DiagramBlock,
    mmdc: &Path,
    puppeteer_config: Option<&Path>,
    work_dir: &Path,
    config: &ConversionConfig,
    runner: &dyn ToolRunner,
) -> Result<DiagramResult, Md2PdfError> {
    let fail = |detail: String| Md2PdfError::DiagramRenderFailed {
        index: block.index,
        line: block.line,
        detail,
    };

    let source_path = work_dir.join(format!("diagram_{}.mmd", block.index));
    let image_file = format!(
        "diagram_{}.{}",
        block.index,
        config.diagram_format.extension()
    );
    let image_path = work_dir.join(&image_file);

    tokio::fs::write(&source_path, &block.source)
        .await
        .map_err(|e| {
            Md2PdfError::Internal(format!("Failed to write {}: {e}", source_path.display()))
        })?;

    let mut cmd = ToolCommand::new(Tool::DiagramRenderer, mmdc)
        .arg("-i")
        .arg(&source_path)
        .arg("-o")
        .arg(&image_path)
        .arg("-b")
        .arg(&config.diagram_background)
        .arg("-w")
        .arg(config.diagram_width.to_string())
        .arg("-H")
        .arg(config.diagram_height.to_string())
        .current_dir(work_dir);
    if let Some(p) = puppeteer_config {
        cmd = cmd.arg("-p").arg(p);
    }

    let start = Instant::now();
    let output = runner.run(&cmd, config.tool_timeout()).await?;
    let duration_ms = start.elapsed().as_millis() as u64;

    if !output.success {
        return Err(fail(format!(
            "mmdc exited with {}: {}",
            output.status_text(),
            output.diagnostic()
        )));
    }

    let bytes = tokio::fs::read(&image_path).await.map_err(|e| {
        fail(format!(
            "mmdc reported success but {} is unreadable ({e}): {}",
            image_path.display(),
            output.diagnostic()
        ))
    })?;
    if bytes.is_empty() {
        return Err(fail(format!("{} is empty", image_path.display())));
    }
    match sniff_format(&bytes) {
        Some(found) if found == config.diagram_format => {}
        Some(found) => {
            return Err(fail(format!(
                "expected a {} image but mmdc wrote {}",
                config.diagram_format.extension(),
                found.extension()
            )))
        }
        None => {
            return Err(fail(format!(
                "{} is not a valid {} image",
                image_path.display(),
                config.diagram_format.extension()
            )))
        }
    }

    debug!(
        "Diagram {} (line {}) rendered: {} bytes in {}ms",
        block.index,
        block.line,
        bytes.len(),
        duration_ms
    );

    Ok(DiagramResult {
        index: block.index,
        line: block.line,
        image_file,
        format: config.diagram_format,
        bytes: bytes.len() as u64,
        duration_ms,
    })
}

/// Identify a rendered image by its leading bytes.
pub fn sniff_format(bytes: &[u8]) -> Option<DiagramFormat> {
    if matches!(image::guess_format(bytes), Ok(ImageFormat::Png)) {
        return Some(DiagramFormat::Png);
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
    let head = head.trim_start_matches('\u{feff}').trim_start();
    let looks_like_markup =
        head.starts_with("<svg") || head.starts_with("<?xml") || head.starts_with("<!");
    if looks_like_markup && head.contains("<svg") {
        Some(DiagramFormat::Svg)
    } else {
        None
    }
}

/// `file://` URL for an absolute path.
pub fn file_url(path: &Path) -> Result<String, Md2PdfError> {
    url::Url::from_file_path(path)
        .map(String::from)
        .map_err(|_| {
            Md2PdfError::Internal(format!(
                "Cannot build a file URL for non-absolute path {}",
                path.display()
            ))
        })
}

/// mmdc drives its own Chromium through puppeteer; `-p` passes launch args.
async fn write_puppeteer_config(work_dir: &Path) -> Result<PathBuf, Md2PdfError> {
    let path = work_dir.join("puppeteer-config.json");
    let body = serde_json::json!({ "args": ["--no-sandbox", "--disable-setuid-sandbox"] });
    tokio::fs::write(&path, body.to_string())
        .await
        .map_err(|e| Md2PdfError::Internal(format!("Failed to write {}: {e}", path.display())))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::{FakeRunner, PNG_BYTES, SVG_TEXT};
    use std::ffi::OsString;

    fn fake_exe(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        p
    }

    fn config_with_mmdc(dir: &Path, format: DiagramFormat) -> ConversionConfig {
        ConversionConfig::builder()
            .mmdc_path(fake_exe(dir, "mmdc"))
            .diagram_format(format)
            .build()
            .unwrap()
    }

    const TWO: &str = "# T\n\n```mermaid\ngraph TD;\nA-->B\n```\n\ntext\n\n```mermaid\nB-->C\n```\n";

    #[test]
    fn no_diagrams_is_identity() {
        let doc = "# Title\n\n```rust\nfn main() {}\n```\n\n~~~\nx\n~~~\nend";
        let ex = extract(doc).unwrap();
        assert!(ex.blocks.is_empty());
        assert_eq!(ex.substitute(&[]), doc);
    }

    #[test]
    fn extract_assigns_indices_and_lines() {
        let ex = extract(TWO).unwrap();
        assert_eq!(ex.blocks.len(), 2);
        assert_eq!(ex.blocks[0].index, 0);
        assert_eq!(ex.blocks[0].line, 3);
        assert_eq!(ex.blocks[0].source, "graph TD;\nA-->B\n");
        assert_eq!(ex.blocks[1].index, 1);
        assert_eq!(ex.blocks[1].line, 10);
    }

    #[test]
    fn substitute_replaces_only_diagrams() {
        let ex = extract(TWO).unwrap();
        let out = ex.substitute(&["[0]".to_string(), "[1]".to_string()]);
        assert_eq!(out, "# T\n\n[0]\ntext\n\n[1]");
    }

    #[test]
    fn unclosed_diagram_is_malformed() {
        let err = extract("a\n\n```mermaid\ngraph TD;\n").unwrap_err();
        match err {
            Md2PdfError::MalformedDiagramBlock { line, fence } => {
                assert_eq!(line, 3);
                assert_eq!(fence, "```");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unclosed_code_fence_is_tolerated() {
        let doc = "a\n```python\nprint(1)\n";
        let ex = extract(doc).unwrap();
        assert!(ex.blocks.is_empty());
        assert_eq!(ex.substitute(&[]), doc);
    }

    #[test]
    fn sniffing() {
        assert_eq!(sniff_format(PNG_BYTES), Some(DiagramFormat::Png));
        assert_eq!(sniff_format(SVG_TEXT.as_bytes()), Some(DiagramFormat::Svg));
        assert_eq!(
            sniff_format(b"<?xml version=\"1.0\"?>\n<svg></svg>"),
            Some(DiagramFormat::Svg)
        );
        assert_eq!(sniff_format(b"<html></html>"), None);
        assert_eq!(sniff_format(b"GIF89a"), None);
        assert_eq!(sniff_format(b""), None);
    }

    #[tokio::test]
    async fn renders_each_block_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_mmdc(dir.path(), DiagramFormat::Svg);
        let runner = FakeRunner::default();

        let ex = extract(TWO).unwrap();
        let processed = render_all(&ex, dir.path(), &config, &runner).await.unwrap();

        assert_eq!(runner.calls_for(Tool::DiagramRenderer), 2);
        assert_eq!(processed.diagrams.len(), 2);
        assert_eq!(processed.diagrams[0].image_file, "diagram_0.svg");
        assert_eq!(processed.diagrams[1].image_file, "diagram_1.svg");
        assert!(!processed.markdown.contains("```mermaid"));
        assert!(processed.markdown.contains("diagram_0.svg"));
        assert!(processed.markdown.contains("diagram_1.svg"));
        assert!(processed.markdown.contains("Diagram 2"));
        assert!(processed.markdown.contains("file://"));

        let src = std::fs::read_to_string(dir.path().join("diagram_1.mmd")).unwrap();
        assert_eq!(src, "B-->C\n");
    }

    #[tokio::test]
    async fn renderer_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConversionConfig::builder()
            .mmdc_path(fake_exe(dir.path(), "mmdc"))
            .diagram_format(DiagramFormat::Png)
            .diagram_background("white")
            .browser_no_sandbox(true)
            .build()
            .unwrap();
        let runner = FakeRunner::default();
        let ex = extract("```mermaid\nA\n```\n").unwrap();
        let processed = render_all(&ex, dir.path(), &config, &runner).await.unwrap();
        assert_eq!(processed.diagrams[0].format, DiagramFormat::Png);

        let calls = runner.calls.lock().unwrap();
        let args: Vec<OsString> = calls[0].args.clone();
        let as_str: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(as_str[0], "-i");
        assert!(as_str[1].ends_with("diagram_0.mmd"));
        assert_eq!(as_str[2], "-o");
        assert!(as_str[3].ends_with("diagram_0.png"));
        assert_eq!(&as_str[4..10], &["-b", "white", "-w", "800", "-H", "600"]);
        assert_eq!(as_str[10], "-p");
        assert!(dir.path().join("puppeteer-config.json").exists());
    }

    #[tokio::test]
    async fn zero_diagrams_never_locates_mmdc() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConversionConfig::builder()
            .mmdc_path("/no/such/mmdc")
            .build()
            .unwrap();
        let runner = FakeRunner::default();
        let ex = extract("plain\n").unwrap();
        let processed = render_all(&ex, dir.path(), &config, &runner).await.unwrap();
        assert_eq!(processed.markdown, "plain\n");
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn renderer_failure_names_diagram() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_mmdc(dir.path(), DiagramFormat::Svg);
        let runner = FakeRunner {
            fail: Some(Tool::DiagramRenderer),
            ..FakeRunner::default()
        };
        let ex = extract(TWO).unwrap();
        let err = render_all(&ex, dir.path(), &config, &runner).await.unwrap_err();
        match err {
            Md2PdfError::DiagramRenderFailed { index, line, detail } => {
                assert_eq!(index, 0);
                assert_eq!(line, 3);
                assert!(detail.contains("mmdc exploded"), "got: {detail}");
                assert!(detail.contains("exit code 1"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(runner.calls_for(Tool::DiagramRenderer), 1);
    }

    #[tokio::test]
    async fn missing_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_mmdc(dir.path(), DiagramFormat::Svg);
        let runner = FakeRunner {
            silent: Some(Tool::DiagramRenderer),
            ..FakeRunner::default()
        };
        let ex = extract(TWO).unwrap();
        let err = render_all(&ex, dir.path(), &config, &runner).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::DiagramRenderFailed { index: 0, .. }));
    }

    #[tokio::test]
    async fn missing_renderer_is_missing_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let tools = crate::config::ToolLocations {
            mermaid: tool_locate::ToolSpec::new("Mermaid CLI (mmdc)", "MD2PDF_TEST_UNSET_MMDC")
                .with_search_path(""),
            ..Default::default()
        };
        let config = ConversionConfig::builder().tools(tools).build().unwrap();
        let runner = FakeRunner::default();
        let ex = extract(TWO).unwrap();
        let err = render_all(&ex, dir.path(), &config, &runner).await.unwrap_err();
        match err {
            Md2PdfError::MissingDependency { tool, env_var, .. } => {
                assert_eq!(tool, Tool::DiagramRenderer);
                assert_eq!(env_var.as_deref(), Some("MD2PDF_TEST_UNSET_MMDC"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(runner.calls.lock().unwrap().is_empty());
    }
}
