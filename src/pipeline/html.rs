//! Markdown → standalone HTML via Pandoc.
//!
//! ## Where the HTML lives
//!
//! Relative links in the user's Markdown (`![](img/logo.png)`) are resolved by
//! Chrome against the HTML file's location, so the HTML is written next to the
//! source document as a hidden, self-deleting `.md2pdf-*.html` file. When that
//! directory is read-only the HTML goes into the work directory instead and
//! relative links may not resolve; diagram images are unaffected because they
//! are referenced by absolute `file://` URLs.

use crate::config::ConversionConfig;
use crate::error::Md2PdfError;
use crate::output::DocumentMetadata;
use crate::pipeline::diagrams::file_url;
use crate::process::{Tool, ToolCommand, ToolRunner};
use crate::templates;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// The HTML file Chrome will print.
#[derive(Debug)]
pub enum HtmlTarget {
    /// Hidden temp file beside the input; deleted when dropped.
    BesideInput(NamedTempFile),
    /// `output.html` inside the work directory.
    WorkDir(PathBuf),
}

impl HtmlTarget {
    pub fn path(&self) -> &Path {
        match self {
            HtmlTarget::BesideInput(f) => f.path(),
            HtmlTarget::WorkDir(p) => p,
        }
    }
}

/// Pick where to write the HTML for a document rooted at `base_dir`.
pub fn choose_target(base_dir: &Path, work_dir: &Path) -> HtmlTarget {
    match tempfile::Builder::new()
        .prefix(".md2pdf-")
        .suffix(".html")
        .tempfile_in(base_dir)
    {
        Ok(f) => HtmlTarget::BesideInput(f),
        Err(e) => {
            warn!(
                "Cannot write next to {} ({e}); relative links in the document may not resolve",
                base_dir.display()
            );
            HtmlTarget::WorkDir(work_dir.join("output.html"))
        }
    }
}

/// Pandoc arguments for one conversion.
pub fn pandoc_args(
    markdown: &Path,
    header: &Path,
    html: &Path,
    metadata: &DocumentMetadata,
    stylesheet_url: Option<&str>,
    config: &ConversionConfig,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        markdown.into(),
        "--from".into(),
        "markdown".into(),
        "--to".into(),
        "html5".into(),
        "--standalone".into(),
        config.math.pandoc_flag().into(),
        "--include-in-header".into(),
        header.into(),
        "--metadata".into(),
        format!("pagetitle={}", metadata.title).into(),
    ];
    if let Some(ref author) = metadata.author {
        args.push("--variable".into());
        args.push(format!("author-meta={author}").into());
    }
    if let Some(url) = stylesheet_url {
        args.push("--css".into());
        args.push(url.into());
    }
    args.push("-o".into());
    args.push(html.into());
    args
}

/// Write `markdown` to the work directory and convert it to HTML.
pub async fn convert(
    markdown: &str,
    metadata: &DocumentMetadata,
    base_dir: &Path,
    work_dir: &Path,
    config: &ConversionConfig,
    runner: &dyn ToolRunner,
) -> Result<HtmlTarget, Md2PdfError> {
    let pandoc = tool_locate::locate(&config.tools.pandoc, config.pandoc_path.as_deref())
        .map_err(|e| Md2PdfError::missing_dependency(Tool::DocumentConverter, e))?;
    debug!("Using pandoc at {}", pandoc.path.display());

    let md_path = work_dir.join("processed.md");
    let header_path = work_dir.join("print-header.html");
    write_file(&md_path, markdown.as_bytes()).await?;
    write_file(&header_path, templates::print_header(config).as_bytes()).await?;

    let stylesheet_url = match config.stylesheet {
        Some(ref css) => {
            let abs = tokio::fs::canonicalize(css).await.map_err(|e| {
                Md2PdfError::InvalidConfig(format!("Stylesheet '{}': {e}", css.display()))
            })?;
            Some(file_url(&abs)?)
        }
        None => None,
    };

    let target = choose_target(base_dir, work_dir);
    let cmd = ToolCommand::new(Tool::DocumentConverter, &pandoc.path)
        .args(pandoc_args(
            &md_path,
            &header_path,
            target.path(),
            metadata,
            stylesheet_url.as_deref(),
            config,
        ))
        .current_dir(base_dir);

    let output = runner.run(&cmd, config.tool_timeout()).await?;
    if !output.success {
        return Err(Md2PdfError::DocumentConversionFailed {
            detail: format!(
                "pandoc exited with {}: {}",
                output.status_text(),
                output.diagnostic()
            ),
        });
    }

    let size = tokio::fs::metadata(target.path())
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    if size == 0 {
        return Err(Md2PdfError::DocumentConversionFailed {
            detail: format!(
                "pandoc produced no HTML at {}: {}",
                target.path().display(),
                output.diagnostic()
            ),
        });
    }
    info!("HTML written: {} ({} bytes)", target.path().display(), size);

    if config.keep_work_dir {
        if let HtmlTarget::BesideInput(ref f) = target {
            let copy = work_dir.join("output.html");
            if let Err(e) = tokio::fs::copy(f.path(), &copy).await {
                warn!("Could not copy HTML into work directory: {e}");
            }
        }
    }

    Ok(target)
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), Md2PdfError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| Md2PdfError::Internal(format!("Failed to write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MathEngine;
    use crate::process::fake::FakeRunner;

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

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn args_include_math_and_metadata() {
        let meta = DocumentMetadata {
            title: "My Paper".into(),
            author: Some("Ada".into()),
            ..DocumentMetadata::default()
        };
        let config = ConversionConfig::builder()
            .math(MathEngine::MathML)
            .build()
            .unwrap();
        let args = strings(&pandoc_args(
            Path::new("/w/processed.md"),
            Path::new("/w/print-header.html"),
            Path::new("/d/.md2pdf-x.html"),
            &meta,
            Some("file:///s.css"),
            &config,
        ));
        assert_eq!(
            &args[..7],
            &["/w/processed.md", "--from", "markdown", "--to", "html5", "--standalone", "--mathml"]
        );
        assert!(args.windows(2).any(|w| w == ["--include-in-header", "/w/print-header.html"]));
        assert!(args.windows(2).any(|w| w == ["--metadata", "pagetitle=My Paper"]));
        assert!(args.windows(2).any(|w| w == ["--variable", "author-meta=Ada"]));
        assert!(args.windows(2).any(|w| w == ["--css", "file:///s.css"]));
        assert_eq!(&args[args.len() - 2..], &["-o", "/d/.md2pdf-x.html"]);
    }

    #[test]
    fn default_math_is_mathjax_without_author() {
        let args = strings(&pandoc_args(
            Path::new("a.md"),
            Path::new("h.html"),
            Path::new("o.html"),
            &DocumentMetadata::default(),
            None,
            &ConversionConfig::default(),
        ));
        assert!(args.contains(&"--mathjax".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("author-meta")));
        assert!(!args.contains(&"--css".to_string()));
        assert!(args.contains(&"pagetitle=Document".to_string()));
    }

    #[test]
    fn target_prefers_input_directory() {
        let base = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let target = choose_target(base.path(), work.path());
        assert!(matches!(target, HtmlTarget::BesideInput(_)));
        assert_eq!(target.path().parent().unwrap(), base.path());
        let name = target.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".md2pdf-") && name.ends_with(".html"));

        let path = target.path().to_path_buf();
        drop(target);
        assert!(!path.exists());
    }

    #[test]
    fn target_falls_back_to_work_dir() {
        let work = tempfile::tempdir().unwrap();
        let target = choose_target(Path::new("/definitely/not/a/dir"), work.path());
        assert_eq!(target.path(), work.path().join("output.html"));
    }

    #[tokio::test]
    async fn converts_and_writes_inputs() {
        let base = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let config = ConversionConfig::builder()
            .pandoc_path(fake_exe(work.path(), "pandoc"))
            .build()
            .unwrap();
        let runner = FakeRunner::default();

        let target = convert(
            "# Hi\n",
            &DocumentMetadata::default(),
            base.path(),
            work.path(),
            &config,
            &runner,
        )
        .await
        .unwrap();

        assert!(std::fs::metadata(target.path()).unwrap().len() > 0);
        assert_eq!(
            std::fs::read_to_string(work.path().join("processed.md")).unwrap(),
            "# Hi\n"
        );
        let header = std::fs::read_to_string(work.path().join("print-header.html")).unwrap();
        assert!(header.contains("@page"));
        assert_eq!(runner.calls_for(Tool::DocumentConverter), 1);
    }

    #[tokio::test]
    async fn failure_carries_diagnostic() {
        let base = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let config = ConversionConfig::builder()
            .pandoc_path(fake_exe(work.path(), "pandoc"))
            .build()
            .unwrap();
        let runner = FakeRunner {
            fail: Some(Tool::DocumentConverter),
            ..FakeRunner::default()
        };
        let err = convert(
            "x",
            &DocumentMetadata::default(),
            base.path(),
            work.path(),
            &config,
            &runner,
        )
        .await
        .unwrap_err();
        match err {
            Md2PdfError::DocumentConversionFailed { detail } => {
                assert!(detail.contains("pandoc exploded"), "got: {detail}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_output_is_failure() {
        let base = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let config = ConversionConfig::builder()
            .pandoc_path(fake_exe(work.path(), "pandoc"))
            .build()
            .unwrap();
        let runner = FakeRunner {
            silent: Some(Tool::DocumentConverter),
            ..FakeRunner::default()
        };
        let err = convert(
            "x",
            &DocumentMetadata::default(),
            base.path(),
            work.path(),
            &config,
            &runner,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Md2PdfError::DocumentConversionFailed { .. }));
    }
}
