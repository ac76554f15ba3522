//! Input resolution: validate the Markdown source and load it.
//!
//! All checks here run before any external tool is located or started, so a
//! mistyped path fails immediately with [`Md2PdfError::InputNotFound`].

use crate::error::Md2PdfError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A loaded Markdown document.
#[derive(Debug, Clone)]
pub struct InputDocument {
    /// The file the text came from; `None` for in-memory input.
    pub source: Option<PathBuf>,
    /// Directory relative links resolve against. Always absolute.
    pub base_dir: PathBuf,
    pub text: String,
}

impl InputDocument {
    /// Wrap in-memory Markdown whose relative links resolve against `base_dir`.
    pub fn from_text(text: impl Into<String>, base_dir: &Path) -> Result<Self, Md2PdfError> {
        let base_dir = std::fs::canonicalize(base_dir).map_err(|_| Md2PdfError::InvalidInput {
            path: base_dir.to_path_buf(),
            reason: "base directory does not exist".into(),
        })?;
        if !base_dir.is_dir() {
            return Err(Md2PdfError::InvalidInput {
                path: base_dir,
                reason: "base path is not a directory".into(),
            });
        }
        Ok(Self {
            source: None,
            base_dir,
            text: text.into(),
        })
    }
}

/// Read and validate a Markdown file.
pub async fn read_input(path: &Path) -> Result<InputDocument, Md2PdfError> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(Md2PdfError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {
            return Err(Md2PdfError::InputNotFound {
                path: path.to_path_buf(),
            })
        }
    };
    if meta.is_dir() {
        return Err(Md2PdfError::InvalidInput {
            path: path.to_path_buf(),
            reason: "is a directory, not a Markdown file".into(),
        });
    }

    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(Md2PdfError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(Md2PdfError::InvalidInput {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    let text = String::from_utf8(bytes).map_err(|e| Md2PdfError::InvalidInput {
        path: path.to_path_buf(),
        reason: format!("not valid UTF-8 (first bad byte at offset {})", e.utf8_error().valid_up_to()),
    })?;
    let text = match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    };

    let absolute = tokio::fs::canonicalize(path)
        .await
        .map_err(|_| Md2PdfError::InputNotFound {
            path: path.to_path_buf(),
        })?;
    let base_dir = absolute
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| Md2PdfError::InvalidInput {
            path: path.to_path_buf(),
            reason: "has no parent directory".into(),
        })?;

    debug!(
        "Loaded {} ({} bytes), base dir {}",
        absolute.display(),
        text.len(),
        base_dir.display()
    );
    Ok(InputDocument {
        source: Some(absolute),
        base_dir,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_file_and_resolves_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("doc.md");
        std::fs::write(&p, "# Hello\n").unwrap();
        let doc = read_input(&p).await.unwrap();
        assert_eq!(doc.text, "# Hello\n");
        assert_eq!(doc.base_dir, std::fs::canonicalize(dir.path()).unwrap());
        assert!(doc.source.unwrap().is_absolute());
    }

    #[tokio::test]
    async fn missing_file() {
        let err = read_input(Path::new("/no/such/file.md")).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_input(dir.path()).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn non_utf8_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bin.md");
        std::fs::write(&p, [b'o', b'k', 0xff, 0xfe]).unwrap();
        let err = read_input(&p).await.unwrap_err();
        match err {
            Md2PdfError::InvalidInput { reason, .. } => assert!(reason.contains("offset 2")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn bom_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bom.md");
        std::fs::write(&p, "\u{feff}# T\n").unwrap();
        assert_eq!(read_input(&p).await.unwrap().text, "# T\n");
    }

    #[test]
    fn from_text_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let doc = InputDocument::from_text("x", dir.path()).unwrap();
        assert!(doc.source.is_none());
        assert!(doc.base_dir.is_absolute());
        assert!(InputDocument::from_text("x", Path::new("/no/such/dir")).is_err());
    }
}
