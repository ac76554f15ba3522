//! HTML → PDF via headless Chrome.
//!
//! Chrome prints into the work directory first. The file is checked (non-empty,
//! `%PDF` signature) and only then moved to the destination, so a failed or
//! truncated print never replaces an existing PDF.

use crate::config::ConversionConfig;
use crate::error::Md2PdfError;
use crate::pipeline::diagrams::file_url;
use crate::process::{Tool, ToolCommand, ToolRunner};
use std::ffi::OsString;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Chrome arguments for printing `html_url` to `pdf`.
pub fn chrome_args(
    html_url: &str,
    pdf: &Path,
    profile_dir: &Path,
    config: &ConversionConfig,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--headless".into(),
        "--disable-gpu".into(),
        "--no-pdf-header-footer".into(),
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        "--run-all-compositor-stages-before-draw".into(),
    ];
    if config.virtual_time_budget_ms > 0 {
        args.push(format!("--virtual-time-budget={}", config.virtual_time_budget_ms).into());
    }
    if config.browser_no_sandbox {
        args.push("--no-sandbox".into());
    }
    args.push(prefixed("--user-data-dir=", profile_dir));
    args.push(prefixed("--print-to-pdf=", pdf));
    args.push(html_url.into());
    args
}

fn prefixed(flag: &str, path: &Path) -> OsString {
    let mut s = OsString::from(flag);
    s.push(path);
    s
}

/// Print `html` to `dest`. Returns the PDF size in bytes.
pub async fn print(
    html: &Path,
    dest: &Path,
    work_dir: &Path,
    config: &ConversionConfig,
    runner: &dyn ToolRunner,
) -> Result<u64, Md2PdfError> {
    let chrome = tool_locate::locate(&config.tools.browser, config.chrome_path.as_deref())
        .map_err(|e| Md2PdfError::missing_dependency(Tool::Browser, e))?;
    debug!("Using browser at {}", chrome.path.display());

    let staged = work_dir.join("output.pdf");
    let profile = work_dir.join("chrome-profile");
    let html_url = file_url(html)?;

    let cmd = ToolCommand::new(Tool::Browser, &chrome.path)
        .args(chrome_args(&html_url, &staged, &profile, config))
        .current_dir(work_dir);
    let output = runner.run(&cmd, config.tool_timeout()).await?;
    if !output.success {
        return Err(Md2PdfError::PdfGenerationFailed {
            detail: format!(
                "chrome exited with {}: {}",
                output.status_text(),
                output.diagnostic()
            ),
        });
    }

    let size = validate_pdf(&staged).await.map_err(|detail| {
        Md2PdfError::PdfGenerationFailed {
            detail: format!("{detail}: {}", output.diagnostic()),
        }
    })?;

    move_into_place(&staged, dest).await?;
    info!("PDF written: {} ({} bytes)", dest.display(), size);
    Ok(size)
}

/// Check that `path` is a non-empty file starting with `%PDF`.
async fn validate_pdf(path: &Path) -> Result<u64, String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| format!("browser produced no PDF at {} ({e})", path.display()))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| format!("cannot stat {} ({e})", path.display()))?
        .len();
    if size == 0 {
        return Err(format!("{} is empty", path.display()));
    }
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).await.is_err() || &magic != PDF_MAGIC {
        return Err(format!("{} does not start with %PDF", path.display()));
    }
    Ok(size)
}

/// Move the staged PDF to `dest`, creating parent directories.
///
/// Rename is atomic on the same filesystem. Across filesystems the file is
/// copied to a sibling of `dest` and renamed from there.
async fn move_into_place(staged: &Path, dest: &Path) -> Result<(), Md2PdfError> {
    let write_err = |source| Md2PdfError::OutputWriteFailed {
        path: dest.to_path_buf(),
        source,
    };

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    if tokio::fs::rename(staged, dest).await.is_ok() {
        return Ok(());
    }

    let sibling = dest.with_extension("pdf.tmp");
    debug!("Rename failed; copying via {}", sibling.display());
    if let Err(e) = tokio::fs::copy(staged, &sibling).await {
        return Err(write_err(e));
    }
    if let Err(e) = tokio::fs::rename(&sibling, dest).await {
        if let Err(cleanup) = tokio::fs::remove_file(&sibling).await {
            warn!("Could not remove {}: {cleanup}", sibling.display());
        }
        return Err(write_err(e));
    }
    Ok(())
}
