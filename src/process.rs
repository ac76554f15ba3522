//! External tool invocation.
//!
//! Every subprocess the pipeline starts goes through a [`ToolRunner`]. The
//! default [`SystemRunner`] spawns real processes with `tokio::process`;
//! tests (and embedders that sandbox tools differently) inject their own
//! runner via [`crate::config::ConversionConfigBuilder::runner`].
//!
//! ## Bounded waits and cancellation
//!
//! Children are spawned with `kill_on_drop(true)`. When the configured timeout
//! elapses, the in-flight `wait_with_output` future is dropped, which drops
//! the child handle and kills the process. The same happens when the caller
//! drops the whole conversion future (e.g. the CLI's Ctrl-C handler), so a
//! hung Chrome or Pandoc never outlives the run.
//!
//! Killing the direct child is not enough: `mmdc` launches its own Chromium
//! and Chrome forks helper processes. On unix each tool therefore starts in
//! a fresh process group, and the whole group receives `SIGKILL` whenever the
//! wait ends without the tool exiting on its own.

use crate::error::{tool_diagnostic, Md2PdfError, Stage};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

/// The three external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tool {
    /// Mermaid CLI (`mmdc`).
    DiagramRenderer,
    /// Pandoc.
    DocumentConverter,
    /// Chrome / Chromium in headless mode.
    Browser,
}

impl Tool {
    /// The pipeline stage that invokes this tool.
    pub fn stage(&self) -> Stage {
        match self {
            Tool::DiagramRenderer => Stage::Diagrams,
            Tool::DocumentConverter => Stage::Html,
            Tool::Browser => Stage::Pdf,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::DiagramRenderer => "mmdc",
            Tool::DocumentConverter => "pandoc",
            Tool::Browser => "chrome",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-specified subprocess invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(tool: Tool, program: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Value following `flag` (e.g. the path after `-o`), if present.
    pub fn value_after(&self, flag: &str) -> Option<&OsString> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
    }

    /// Shell-like rendering for logs. Not meant to be re-parsed.
    pub fn display(&self) -> String {
        let mut s = self.program.display().to_string();
        for a in &self.args {
            s.push(' ');
            s.push_str(&a.to_string_lossy());
        }
        s
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// A successful run with no output.
    pub fn ok() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            ..Self::default()
        }
    }

    /// A failed run with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// "exit code 2" / "terminated by signal".
    pub fn status_text(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }

    /// The tool's diagnostic output (stderr first, then stdout).
    pub fn diagnostic(&self) -> String {
        tool_diagnostic(&self.stderr, &self.stdout)
    }
}

/// Runs external tool commands.
///
/// Implementations must be `Send + Sync`; the runner is shared through an
/// `Arc` in [`crate::config::ConversionConfig`].
pub trait ToolRunner: Send + Sync {
    /// Run `command` to completion, waiting at most `timeout` when set.
    ///
    /// A non-zero exit is *not* an error at this level: it is reported through
    /// [`ToolOutput::success`] so each stage can attach its own context.
    /// Errors are reserved for "could not run at all" (spawn failure, timeout).
    fn run<'a>(
        &'a self,
        command: &'a ToolCommand,
        timeout: Option<Duration>,
    ) -> BoxFuture<'a, Result<ToolOutput, Md2PdfError>>;
}

/// Spawns real subprocesses via `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run<'a>(
        &'a self,
        command: &'a ToolCommand,
        timeout: Option<Duration>,
    ) -> BoxFuture<'a, Result<ToolOutput, Md2PdfError>> {
        Box::pin(run_system(command, timeout))
    }
}

async fn run_system(
    command: &ToolCommand,
    timeout: Option<Duration>,
) -> Result<ToolOutput, Md2PdfError> {
    let mut cmd = tokio::process::Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    if let Some(ref dir) = command.current_dir {
        cmd.current_dir(dir);
    }

    debug!("Running: {}", command.display());

    let child = cmd.spawn().map_err(|e| Md2PdfError::ToolSpawnFailed {
        tool: command.tool,
        program: command.program.clone(),
        source: e,
    })?;
    let mut group = ProcessGroup::new(child.id());

    let waited = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| Md2PdfError::ToolTimeout {
                tool: command.tool,
                secs: limit.as_secs(),
            })?,
        None => child.wait_with_output().await,
    };
    group.release();

    let output = waited.map_err(|e| {
        Md2PdfError::Internal(format!("Failed to collect {} output: {e}", command.tool))
    })?;

    let result = ToolOutput {
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!("{} finished with {}", command.tool, result.status_text());
    Ok(result)
}

/// Kills a tool's whole process group on drop unless released first.
///
/// The tool is its own group leader, so the group id equals its pid.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    /// The tool exited by itself; leave the group alone.
    fn release(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.and_then(|p| libc::pid_t::try_from(p).ok()) {
            debug!("Killing process group {pgid}");
            // SAFETY: killpg only sends a signal. The group id stays reserved
            // while any member is alive, so it cannot name another group.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
}

/// Scripted runner for unit tests: fabricates each tool's output file.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    pub(crate) const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    pub(crate) const SVG_TEXT: &str =
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"10\" height=\"10\"></svg>";

    #[derive(Default)]
    pub(crate) struct FakeRunner {
        pub calls: Mutex<Vec<ToolCommand>>,
        /// Tool that exits non-zero.
        pub fail: Option<Tool>,
        /// Tool that exits zero but writes nothing.
        pub silent: Option<Tool>,
    }

    impl FakeRunner {
        pub(crate) fn calls_for(&self, tool: Tool) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.tool == tool)
                .count()
        }
    }

    impl ToolRunner for FakeRunner {
        fn run<'a>(
            &'a self,
            command: &'a ToolCommand,
            _timeout: Option<Duration>,
        ) -> BoxFuture<'a, Result<ToolOutput, Md2PdfError>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(command.clone());
                if self.fail == Some(command.tool) {
                    return Ok(ToolOutput::failed(1, format!("{} exploded", command.tool)));
                }
                if self.silent == Some(command.tool) {
                    return Ok(ToolOutput::ok());
                }
                match command.tool {
                    Tool::DiagramRenderer => {
                        let out = PathBuf::from(command.value_after("-o").unwrap());
                        if out.extension().is_some_and(|e| e == "png") {
                            std::fs::write(&out, PNG_BYTES).unwrap();
                        } else {
                            std::fs::write(&out, SVG_TEXT).unwrap();
                        }
                    }
                    Tool::DocumentConverter => {
                        let out = PathBuf::from(command.value_after("-o").unwrap());
                        std::fs::write(&out, "<!DOCTYPE html><html><body></body></html>")
                            .unwrap();
                    }
                    Tool::Browser => {
                        let arg = command
                            .args
                            .iter()
                            .find_map(|a| {
                                a.to_str()
                                    .and_then(|s| s.strip_prefix("--print-to-pdf="))
                                    .map(PathBuf::from)
                            })
                            .unwrap();
                        std::fs::write(&arg, b"%PDF-1.4\n%fake\n").unwrap();
                    }
                }
                Ok(ToolOutput::ok())
            })
        }
    }
}
