//! # tool-locate
//!
//! Find the external executables a document toolchain shells out to:
//! [Pandoc](https://pandoc.org), the [Mermaid CLI](https://github.com/mermaid-js/mermaid-cli)
//! (`mmdc`) and a Chrome/Chromium browser. Tools installed in the usual places
//! need no configuration.
//!
//! ## Resolution order
//!
//! [`locate`] tries, first match wins:
//!
//! 1. An **explicit path** passed by the caller (e.g. a `--chrome` flag).
//!    An explicit path that is not an executable file is an error; it is never
//!    silently replaced by something else.
//! 2. The tool's **environment override** (`CHROME_PATH`, `PANDOC_PATH`,
//!    `MMDC_PATH`). A set-but-invalid override falls through to discovery and
//!    is reported in the [`LocateError::NotFound`] message if discovery fails too.
//! 3. **Conventional install locations** for the current platform
//!    (`/Applications/Google Chrome.app/…`, `/usr/bin/chromium`, …).
//! 4. A **`PATH` lookup** of the tool's well-known executable names.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tool_locate::{locate, ToolSpec};
//!
//! let chrome = locate(&ToolSpec::chrome(), None).expect("Chrome unavailable");
//! println!("using {} ({:?})", chrome.path.display(), chrome.source);
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable overriding the browser executable.
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

/// Environment variable overriding the Pandoc executable.
pub const PANDOC_PATH_ENV: &str = "PANDOC_PATH";

/// Environment variable overriding the Mermaid CLI executable.
pub const MMDC_PATH_ENV: &str = "MMDC_PATH";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by tool discovery.
#[derive(Error, Debug)]
pub enum LocateError {
    /// No executable was found anywhere in the search order.
    #[error(
        "{tool} not found.\n\
Searched: {}\n{}\
Install it, or set {env_var}=/path/to/executable.",
        join_paths(.searched),
        describe_bad_override(.env_var, .rejected_override)
    )]
    NotFound {
        tool: String,
        env_var: String,
        searched: Vec<PathBuf>,
        /// Value of `env_var` when it was set but unusable.
        rejected_override: Option<PathBuf>,
    },

    /// The caller supplied a path explicitly and it is not an executable file.
    #[error("{tool} path '{path}' is not an executable file")]
    InvalidExplicitPath { tool: String, path: PathBuf },
}

impl LocateError {
    /// Name of the environment variable that would fix this error.
    pub fn env_var(&self) -> Option<&str> {
        match self {
            LocateError::NotFound { env_var, .. } => Some(env_var),
            LocateError::InvalidExplicitPath { .. } => None,
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(nothing)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_bad_override(env_var: &str, rejected: &Option<PathBuf>) -> String {
    match rejected {
        Some(p) => format!("{env_var} is set to '{}' but that is not an executable file.\n", p.display()),
        None => String::new(),
    }
}

// ── Tool description ─────────────────────────────────────────────────────────

/// Where a located executable came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateSource {
    Explicit,
    Environment,
    InstallLocation,
    SearchPath,
}

/// A successfully located executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub path: PathBuf,
    pub source: LocateSource,
}

/// Describes how to find one external tool.
///
/// The constructors [`ToolSpec::pandoc`], [`ToolSpec::mermaid_cli`] and
/// [`ToolSpec::chrome`] carry the platform defaults; the `with_*` methods
/// exist mostly so tests can isolate themselves from the host machine.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Human-readable tool name used in error messages.
    pub display_name: String,
    /// Environment variable holding an override path.
    pub env_var: String,
    /// Absolute install locations tried in order.
    pub candidates: Vec<PathBuf>,
    /// Executable names looked up on the search path.
    pub program_names: Vec<String>,
    /// Search path to use instead of `$PATH`.
    pub search_path: Option<OsString>,
}

impl ToolSpec {
    pub fn new(display_name: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            env_var: env_var.into(),
            candidates: Vec::new(),
            program_names: Vec::new(),
            search_path: None,
        }
    }

    /// Pandoc document converter.
    pub fn pandoc() -> Self {
        let mut candidates = vec![
            PathBuf::from("/opt/homebrew/bin/pandoc"),
            PathBuf::from("/usr/local/bin/pandoc"),
            PathBuf::from("/usr/bin/pandoc"),
        ];
        if let Some(local) = dirs::data_local_dir() {
            candidates.push(local.join("Pandoc").join("pandoc.exe"));
        }
        Self::new("Pandoc", PANDOC_PATH_ENV)
            .with_candidates(candidates)
            .with_program_names(platform_names(&["pandoc"]))
    }

    /// Mermaid CLI (`mmdc`), usually installed through npm.
    pub fn mermaid_cli() -> Self {
        let mut candidates = Vec::new();
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join("node_modules").join(".bin").join("mmdc"));
            candidates.push(home.join(".npm-global").join("bin").join("mmdc"));
        }
        candidates.push(PathBuf::from("/opt/homebrew/bin/mmdc"));
        candidates.push(PathBuf::from("/usr/local/bin/mmdc"));
        Self::new("Mermaid CLI (mmdc)", MMDC_PATH_ENV)
            .with_candidates(candidates)
            .with_program_names(platform_names(&["mmdc"]))
    }

    /// Google Chrome / Chromium for headless printing.
    pub fn chrome() -> Self {
        Self::new("Chrome/Chromium", CHROME_PATH_ENV)
            .with_candidates(chrome_install_locations())
            .with_program_names(platform_names(&[
                "google-chrome",
                "google-chrome-stable",
                "chromium",
                "chromium-browser",
                "chrome",
            ]))
    }

    pub fn with_env_var(mut self, env_var: impl Into<String>) -> Self {
        self.env_var = env_var.into();
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_program_names(mut self, names: Vec<String>) -> Self {
        self.program_names = names;
        self
    }

    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }
}

fn platform_names(names: &[&str]) -> Vec<String> {
    if cfg!(windows) {
        names
            .iter()
            .flat_map(|n| [format!("{n}.exe"), format!("{n}.cmd")])
            .collect()
    } else {
        names.iter().map(|n| n.to_string()).collect()
    }
}

/// Conventional Chrome/Chromium install locations for the current platform.
pub fn chrome_install_locations() -> Vec<PathBuf> {
    let mut out = Vec::new();

    if cfg!(target_os = "macos") {
        const APPS: [&str; 3] = [
            "Google Chrome.app/Contents/MacOS/Google Chrome",
            "Chromium.app/Contents/MacOS/Chromium",
            "Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
        ];
        for app in APPS {
            out.push(Path::new("/Applications").join(app));
        }
        if let Some(home) = dirs::home_dir() {
            for app in APPS {
                out.push(home.join("Applications").join(app));
            }
        }
    } else if cfg!(windows) {
        let roots = [
            std::env::var_os("ProgramFiles").map(PathBuf::from),
            std::env::var_os("ProgramFiles(x86)").map(PathBuf::from),
            dirs::data_local_dir(),
        ];
        for root in roots.into_iter().flatten() {
            out.push(root.join("Google").join("Chrome").join("Application").join("chrome.exe"));
            out.push(root.join("Chromium").join("Application").join("chrome.exe"));
        }
    } else {
        for p in [
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ] {
            out.push(PathBuf::from(p));
        }
    }

    out
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Locate the executable described by `spec`.
///
/// See the [crate docs](crate) for the resolution order.
pub fn locate(spec: &ToolSpec, explicit: Option<&Path>) -> Result<Located, LocateError> {
    // 1. Explicit path from the caller.
    if let Some(path) = explicit {
        if is_executable(path) {
            return Ok(Located {
                path: path.to_path_buf(),
                source: LocateSource::Explicit,
            });
        }
        return Err(LocateError::InvalidExplicitPath {
            tool: spec.display_name.clone(),
            path: path.to_path_buf(),
        });
    }

    // 2. Environment override.
    let mut rejected_override = None;
    if let Some(value) = std::env::var_os(&spec.env_var).filter(|v| !v.is_empty()) {
        let p = PathBuf::from(value);
        if is_executable(&p) {
            return Ok(Located {
                path: p,
                source: LocateSource::Environment,
            });
        }
        rejected_override = Some(p);
    }

    // 3. Install locations.
    let mut searched = Vec::new();
    for candidate in &spec.candidates {
        if is_executable(candidate) {
            return Ok(Located {
                path: candidate.clone(),
                source: LocateSource::InstallLocation,
            });
        }
        searched.push(candidate.clone());
    }

    // 4. Search path.
    let search_path = spec
        .search_path
        .clone()
        .or_else(|| std::env::var_os("PATH"))
        .unwrap_or_default();
    for name in &spec.program_names {
        if let Some(found) = find_in_search_path(name, &search_path) {
            return Ok(Located {
                path: found,
                source: LocateSource::SearchPath,
            });
        }
        searched.push(PathBuf::from(format!("$PATH/{name}")));
    }

    Err(LocateError::NotFound {
        tool: spec.display_name.clone(),
        env_var: spec.env_var.clone(),
        searched,
        rejected_override,
    })
}

/// Look `name` up in a `PATH`-style list of directories.
pub fn find_in_search_path(name: &str, search_path: &std::ffi::OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// Returns `true` if `path` is a regular file the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
