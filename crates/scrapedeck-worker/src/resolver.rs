//! Worker executable resolution
//!
//! The worker is run differently depending on how scrapedeck is deployed:
//! from a source checkout it is `python -m src.cli` inside the project
//! directory; in a packaged install it is a bundled `scraper` executable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use scrapedeck_core::prelude::*;

/// How scrapedeck is deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Development,
    Packaged,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Development => write!(f, "development"),
            RunMode::Packaged => write!(f, "packaged"),
        }
    }
}

/// Everything needed to launch the worker, minus the job arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInvocation {
    /// Absolute path of the program to execute
    pub executable: PathBuf,
    /// Arguments placed before the job arguments (e.g. `-m src.cli`)
    pub prefix_args: Vec<String>,
    /// Working directory of the worker process
    pub working_dir: PathBuf,
}

impl WorkerInvocation {
    /// Full argument list: prefix followed by the job arguments
    pub fn args_with(&self, job_args: &[String]) -> Vec<String> {
        self.prefix_args
            .iter()
            .cloned()
            .chain(job_args.iter().cloned())
            .collect()
    }
}

/// Resolves how to launch the worker for a deployment mode
pub trait EnvironmentResolver: Send + Sync {
    fn resolve(&self, mode: RunMode) -> Result<WorkerInvocation>;
}

/// Resolver for the two standard layouts.
///
/// - Development: Python interpreter from `PATH` (or the configured one),
///   `-m src.cli`, run inside `project_dir`.
/// - Packaged: `<resources_dir>/scraper[.exe]`, no prefix, run inside `resources_dir`.
#[derive(Debug, Clone)]
pub struct DefaultResolver {
    pub project_dir: PathBuf,
    pub resources_dir: PathBuf,
    /// Explicit interpreter; skips the `PATH` lookup when set
    pub python: Option<PathBuf>,
}

/// Name of the bundled worker executable
#[cfg(windows)]
pub const BUNDLED_EXECUTABLE: &str = "scraper.exe";
#[cfg(not(windows))]
pub const BUNDLED_EXECUTABLE: &str = "scraper";

impl DefaultResolver {
    pub fn new(project_dir: impl Into<PathBuf>, resources_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            resources_dir: resources_dir.into(),
            python: None,
        }
    }

    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = Some(python.into());
        self
    }

    fn resolve_development(&self) -> Result<WorkerInvocation> {
        let python = match &self.python {
            Some(path) => absolute(path)?,
            None => find_python()?,
        };
        let working_dir = absolute(&self.project_dir)?;

        debug!(
            "Resolved development worker: {} -m src.cli in {}",
            python.display(),
            working_dir.display()
        );

        Ok(WorkerInvocation {
            executable: python,
            prefix_args: vec!["-m".to_string(), "src.cli".to_string()],
            working_dir,
        })
    }

    fn resolve_packaged(&self) -> Result<WorkerInvocation> {
        let executable = self.resources_dir.join(BUNDLED_EXECUTABLE);
        if !executable.exists() {
            return Err(Error::worker_not_found(executable));
        }
        let executable = absolute(&executable)?;
        let working_dir = absolute(&self.resources_dir)?;

        debug!("Resolved packaged worker: {}", executable.display());

        Ok(WorkerInvocation {
            executable,
            prefix_args: Vec::new(),
            working_dir,
        })
    }
}

impl EnvironmentResolver for DefaultResolver {
    fn resolve(&self, mode: RunMode) -> Result<WorkerInvocation> {
        match mode {
            RunMode::Development => self.resolve_development(),
            RunMode::Packaged => self.resolve_packaged(),
        }
    }
}

/// Resolver that always returns the same invocation, regardless of mode
#[derive(Debug, Clone)]
pub struct StaticResolver {
    invocation: WorkerInvocation,
}

impl StaticResolver {
    pub fn new(invocation: WorkerInvocation) -> Self {
        Self { invocation }
    }
}

impl EnvironmentResolver for StaticResolver {
    fn resolve(&self, _mode: RunMode) -> Result<WorkerInvocation> {
        Ok(self.invocation.clone())
    }
}

/// Locate a Python interpreter on `PATH`.
///
/// Windows installs usually only ship `python`; elsewhere `python3` is preferred.
fn find_python() -> Result<PathBuf> {
    let candidates: &[&str] = if cfg!(windows) {
        &["python", "python3"]
    } else {
        &["python3", "python"]
    };

    candidates
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or(Error::PythonNotFound)
}

/// Canonicalize without the `\\?\` prefix on Windows
fn absolute(path: &Path) -> Result<PathBuf> {
    dunce::canonicalize(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::worker_not_found(path)
        } else {
            Error::Io(e)
        }
    })
}
