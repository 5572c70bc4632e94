//! Error taxonomy shared by every scrapedeck crate
//!
//! Operation-level rejections (`StartError`, `CheckError`, ...) live next to the
//! operations that raise them. This type covers the infrastructure underneath:
//! filesystem, worker discovery and launch, configuration, updates.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Packaged executable or project directory missing
    #[error("Worker executable not found: {path}")]
    WorkerNotFound { path: PathBuf },

    #[error("No Python interpreter found on PATH")]
    PythonNotFound,

    /// The OS refused to start the worker
    #[error("Failed to spawn worker process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("Worker process error: {message}")]
    Process { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Settings store error: {message}")]
    Settings { message: String },

    #[error("Update error: {message}")]
    Update { message: String },

    /// No release manifest in the configured feed directory
    #[error("Update feed not found: {path}")]
    FeedNotFound { path: PathBuf },

    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),
}

impl Error {
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings {
            message: message.into(),
        }
    }

    pub fn update(message: impl Into<String>) -> Self {
        Self::Update {
            message: message.into(),
        }
    }

    pub fn worker_not_found(path: impl Into<PathBuf>) -> Self {
        Self::WorkerNotFound { path: path.into() }
    }

    /// Transient failures: retrying later (next update tick, next `set`) may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Update { .. }
                | Error::FeedNotFound { .. }
                | Error::Settings { .. }
                | Error::Io(_)
        )
    }

    /// The environment cannot run the worker at all until someone fixes it
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::WorkerNotFound { .. } | Error::PythonNotFound | Error::LoggingInit(_)
        )
    }
}

/// Log-and-convert helpers for `Result`s headed into [`Error`]
pub trait ResultExt<T> {
    /// Log the failure under `context` at `error` level and convert it
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`context`](Self::context), building the message only on failure
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.with_context(|| context.into())
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            Error::process("pipe closed").to_string(),
            "Worker process error: pipe closed"
        );
        assert!(Error::PythonNotFound.to_string().contains("Python"));
        assert!(Error::worker_not_found("/opt/scrapedeck/scraper")
            .to_string()
            .contains("/opt/scrapedeck/scraper"));
    }

    #[test]
    fn test_io_converts() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_classification() {
        assert!(Error::PythonNotFound.is_fatal());
        assert!(Error::worker_not_found("/opt/scraper").is_fatal());
        assert!(!Error::PythonNotFound.is_recoverable());

        assert!(Error::update("network unreachable").is_recoverable());
        assert!(Error::settings("read-only").is_recoverable());
        assert!(!Error::update("offline").is_fatal());
        assert!(!Error::config("bad toml").is_recoverable());
    }

    #[test]
    fn test_context_preserves_error() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = res.context("reading settings").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
