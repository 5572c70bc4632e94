//! File logging for the supervisor
//!
//! stdout belongs to the headless NDJSON stream, so all tracing output goes to
//! a daily rolling file: `scrapedeck.log.YYYY-MM-DD` under [`log_directory()`].

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

/// Tracing filter directive, e.g. `debug` or `scrapedeck_worker=trace`
pub const LOG_ENV_VAR: &str = "SCRAPEDECK_LOG";

/// Overrides the log directory
pub const LOG_DIR_ENV_VAR: &str = "SCRAPEDECK_LOG_DIR";

const LOG_FILE_PREFIX: &str = "scrapedeck.log";

/// Crates whose events pass the default filter below `warn`
const OWN_TARGETS: [&str; 4] = [
    "scrapedeck",
    "scrapedeck_core",
    "scrapedeck_worker",
    "scrapedeck_app",
];

/// Install the global subscriber.
///
/// Fails with [`Error::LoggingInit`] when a subscriber is already set, so a
/// caller may keep running without file logs.
///
/// ```bash
/// SCRAPEDECK_LOG=debug scrapedeck run -m lodes -s kelly
/// SCRAPEDECK_LOG=scrapedeck_worker=trace scrapedeck run -m lodes -s kelly
/// ```
pub fn init() -> Result<()> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    let directives = std::env::var(LOG_ENV_VAR).ok();
    let filter = build_filter(directives.as_deref());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .try_init()
        .map_err(|e| Error::LoggingInit(e.to_string()))?;

    tracing::info!(
        "Logging to {} (filter: {})",
        log_dir.display(),
        directives.as_deref().unwrap_or("default")
    );
    Ok(())
}

/// `SCRAPEDECK_LOG_DIR`, else `<data_local_dir>/scrapedeck/logs`
pub fn log_directory() -> PathBuf {
    resolve_log_directory(std::env::var_os(LOG_DIR_ENV_VAR).map(PathBuf::from))
}

fn resolve_log_directory(explicit: Option<PathBuf>) -> PathBuf {
    explicit.filter(|dir| !dir.as_os_str().is_empty()).unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scrapedeck")
            .join("logs")
    })
}

/// `info` for our own crates, `warn` for dependencies
fn default_directives() -> String {
    let mut directives: Vec<String> = OWN_TARGETS
        .iter()
        .map(|target| format!("{}=info", target))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

/// User directives when they parse, the default set otherwise
fn build_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives()))
}
