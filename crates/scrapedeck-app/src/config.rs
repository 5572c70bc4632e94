//! Application configuration (`config.toml`)
//!
//! ```toml
//! [worker]
//! mode = "development"
//! project_dir = "/home/me/product-scraper"
//! default_output_dir = "/home/me/exports"
//!
//! [updates]
//! feed_dir = "/Volumes/releases/scrapedeck"
//! auto_check = true
//! check_interval_secs = 14400
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use scrapedeck_core::prelude::*;
use scrapedeck_worker::{DefaultResolver, RunMode};

const CONFIG_FILENAME: &str = "config.toml";

/// Full application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub worker: WorkerSettings,
    pub updates: UpdateSettings,
}

/// `[worker]`: how to locate and launch the extraction worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub mode: RunMode,

    /// Source checkout of the worker (development mode)
    pub project_dir: PathBuf,

    /// Interpreter override; `PATH` lookup when unset
    pub python: Option<PathBuf>,

    /// Directory holding the bundled `scraper` executable (packaged mode).
    /// Defaults to the directory of the running binary.
    pub resources_dir: Option<PathBuf>,

    /// Output directory used when a job does not name one
    pub default_output_dir: Option<PathBuf>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            mode: RunMode::Development,
            project_dir: PathBuf::from("."),
            python: None,
            resources_dir: None,
            default_output_dir: None,
        }
    }
}

impl WorkerSettings {
    /// Build the resolver for these settings
    pub fn resolver(&self) -> DefaultResolver {
        let resources_dir = self.resources_dir.clone().unwrap_or_else(executable_dir);
        let resolver = DefaultResolver::new(self.project_dir.clone(), resources_dir);
        match &self.python {
            Some(python) => resolver.with_python(python),
            None => resolver,
        }
    }
}

/// `[updates]`: update feed and automatic check schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    /// Directory containing `latest.toml`; update checks are disabled when unset
    pub feed_dir: Option<PathBuf>,
    pub auto_check: bool,
    pub check_interval_secs: u64,
    /// Version compared against the feed
    pub current_version: String,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            feed_dir: None,
            auto_check: true,
            check_interval_secs: 4 * 60 * 60,
            current_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl UpdateSettings {
    /// Interval between automatic checks, never shorter than a minute
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(60))
    }

    /// Period for automatic checks; `None` when disabled or no feed is configured
    pub fn auto_check_interval(&self) -> Option<Duration> {
        (self.auto_check && self.feed_dir.is_some()).then(|| self.check_interval())
    }
}

/// `<config_dir>/scrapedeck/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scrapedeck")
        .join(CONFIG_FILENAME)
}

/// Load configuration from `path`.
///
/// Returns defaults if the file doesn't exist or fails to parse.
pub fn load_config(path: &Path) -> AppConfig {
    if !path.exists() {
        debug!("No config file at {:?}, using defaults", path);
        return AppConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                debug!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", path, e);
                AppConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            AppConfig::default()
        }
    }
}

fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = tempdir().unwrap();
        let config = load_config(&temp.path().join("config.toml"));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.worker.mode, RunMode::Development);
        assert!(config.updates.auto_check);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[worker]
mode = "packaged"
resources_dir = "/opt/scrapedeck/resources"

[updates]
check_interval_secs = 600
"#,
        )
        .unwrap();

        let config = load_config(&path);
        assert_eq!(config.worker.mode, RunMode::Packaged);
        assert_eq!(
            config.worker.resources_dir,
            Some(PathBuf::from("/opt/scrapedeck/resources"))
        );
        assert_eq!(config.worker.project_dir, PathBuf::from("."));
        assert_eq!(config.updates.check_interval(), Duration::from_secs(600));
        assert!(config.updates.auto_check);
    }

    #[test]
    fn test_invalid_file_gives_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[worker]\nmode = \"sideways\"\n").unwrap();
        assert_eq!(load_config(&path), AppConfig::default());
    }

    #[test]
    fn test_check_interval_has_floor() {
        let settings = UpdateSettings {
            check_interval_secs: 1,
            ..Default::default()
        };
        assert_eq!(settings.check_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_auto_check_needs_feed_and_flag() {
        let mut settings = UpdateSettings::default();
        assert_eq!(settings.auto_check_interval(), None);

        settings.feed_dir = Some(PathBuf::from("/tmp/feed"));
        assert_eq!(
            settings.auto_check_interval(),
            Some(Duration::from_secs(4 * 60 * 60))
        );

        settings.auto_check = false;
        assert_eq!(settings.auto_check_interval(), None);
    }

    #[test]
    fn test_resolver_uses_configured_python() {
        let settings = WorkerSettings {
            python: Some(PathBuf::from("/usr/bin/python3.12")),
            resources_dir: Some(PathBuf::from("/opt/res")),
            ..Default::default()
        };
        let resolver = settings.resolver();
        assert_eq!(resolver.python, Some(PathBuf::from("/usr/bin/python3.12")));
        assert_eq!(resolver.resources_dir, PathBuf::from("/opt/res"));
    }
}
