//! Job configuration and worker argument building
//!
//! [`JobRequest`] is the loosely-shaped payload coming from the UI layer.
//! [`JobConfig`] is its validated, immutable form; only a `JobConfig` can be
//! turned into a worker argument list.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Targets the worker ships scrapers for. Others are passed through untouched;
/// the worker itself rejects unknown manufacturers.
pub const KNOWN_TARGETS: &[&str] = &["lodes", "vibia"];

/// Rejections raised while validating a [`JobRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no input given: provide either an item list or an item file")]
    NoInput,

    #[error("item list and item file are mutually exclusive")]
    ConflictingInput,

    #[error("target manufacturer must not be empty")]
    EmptyTarget,

    #[error("item list contains no usable identifiers")]
    EmptyItems,
}

/// UI-facing job request, validated into a [`JobConfig`] at start time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobRequest {
    pub manufacturer: String,
    pub items: Option<Vec<String>>,
    pub items_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub skip_images: bool,
    pub ai_descriptions: bool,
    pub skip_translation: bool,
    pub verbose: bool,
}

/// Where the worker reads item identifiers from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobInput {
    Items(Vec<String>),
    File(PathBuf),
}

/// Feature toggles, each expressed relative to the worker's default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobToggles {
    /// Worker downloads images by default; `--no-images` disables it
    pub skip_images: bool,
    /// Off by default; `--ai-descriptions` enables it
    pub ai_descriptions: bool,
    /// Worker translates by default; `--no-translate` disables it
    pub skip_translation: bool,
    pub verbose: bool,
}

/// Validated, immutable description of one worker run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    target: String,
    input: JobInput,
    output_dir: Option<PathBuf>,
    toggles: JobToggles,
}

impl JobConfig {
    /// Build a config, validating target and input.
    ///
    /// Inline items are trimmed and empty entries dropped.
    pub fn new(
        target: impl Into<String>,
        input: JobInput,
        output_dir: Option<PathBuf>,
        toggles: JobToggles,
    ) -> Result<Self, ConfigError> {
        let target = target.into().trim().to_string();
        if target.is_empty() {
            return Err(ConfigError::EmptyTarget);
        }

        let input = match input {
            JobInput::Items(items) => {
                let items: Vec<String> = items
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if items.is_empty() {
                    return Err(ConfigError::EmptyItems);
                }
                JobInput::Items(items)
            }
            JobInput::File(path) => JobInput::File(path),
        };

        if !KNOWN_TARGETS.contains(&target.as_str()) {
            tracing::warn!("Unknown target '{}', passing through to worker", target);
        }

        Ok(Self {
            target,
            input,
            output_dir,
            toggles,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn input(&self) -> &JobInput {
        &self.input
    }

    pub fn output_dir(&self) -> Option<&PathBuf> {
        self.output_dir.as_ref()
    }

    pub fn toggles(&self) -> JobToggles {
        self.toggles
    }

    /// Worker arguments in a fixed order.
    ///
    /// Target first, then exactly one input flag, then the optional output
    /// directory, then one flag per toggle that deviates from the worker default.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["--manufacturer".to_string(), self.target.clone()];

        match &self.input {
            JobInput::Items(items) => {
                args.push("--skus".to_string());
                args.push(items.join(","));
            }
            JobInput::File(path) => {
                args.push("--skus-file".to_string());
                args.push(path.to_string_lossy().into_owned());
            }
        }

        if let Some(ref dir) = self.output_dir {
            args.push("--output".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }

        if self.toggles.skip_images {
            args.push("--no-images".to_string());
        }
        if self.toggles.ai_descriptions {
            args.push("--ai-descriptions".to_string());
        }
        if self.toggles.skip_translation {
            args.push("--no-translate".to_string());
        }
        if self.toggles.verbose {
            args.push("--verbose".to_string());
        }

        args
    }
}

impl TryFrom<JobRequest> for JobConfig {
    type Error = ConfigError;

    fn try_from(req: JobRequest) -> Result<Self, Self::Error> {
        let input = match (req.items, req.items_file) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingInput),
            (Some(items), None) => JobInput::Items(items),
            (None, Some(path)) => JobInput::File(path),
            (None, None) => return Err(ConfigError::NoInput),
        };

        let toggles = JobToggles {
            skip_images: req.skip_images,
            ai_descriptions: req.ai_descriptions,
            skip_translation: req.skip_translation,
            verbose: req.verbose,
        };

        JobConfig::new(req.manufacturer, input, req.output_dir, toggles)
    }
}
