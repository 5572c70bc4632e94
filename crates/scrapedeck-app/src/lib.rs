//! # scrapedeck-app - Job Supervision and Control Surface
//!
//! Builds on [`scrapedeck_worker`] to supervise one extraction job at a time,
//! runs the software-update state machine, and exposes both to the UI layer
//! through a single [`ControlSurface`].
//!
//! ## Public API
//!
//! ### Supervision
//! - [`JobSupervisor`] - Start/stop the worker, publish [`JobEvent`](scrapedeck_core::JobEvent)s
//! - [`StartError`], [`StopError`] - Synchronous rejections
//!
//! ### Updates
//! - [`UpdateChecker`] - `Checking -> ... -> Downloaded` cycles
//! - [`UpdateTransport`] - Release source; [`FeedDirTransport`] reads a feed directory
//!
//! ### Observers
//! - [`ObserverBridge`], [`Subscription`] - Listener registry with explicit unsubscribe
//!
//! ### Configuration
//! - [`AppConfig`], [`load_config()`]
//! - [`SettingsStore`] - UI key-value settings ([`TomlSettingsStore`], [`MemorySettingsStore`])

pub mod bridge;
pub mod config;
pub mod control;
pub mod settings;
pub mod supervisor;
pub mod transport;
pub mod update;

pub use bridge::{Listener, ObserverBridge, Subscription};
pub use config::{default_config_path, load_config, AppConfig, UpdateSettings, WorkerSettings};
pub use control::ControlSurface;
pub use settings::{MemorySettingsStore, SettingsStore, TomlSettingsStore};
pub use supervisor::{Accepted, JobSupervisor, StartError, StopError, Stopped};
pub use transport::{
    compare_versions, FeedDirTransport, FeedManifest, UpdateInfo, UpdateTransport, FEED_MANIFEST,
};
pub use update::{CheckError, CheckStarted, InstallError, InstallTriggered, UpdateChecker};
