//! # scrapedeck-worker - Extraction Worker Process Management
//!
//! Spawns the extraction worker, drains its output streams, and turns raw
//! bytes into classified lines.
//!
//! Depends on [`scrapedeck_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Process Management
//! - [`WorkerProcess`] - Spawn, drain, and terminate one worker child process
//!
//! ### Environment
//! - [`EnvironmentResolver`] - Decide how the worker is launched per [`RunMode`]
//! - [`DefaultResolver`], [`StaticResolver`]
//!
//! ### Job Arguments
//! - [`JobRequest`] - Loose request from the UI layer
//! - [`JobConfig`] - Validated job; [`JobConfig::to_args()`] builds the worker argv
//!
//! ### Protocol Parsing
//! - [`LineSplitter`] - Chunked bytes to complete lines
//! - [`parse_worker_line()`] - Structured event or plain text

pub mod args;
pub mod process;
pub mod protocol;
pub mod resolver;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use args::{ConfigError, JobConfig, JobInput, JobRequest, JobToggles, KNOWN_TARGETS};
pub use process::WorkerProcess;
pub use protocol::{parse_worker_line, LineSplitter, WorkerLine, EVENT_MARKER};
pub use resolver::{
    DefaultResolver, EnvironmentResolver, RunMode, StaticResolver, WorkerInvocation,
    BUNDLED_EXECUTABLE,
};
