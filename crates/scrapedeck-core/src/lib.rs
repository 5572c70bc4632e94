//! # scrapedeck-core - Core Domain Types
//!
//! Foundation crate for scrapedeck. Provides the worker event protocol types,
//! job and update lifecycle states, error handling, logging setup and pure
//! text transforms for worker log output.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, regex, tracing, dirs).
//!
//! ## Public API
//!
//! ### Events (`events`)
//! - [`StructuredEvent`] - `EVENT:`-prefixed JSON envelope from the worker
//! - [`EventKind`] - Typed view of the well-known structured events
//! - [`LogLine`], [`LogOrigin`] - Plain worker output and the stream it came from
//! - [`WorkerEvent`] - Raw events from the worker process tasks
//! - [`JobEvent`] - What the supervisor publishes to its observer
//! - [`JobProgress`] - Counters folded from structured events
//!
//! ### Lifecycle (`types`)
//! - [`JobState`], [`JobFailure`] - Job supervisor state machine
//! - [`UpdateStatus`] - Update checker state machine
//! - [`LogLevel`] - Log severity
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ### Text (`text`)
//! - [`strip_ansi_codes()`], [`prettify_log_line()`], [`dedupe_consecutive()`], [`detect_level()`]
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use scrapedeck_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod prelude;
pub mod text;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use events::{
    EventKind, JobEvent, JobProgress, LogLine, LogOrigin, ProductComplete, ScrapeComplete,
    ScrapeStart, StructuredEvent, WorkerEvent,
};
pub use text::{
    contains_ansi_codes, dedupe_consecutive, detect_level, prettify_log_line, strip_ansi_codes,
};
pub use types::{JobFailure, JobId, JobState, LogLevel, UpdateStatus};
