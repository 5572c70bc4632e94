//! scrapedeck - supervisor and headless driver for the product extraction worker
//!
//! The binary is a thin CLI over the workspace crates; the library half only
//! carries the headless runner so integration tests can drive it directly.

pub mod headless;

pub use headless::runner::{
    build_surface, check_update, parse_setting_value, run_job, run_job_with, Command, JobOutcome,
};
pub use headless::HeadlessEvent;
