//! Headless mode - NDJSON event output instead of a UI
//!
//! Drives the job supervisor and update checker from the command line and
//! writes one JSON object per line to stdout, so scripts (and the desktop
//! shell during development) can follow a run without scraping log text.
//!
//! # Example Output
//!
//! ```json
//! {"event":"job_state","job_id":1,"state":"running","detail":null,"timestamp":1704700001000}
//! {"event":"progress","job_id":1,"event_type":"product_complete","data":{"sku":"kelly","success":true},"percent":50,"timestamp":1704700002000}
//! {"event":"log","job_id":1,"level":"info","stream":"stderr","message":"Scraping kelly","timestamp":1704700003000}
//! ```

pub mod runner;
pub mod signals;

use chrono::Utc;
use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

use scrapedeck_core::{
    detect_level, prettify_log_line, JobEvent, JobFailure, JobId, JobState, LogOrigin,
    UpdateStatus,
};

/// Events emitted in headless mode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Supervisor lifecycle transition
    JobState {
        job_id: JobId,
        state: String,
        detail: Option<String>,
        timestamp: i64,
    },

    /// Structured worker event, forwarded with the running completion ratio
    Progress {
        job_id: JobId,
        event_type: String,
        data: serde_json::Value,
        percent: Option<u8>,
        timestamp: i64,
    },

    /// Plain worker output, cleaned for display
    Log {
        job_id: JobId,
        level: String,
        stream: LogOrigin,
        message: String,
        timestamp: i64,
    },

    /// End-of-run counters
    Summary {
        job_id: JobId,
        succeeded: u64,
        failed: u64,
        total: Option<u64>,
        timestamp: i64,
    },

    /// Update checker status
    Update {
        status: String,
        version: Option<String>,
        percent: Option<u8>,
        message: Option<String>,
        timestamp: i64,
    },

    /// Error occurred
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn job_state(job_id: JobId, state: &JobState) -> Self {
        let detail = match state {
            JobState::Failed(JobFailure::Exit { code: Some(code) }) => {
                Some(format!("exit code {}", code))
            }
            JobState::Failed(JobFailure::Exit { code: None }) => {
                Some("terminated by signal".to_string())
            }
            JobState::Failed(JobFailure::Spawn { reason }) => Some(reason.clone()),
            _ => None,
        };
        Self::JobState {
            job_id,
            state: state.label().to_string(),
            detail,
            timestamp: Self::now(),
        }
    }

    pub fn progress(
        job_id: JobId,
        event_type: &str,
        data: serde_json::Value,
        percent: Option<u8>,
    ) -> Self {
        Self::Progress {
            job_id,
            event_type: event_type.to_string(),
            data,
            percent,
            timestamp: Self::now(),
        }
    }

    /// Strips ANSI and loguru headers; the level comes from the raw line
    pub fn log(job_id: JobId, raw: &str, stream: LogOrigin) -> Self {
        Self::Log {
            job_id,
            level: detect_level(raw, stream).as_str().to_string(),
            stream,
            message: prettify_log_line(raw),
            timestamp: Self::now(),
        }
    }

    pub fn summary(job_id: JobId, succeeded: u64, failed: u64, total: Option<u64>) -> Self {
        Self::Summary {
            job_id,
            succeeded,
            failed,
            total,
            timestamp: Self::now(),
        }
    }

    pub fn update(status: &UpdateStatus) -> Self {
        let (version, percent, message) = match status {
            UpdateStatus::Available { version } | UpdateStatus::Downloaded { version } => {
                (Some(version.clone()), None, None)
            }
            UpdateStatus::Downloading { percent } => (None, Some(*percent), None),
            UpdateStatus::Error { message } => (None, None, Some(message.clone())),
            UpdateStatus::Checking | UpdateStatus::NotAvailable => (None, None, None),
        };
        Self::Update {
            status: status.label().to_string(),
            version,
            percent,
            message,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: Self::now(),
        }
    }

    /// Direct translation of a supervisor event, without progress tracking
    pub fn from_job_event(event: &JobEvent) -> Self {
        match event {
            JobEvent::StateChanged { job_id, state } => Self::job_state(*job_id, state),
            JobEvent::Structured { job_id, event } => {
                Self::progress(*job_id, &event.event_type, event.data.clone(), None)
            }
            JobEvent::Log { job_id, line } => Self::log(*job_id, &line.text, line.origin),
            JobEvent::Error { message, .. } => Self::error(message.clone(), false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrapedeck_core::{LogLine, StructuredEvent};
    use serde_json::json;

    #[test]
    fn test_job_state_serialization() {
        let event = HeadlessEvent::job_state(3, &JobState::Running);
        let value = serde_json::to_value(&event).expect("serialization failed");

        assert_eq!(value["event"], "job_state");
        assert_eq!(value["job_id"], 3);
        assert_eq!(value["state"], "running");
        assert!(value["detail"].is_null());
        assert!(value["timestamp"].is_number());
    }

    #[test]
    fn test_failed_state_carries_detail() {
        let event = HeadlessEvent::job_state(
            1,
            &JobState::Failed(JobFailure::Exit { code: Some(2) }),
        );
        let value = serde_json::to_value(&event).expect("serialization failed");

        assert_eq!(value["state"], "failed");
        assert_eq!(value["detail"], "exit code 2");
    }

    #[test]
    fn test_log_is_prettified() {
        let event = HeadlessEvent::log(
            7,
            "2026-01-12 10:31:07 | WARNING  | src.scraper:fetch - \x1b[33mretrying\x1b[0m",
            LogOrigin::Stderr,
        );
        let value = serde_json::to_value(&event).expect("serialization failed");

        assert_eq!(value["event"], "log");
        assert_eq!(value["level"], "warning");
        assert_eq!(value["stream"], "stderr");
        assert_eq!(value["message"], "retrying");
    }

    #[test]
    fn test_update_serialization() {
        let event = HeadlessEvent::update(&UpdateStatus::Downloading { percent: 42 });
        let value = serde_json::to_value(&event).expect("serialization failed");

        assert_eq!(value["event"], "update");
        assert_eq!(value["status"], "downloading");
        assert_eq!(value["percent"], 42);
        assert!(value["version"].is_null());
    }

    #[test]
    fn test_from_job_event() {
        let structured = JobEvent::Structured {
            job_id: 2,
            event: StructuredEvent {
                event_type: "scrape_start".to_string(),
                data: json!({"total_skus": 5}),
                timestamp: None,
            },
        };
        match HeadlessEvent::from_job_event(&structured) {
            HeadlessEvent::Progress {
                job_id,
                event_type,
                data,
                ..
            } => {
                assert_eq!(job_id, 2);
                assert_eq!(event_type, "scrape_start");
                assert_eq!(data["total_skus"], 5);
            }
            other => panic!("expected Progress, got {:?}", other),
        }

        let log = JobEvent::Log {
            job_id: 2,
            line: LogLine::stdout("Processing kelly"),
        };
        assert!(matches!(
            HeadlessEvent::from_job_event(&log),
            HeadlessEvent::Log { .. }
        ));
    }
}
