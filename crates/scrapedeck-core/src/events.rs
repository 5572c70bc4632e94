//! Domain event definitions

use serde::{Deserialize, Serialize};

use crate::types::{JobId, JobState};

// ─────────────────────────────────────────────────────────
// Worker Output
// ─────────────────────────────────────────────────────────

/// Which worker stream a plain log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOrigin {
    Stdout,
    Stderr,
}

/// A plain (non-structured) line of worker output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub text: String,
    pub origin: LogOrigin,
}

impl LogLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: LogOrigin::Stdout,
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: LogOrigin::Stderr,
        }
    }

    pub fn is_error(&self) -> bool {
        self.origin == LogOrigin::Stderr
    }
}

/// Structured progress event emitted by the worker.
///
/// The envelope is all the supervisor understands; `data` is forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl StructuredEvent {
    /// Typed view of the payload for the well-known event kinds
    pub fn kind(&self) -> EventKind {
        EventKind::from_event(self)
    }
}

/// Start-of-run payload: `{"total_skus": N}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScrapeStart {
    pub total_skus: u64,
}

/// Per-product completion payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProductComplete {
    pub sku: String,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// End-of-run summary payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScrapeComplete {
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(default)]
    pub output_path: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Typed interpretation of a [`StructuredEvent`].
///
/// Anything the UI does not know about, or a known type with an unexpected
/// payload shape, maps to `Unknown` rather than failing.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    ScrapeStart(ScrapeStart),
    ProductComplete(ProductComplete),
    ScrapeComplete(ScrapeComplete),
    Unknown {
        event_type: String,
        data: serde_json::Value,
    },
}

impl EventKind {
    fn from_event(event: &StructuredEvent) -> Self {
        let data = event.data.clone();
        match event.event_type.as_str() {
            "scrape_start" => serde_json::from_value(data.clone())
                .map(EventKind::ScrapeStart)
                .unwrap_or_else(|_| unknown_kind(&event.event_type, data)),
            "product_complete" => serde_json::from_value(data.clone())
                .map(EventKind::ProductComplete)
                .unwrap_or_else(|_| unknown_kind(&event.event_type, data)),
            "scrape_complete" => serde_json::from_value(data.clone())
                .map(EventKind::ScrapeComplete)
                .unwrap_or_else(|_| unknown_kind(&event.event_type, data)),
            _ => unknown_kind(&event.event_type, data),
        }
    }
}

fn unknown_kind(event_type: &str, data: serde_json::Value) -> EventKind {
    EventKind::Unknown {
        event_type: event_type.to_string(),
        data,
    }
}

/// Raw events from the worker process tasks, before classification
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// One complete stdout line (terminator stripped)
    Stdout(String),

    /// One complete stderr line (terminator stripped)
    Stderr(String),

    /// The OS refused the termination request
    KillFailed { reason: String },

    /// Worker has exited and both output streams are drained.
    /// `killed` is set when the exit was caused by a stop request.
    Exited { code: Option<i32>, killed: bool },
}

// ─────────────────────────────────────────────────────────
// Supervisor Output
// ─────────────────────────────────────────────────────────

/// Events the job supervisor publishes to its observer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEvent {
    /// Lifecycle transition
    StateChanged { job_id: JobId, state: JobState },

    /// Structured progress event from worker stdout
    Structured {
        job_id: JobId,
        event: StructuredEvent,
    },

    /// Plain log line from either stream
    Log { job_id: JobId, line: LogLine },

    /// Non-fatal supervisor-side fault (e.g. the kill request failed)
    Error { job_id: JobId, message: String },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::StateChanged { job_id, .. }
            | Self::Structured { job_id, .. }
            | Self::Log { job_id, .. }
            | Self::Error { job_id, .. } => *job_id,
        }
    }

    /// Returns a short string label for this event type (for logging/debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::Structured { .. } => "structured",
            Self::Log { .. } => "log",
            Self::Error { .. } => "error",
        }
    }
}

// ─────────────────────────────────────────────────────────
// Progress Aggregation
// ─────────────────────────────────────────────────────────

/// Counters the UI derives from structured events of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub total: Option<u64>,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub finished: bool,
}

impl JobProgress {
    /// Fold one structured event into the counters
    pub fn apply(&mut self, event: &StructuredEvent) {
        match event.kind() {
            EventKind::ScrapeStart(start) => {
                *self = Self {
                    total: Some(start.total_skus),
                    ..Self::default()
                };
            }
            EventKind::ProductComplete(done) => {
                self.completed = self.completed.saturating_add(1);
                if done.success {
                    self.succeeded = self.succeeded.saturating_add(1);
                } else {
                    self.failed = self.failed.saturating_add(1);
                }
            }
            EventKind::ScrapeComplete(summary) => {
                self.succeeded = summary.success_count;
                self.failed = summary.failure_count;
                self.completed = summary.success_count.saturating_add(summary.failure_count);
                self.finished = true;
            }
            EventKind::Unknown { .. } => {}
        }
    }

    /// Completion ratio in percent, when the total is known
    pub fn percent(&self) -> Option<u8> {
        let total = self.total?;
        if total == 0 {
            return Some(100);
        }
        let done = u128::from(self.completed.min(total));
        Some((done * 100 / u128::from(total)) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, data: serde_json::Value) -> StructuredEvent {
        StructuredEvent {
            event_type: event_type.to_string(),
            data,
            timestamp: Some("2026-01-01T00:00:00".to_string()),
        }
    }

    #[test]
    fn test_structured_event_deserializes_type_field() {
        let ev: StructuredEvent = serde_json::from_str(
            r#"{"type":"scrape_start","data":{"total_skus":2},"timestamp":"t1"}"#,
        )
        .unwrap();
        assert_eq!(ev.event_type, "scrape_start");
        assert_eq!(ev.data["total_skus"], 2);
        assert_eq!(ev.timestamp.as_deref(), Some("t1"));
    }

    #[test]
    fn test_kind_scrape_start() {
        let ev = event("scrape_start", json!({"total_skus": 3}));
        assert_eq!(
            ev.kind(),
            EventKind::ScrapeStart(ScrapeStart { total_skus: 3 })
        );
    }

    #[test]
    fn test_kind_mis_shaped_payload_is_unknown() {
        let ev = event("scrape_start", json!({"total": "three"}));
        assert!(matches!(ev.kind(), EventKind::Unknown { .. }));
    }

    #[test]
    fn test_kind_unrecognized_type_is_unknown() {
        let ev = event("image_downloaded", json!({"path": "a.jpg"}));
        match ev.kind() {
            EventKind::Unknown { event_type, data } => {
                assert_eq!(event_type, "image_downloaded");
                assert_eq!(data["path"], "a.jpg");
            }
            other => panic!("expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_job_event_serializes_with_tag() {
        let ev = JobEvent::Log {
            job_id: 4,
            line: LogLine::stderr("boom"),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["kind"], "log");
        assert_eq!(json["job_id"], 4);
        assert_eq!(json["line"]["origin"], "stderr");
        assert_eq!(ev.event_type(), "log");
        assert_eq!(ev.job_id(), 4);
    }

    #[test]
    fn test_progress_folds_events() {
        let mut progress = JobProgress::default();
        progress.apply(&event("scrape_start", json!({"total_skus": 4})));
        progress.apply(&event("product_complete", json!({"sku": "kelly"})));
        progress.apply(&event(
            "product_complete",
            json!({"sku": "megaphone", "success": false, "error": "404"}),
        ));

        assert_eq!(progress.total, Some(4));
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.succeeded, 1);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.percent(), Some(50));
        assert!(!progress.finished);

        progress.apply(&event(
            "scrape_complete",
            json!({"success_count": 3, "failure_count": 1}),
        ));
        assert!(progress.finished);
        assert_eq!(progress.completed, 4);
        assert_eq!(progress.percent(), Some(100));
    }

    #[test]
    fn test_structured_event_serializes_alongside_tag() {
        let ev = JobEvent::Structured {
            job_id: 2,
            event: event("scrape_start", json!({"total_skus": 1})),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["kind"], "structured");
        assert_eq!(json["event"]["type"], "scrape_start");
        assert_eq!(json["event"]["data"]["total_skus"], 1);
    }

    #[test]
    fn test_progress_saturates_on_huge_counts() {
        let mut progress = JobProgress::default();
        progress.apply(&event(
            "scrape_complete",
            json!({"success_count": u64::MAX, "failure_count": 1}),
        ));
        assert_eq!(progress.completed, u64::MAX);
        assert!(progress.finished);

        progress.apply(&event("product_complete", json!({"sku": "kelly"})));
        assert_eq!(progress.completed, u64::MAX);
        assert_eq!(progress.succeeded, u64::MAX);
    }

    #[test]
    fn test_percent_with_huge_total() {
        let mut progress = JobProgress::default();
        progress.apply(&event("scrape_start", json!({"total_skus": u64::MAX})));
        progress.apply(&event(
            "scrape_complete",
            json!({"success_count": 1u64 << 62, "failure_count": 0}),
        ));
        assert_eq!(progress.percent(), Some(25));

        progress.apply(&event(
            "scrape_complete",
            json!({"success_count": u64::MAX, "failure_count": u64::MAX}),
        ));
        assert_eq!(progress.percent(), Some(100));
    }

    #[test]
    fn test_progress_without_total_has_no_percent() {
        let progress = JobProgress::default();
        assert_eq!(progress.percent(), None);
    }
}
