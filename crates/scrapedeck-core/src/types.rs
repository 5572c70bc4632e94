//! Lifecycle and status types shared by the supervisor and the UI layer

use serde::{Deserialize, Serialize};

/// Identifier of one spawned worker run, unique per process lifetime
pub type JobId = u64;

/// Why a job ended in [`JobState::Failed`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailure {
    /// The worker exited on its own with a non-success status.
    /// `code` is `None` when the OS reports no code (killed by an outside signal).
    Exit { code: Option<i32> },

    /// The worker could not be spawned at all
    Spawn { reason: String },
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobFailure::Exit { code: Some(code) } => write!(f, "worker exited with code {}", code),
            JobFailure::Exit { code: None } => write!(f, "worker terminated by signal"),
            JobFailure::Spawn { reason } => write!(f, "failed to start worker: {}", reason),
        }
    }
}

/// Job supervisor lifecycle.
///
/// `Idle -> Starting -> Running -> {Succeeded | Failed | Stopped}`, then back to
/// `Idle` once the terminal transition has been cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Idle,
    Starting,
    Running,
    Succeeded,
    Failed(JobFailure),
    Stopped,
}

impl JobState {
    /// Terminal states end a run; the supervisor returns to `Idle` afterwards
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed(_) | JobState::Stopped
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Starting => "starting",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed(_) => "failed",
            JobState::Stopped => "stopped",
        }
    }
}

/// Status of the software-update flow.
///
/// One cycle always opens with `Checking`. `Downloading` may repeat with a
/// growing percentage. `NotAvailable`, `Downloaded` and `Error` close the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateStatus {
    Checking,
    Available { version: String },
    NotAvailable,
    Downloading { percent: u8 },
    Downloaded { version: String },
    Error { message: String },
}

impl UpdateStatus {
    /// Whether this status ends the current check cycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpdateStatus::NotAvailable
                | UpdateStatus::Downloaded { .. }
                | UpdateStatus::Error { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            UpdateStatus::Checking => "checking",
            UpdateStatus::Available { .. } => "available",
            UpdateStatus::NotAvailable => "not_available",
            UpdateStatus::Downloading { .. } => "downloading",
            UpdateStatus::Downloaded { .. } => "downloaded",
            UpdateStatus::Error { .. } => "error",
        }
    }
}

/// Log severity, detected from worker output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_terminal() {
        assert!(!JobState::Idle.is_terminal());
        assert!(!JobState::Starting.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Stopped.is_terminal());
        assert!(JobState::Failed(JobFailure::Exit { code: Some(1) }).is_terminal());
    }

    #[test]
    fn test_job_state_serializes_with_tag() {
        let json = serde_json::to_value(JobState::Failed(JobFailure::Exit { code: Some(1) }))
            .unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["kind"], "exit");
        assert_eq!(json["code"], 1);
    }

    #[test]
    fn test_job_failure_display() {
        assert_eq!(
            JobFailure::Exit { code: Some(2) }.to_string(),
            "worker exited with code 2"
        );
        assert!(JobFailure::Spawn {
            reason: "permission denied".into()
        }
        .to_string()
        .contains("permission denied"));
    }

    #[test]
    fn test_update_status_terminal() {
        assert!(!UpdateStatus::Checking.is_terminal());
        assert!(!UpdateStatus::Available {
            version: "1.2.0".into()
        }
        .is_terminal());
        assert!(!UpdateStatus::Downloading { percent: 40 }.is_terminal());
        assert!(UpdateStatus::NotAvailable.is_terminal());
        assert!(UpdateStatus::Downloaded {
            version: "1.2.0".into()
        }
        .is_terminal());
        assert!(UpdateStatus::Error {
            message: "offline".into()
        }
        .is_terminal());
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warning);
        assert!(LogLevel::Warning > LogLevel::Info);
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }
}
