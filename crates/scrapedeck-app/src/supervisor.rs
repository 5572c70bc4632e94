//! Job supervisor: owns at most one live worker and publishes its lifecycle
//!
//! `start` and `stop` only touch the live slot and return; everything that
//! happens afterwards (output, exit, kill failures) reaches observers through
//! the [`ObserverBridge`] from a per-job pump task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use scrapedeck_core::prelude::*;
use scrapedeck_core::{JobEvent, JobFailure, JobId, JobState, LogLine, WorkerEvent};
use scrapedeck_worker::{
    parse_worker_line, ConfigError, EnvironmentResolver, JobConfig, RunMode, WorkerLine,
    WorkerProcess,
};

use crate::bridge::{ObserverBridge, Subscription};

/// Capacity of the worker event channel feeding the pump
const WORKER_EVENT_BUFFER: usize = 256;

/// How long `start` waits for a stopped predecessor to finish exiting
const PREVIOUS_EXIT_GRACE: Duration = Duration::from_secs(5);

/// `start` accepted the job; its outcome arrives as events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub job_id: JobId,
}

/// `stop` requested termination and relinquished the handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped {
    pub job_id: JobId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("invalid job configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("a job is already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StopError {
    #[error("no job is running")]
    NotRunning,
}

/// The one live worker run
struct JobHandle {
    id: JobId,
    pid: Option<u32>,
    state: JobState,
    created_at: DateTime<Local>,
    process: WorkerProcess,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Default)]
struct Slot {
    live: Option<JobHandle>,
    state: JobState,
    /// Pump of the most recent job; awaited before the next spawn
    last_pump: Option<JoinHandle<()>>,
}

struct Inner {
    resolver: Arc<dyn EnvironmentResolver>,
    mode: RunMode,
    events: ObserverBridge<JobEvent>,
    slot: Mutex<Slot>,
    next_id: AtomicU64,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Record `state` for `job_id` and publish it.
    ///
    /// A finished job whose slot has since been taken by a newer job only
    /// publishes; it never overwrites the newer job's state.
    fn transition(&self, job_id: JobId, state: JobState) {
        {
            let mut slot = self.slot();
            let owns_slot = match slot.live.as_mut() {
                Some(handle) if handle.id == job_id => {
                    handle.state = state.clone();
                    true
                }
                Some(_) => false,
                None => true,
            };
            if owns_slot {
                slot.state = state.clone();
            }
        }

        info!("Job {} -> {}", job_id, state.label());
        self.events.publish(&JobEvent::StateChanged { job_id, state });
    }
}

/// Supervises the extraction worker.
///
/// Cheap to clone; clones share the same slot and observers.
#[derive(Clone)]
pub struct JobSupervisor {
    inner: Arc<Inner>,
    /// Serializes `start` calls so the live-slot check and the spawn are one step
    start_gate: Arc<tokio::sync::Mutex<()>>,
}

impl JobSupervisor {
    pub fn new(resolver: Arc<dyn EnvironmentResolver>, mode: RunMode) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                mode,
                events: ObserverBridge::new(),
                slot: Mutex::new(Slot::default()),
                next_id: AtomicU64::new(1),
            }),
            start_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Subscribe to lifecycle, output and error events of every job
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn job_state(&self) -> JobState {
        self.inner.slot().state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.slot().live.is_some()
    }

    /// Launch a worker for `config`.
    ///
    /// Rejected with [`StartError::AlreadyRunning`] while a job is live, with no
    /// side effects. Otherwise the job is accepted and publishes `Starting`;
    /// a spawn failure is reported as `Failed` followed by `Idle`, never as an
    /// error from this call.
    pub async fn start(&self, config: JobConfig) -> std::result::Result<Accepted, StartError> {
        let _gate = self.start_gate.lock().await;

        let previous = {
            let mut slot = self.inner.slot();
            if slot.live.is_some() {
                debug!("Start rejected: job already running");
                return Err(StartError::AlreadyRunning);
            }
            slot.last_pump.take()
        };

        if let Some(pump) = previous {
            wait_for_previous(pump).await;
        }

        let job_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (event_tx, event_rx) = mpsc::channel::<WorkerEvent>(WORKER_EVENT_BUFFER);

        let spawned = self
            .inner
            .resolver
            .resolve(self.inner.mode)
            .and_then(|invocation| WorkerProcess::spawn(&invocation, &config.to_args(), event_tx));

        let process = match spawned {
            Ok(process) => process,
            Err(e) => {
                error!("Job {} failed to start: {}", job_id, e);
                self.inner.transition(job_id, JobState::Starting);
                self.inner.transition(
                    job_id,
                    JobState::Failed(JobFailure::Spawn {
                        reason: e.to_string(),
                    }),
                );
                self.inner.transition(job_id, JobState::Idle);
                return Ok(Accepted { job_id });
            }
        };

        // The slot is filled before `Starting` goes out, so a stop issued by
        // an observer of `Starting` finds the job. Output stays queued in the
        // channel until the pump starts below.
        self.inner.slot().live = Some(JobHandle {
            id: job_id,
            pid: process.id(),
            state: JobState::Idle,
            created_at: Local::now(),
            process,
        });
        self.inner.transition(job_id, JobState::Starting);
        self.inner.transition(job_id, JobState::Running);

        let pump = tokio::spawn(pump_job(Arc::clone(&self.inner), job_id, event_rx));
        self.inner.slot().last_pump = Some(pump);

        Ok(Accepted { job_id })
    }

    /// Request termination of the live job and relinquish it.
    ///
    /// Returns without waiting for the worker to die; `Stopped` (or the real
    /// outcome, if the worker exited first) arrives as an event.
    pub fn stop(&self) -> std::result::Result<Stopped, StopError> {
        let handle = self.inner.slot().live.take();

        let Some(mut handle) = handle else {
            debug!("Stop requested with no live job");
            return Err(StopError::NotRunning);
        };

        info!(
            "Stopping job {} (PID: {:?}, {} since {})",
            handle.id,
            handle.pid,
            handle.state.label(),
            handle.created_at.format("%H:%M:%S")
        );
        handle.process.kill();

        Ok(Stopped { job_id: handle.id })
    }
}

/// Wait for a previous job's pump so its terminal events precede the next
/// job's `Starting`.
async fn wait_for_previous(pump: JoinHandle<()>) {
    if pump.is_finished() {
        return;
    }
    debug!("Waiting for previous worker to exit");
    match tokio::time::timeout(PREVIOUS_EXIT_GRACE, pump).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Previous job pump failed: {}", e),
        Err(_) => warn!(
            "Previous worker still exiting after {:?}, starting anyway",
            PREVIOUS_EXIT_GRACE
        ),
    }
}

/// Per-job task: classify worker output and react to exit
async fn pump_job(inner: Arc<Inner>, job_id: JobId, mut rx: mpsc::Receiver<WorkerEvent>) {
    let mut outcome: Option<JobState> = None;

    while let Some(event) = rx.recv().await {
        match event {
            WorkerEvent::Stdout(line) => match parse_worker_line(&line) {
                Some(WorkerLine::Event(event)) => {
                    inner
                        .events
                        .publish(&JobEvent::Structured { job_id, event });
                }
                Some(WorkerLine::Text(text)) => {
                    inner.events.publish(&JobEvent::Log {
                        job_id,
                        line: LogLine::stdout(text),
                    });
                }
                None => {}
            },
            WorkerEvent::Stderr(line) => {
                // stderr is never parsed for events; only blank lines are dropped
                if line.trim().is_empty() {
                    continue;
                }
                inner.events.publish(&JobEvent::Log {
                    job_id,
                    line: LogLine::stderr(line.trim_end()),
                });
            }
            WorkerEvent::KillFailed { reason } => {
                error!("Job {}: failed to terminate worker: {}", job_id, reason);
                inner.events.publish(&JobEvent::Error {
                    job_id,
                    message: format!("failed to terminate worker: {}", reason),
                });
            }
            WorkerEvent::Exited { code, killed } => {
                outcome = Some(exit_state(code, killed));
                break;
            }
        }
    }

    // Channel closed without Exited: the wait task is gone, treat as unknown exit
    let terminal = outcome.unwrap_or(JobState::Failed(JobFailure::Exit { code: None }));

    let still_live = {
        let mut slot = inner.slot();
        if slot.live.as_ref().map(|h| h.id) == Some(job_id) {
            slot.live = None;
        }
        slot.live.is_some()
    };

    inner.transition(job_id, terminal);
    if !still_live {
        inner.transition(job_id, JobState::Idle);
    }
}

fn exit_state(code: Option<i32>, killed: bool) -> JobState {
    match (code, killed) {
        (_, true) => JobState::Stopped,
        (Some(0), false) => JobState::Succeeded,
        (code, false) => JobState::Failed(JobFailure::Exit { code }),
    }
}
