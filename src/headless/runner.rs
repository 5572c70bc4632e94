//! Headless mode runner - drives one job or one update check to completion
//!
//! Each entry point subscribes to the relevant observer, forwards everything
//! it sees to stdout as [`HeadlessEvent`]s, and returns once the flow has
//! reached a terminal state.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use scrapedeck_app::{
    AppConfig, CheckError, ControlSurface, FeedDirTransport, JobSupervisor, MemorySettingsStore,
    SettingsStore, StartError, StopError, UpdateChecker, UpdateTransport,
};
use scrapedeck_core::prelude::*;
use scrapedeck_core::{JobEvent, JobFailure, JobId, JobProgress, JobState, UpdateStatus};
use scrapedeck_worker::JobRequest;

use super::signals::spawn_signal_handler;
use super::HeadlessEvent;

/// Out-of-band requests while a job runs (signals, stdin)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop,
}

/// How a headless run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub state: JobState,
    pub progress: JobProgress,
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == JobState::Succeeded
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self.state {
            JobState::Succeeded => 0,
            JobState::Stopped => 130,
            _ => 1,
        }
    }
}

/// Wire the supervisor and update checker from configuration
pub fn build_surface(
    config: &AppConfig,
    settings: Arc<dyn SettingsStore>,
) -> ControlSurface<FeedDirTransport> {
    let resolver = config.worker.resolver();
    let jobs = JobSupervisor::new(Arc::new(resolver), config.worker.mode);

    // Without a feed, checks report the missing manifest as an Error status
    let feed_dir = config
        .updates
        .feed_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let transport = FeedDirTransport::new(
        feed_dir,
        FeedDirTransport::default_staging_dir(),
        config.updates.current_version.clone(),
    );

    ControlSurface::new(jobs, UpdateChecker::new(transport), settings)
        .with_default_output_dir(config.worker.default_output_dir.clone())
}

/// Run one job to completion, stopping it on SIGINT/SIGTERM or `q` on stdin
pub async fn run_job(config: &AppConfig, request: JobRequest) -> Result<JobOutcome> {
    info!("═══════════════════════════════════════════════════════");
    info!("scrapedeck starting in HEADLESS mode");
    info!("Target: {} ({} mode)", request.manufacturer, config.worker.mode);
    info!("═══════════════════════════════════════════════════════");

    let surface = build_surface(config, Arc::new(MemorySettingsStore::new()));

    // Automatic update checks run alongside the job and report as `update` lines
    let updates =
        surface.subscribe_to_update_status(|status| HeadlessEvent::update(status).emit());
    surface.start_periodic_checks(&config.updates);

    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(4);
    spawn_signal_handler(cmd_tx.clone());
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(cmd_tx);
    });

    let result = run_job_with(&surface, request, cmd_rx).await;
    surface.shutdown();
    updates.unsubscribe();

    info!("scrapedeck headless mode exiting");
    result
}

/// Event loop for one job on an already-built surface
pub async fn run_job_with<T>(
    surface: &ControlSurface<T>,
    request: JobRequest,
    mut commands: mpsc::Receiver<Command>,
) -> Result<JobOutcome>
where
    T: UpdateTransport + Sync + 'static,
{
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<JobEvent>();
    let subscription = surface.subscribe_to_job_events(move |event| {
        let _ = event_tx.send(event.clone());
    });

    let job_id = match surface.start_job(request).await {
        Ok(accepted) => accepted.job_id,
        Err(e) => {
            subscription.unsubscribe();
            let message = e.to_string();
            HeadlessEvent::error(message.clone(), true).emit();
            return Err(match e {
                StartError::InvalidConfig(_) => Error::config(message),
                StartError::AlreadyRunning => Error::process(message),
            });
        }
    };

    let mut progress = JobProgress::default();
    let mut terminal: Option<JobState> = None;
    let mut commands_open = true;

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    warn!("Job event channel closed");
                    break;
                };
                if event.job_id() != job_id {
                    continue;
                }

                match &event {
                    JobEvent::Structured { event: structured, .. } => {
                        progress.apply(structured);
                        HeadlessEvent::progress(
                            job_id,
                            &structured.event_type,
                            structured.data.clone(),
                            progress.percent(),
                        )
                        .emit();
                    }
                    JobEvent::StateChanged { state, .. } => {
                        HeadlessEvent::job_state(job_id, state).emit();
                        if state.is_terminal() {
                            terminal = Some(state.clone());
                        } else if *state == JobState::Idle && terminal.is_some() {
                            break;
                        }
                    }
                    other => HeadlessEvent::from_job_event(other).emit(),
                }
            }
            command = commands.recv(), if commands_open => match command {
                Some(Command::Stop) => match surface.stop_job() {
                    Ok(stopped) => info!("Stop requested for job {}", stopped.job_id),
                    Err(StopError::NotRunning) => debug!("Stop requested, job already finished"),
                },
                None => commands_open = false,
            },
        }
    }

    subscription.unsubscribe();

    let state = terminal.unwrap_or(JobState::Failed(JobFailure::Exit { code: None }));
    HeadlessEvent::summary(job_id, progress.succeeded, progress.failed, progress.total).emit();

    Ok(JobOutcome {
        job_id,
        state,
        progress,
    })
}

/// Run one update check cycle; optionally launch the installer afterwards
pub async fn check_update<T>(surface: &ControlSurface<T>, install: bool) -> Result<UpdateStatus>
where
    T: UpdateTransport + Sync + 'static,
{
    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<UpdateStatus>();
    let subscription = surface.subscribe_to_update_status(move |status| {
        let _ = status_tx.send(status.clone());
    });

    if let Err(CheckError::AlreadyChecking) = surface.check_for_update() {
        subscription.unsubscribe();
        return Err(Error::update("an update check is already in progress"));
    }

    let mut last = None;
    while let Some(status) = status_rx.recv().await {
        HeadlessEvent::update(&status).emit();
        let done = status.is_terminal();
        last = Some(status);
        if done {
            break;
        }
    }
    subscription.unsubscribe();

    let status = last.ok_or_else(|| Error::update("update checker went away"))?;

    if install {
        match &status {
            UpdateStatus::Downloaded { version } => {
                info!("Launching installer for {}", version);
                if let Err(e) = surface.install_update().await {
                    HeadlessEvent::error(e.to_string(), false).emit();
                }
            }
            other => debug!("Nothing to install ({})", other.label()),
        }
    }

    Ok(status)
}

/// Interpret a command-line setting value: JSON if it parses, string otherwise
pub fn parse_setting_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Read stdin commands and forward them (blocking; run on its own thread)
fn spawn_stdin_reader_blocking(cmd_tx: mpsc::Sender<Command>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        match line {
            Ok(line) => {
                let trimmed = line.trim();
                match trimmed {
                    "q" | "quit" | "stop" => {
                        info!("Stdin: stop requested");
                        let _ = cmd_tx.blocking_send(Command::Stop);
                        break;
                    }
                    "" => {}
                    _ => {
                        warn!("Unknown stdin command: {}", trimmed);
                    }
                }
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    debug!("Stdin reader exiting");
}
