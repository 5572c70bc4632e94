//! Control surface consumed by the UI layer

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use scrapedeck_core::prelude::*;
use scrapedeck_core::{JobEvent, JobState, UpdateStatus};
use scrapedeck_worker::{JobConfig, JobRequest};

use crate::bridge::Subscription;
use crate::config::UpdateSettings;
use crate::settings::SettingsStore;
use crate::supervisor::{Accepted, JobSupervisor, StartError, StopError, Stopped};
use crate::transport::UpdateTransport;
use crate::update::{CheckError, CheckStarted, InstallError, InstallTriggered, UpdateChecker};

/// Everything the UI may call, in one place
pub struct ControlSurface<T> {
    jobs: JobSupervisor,
    updates: UpdateChecker<T>,
    settings: Arc<dyn SettingsStore>,
    default_output_dir: Option<std::path::PathBuf>,
    periodic: Mutex<Option<PeriodicChecks>>,
}

/// Running automatic update checks
struct PeriodicChecks {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<T> ControlSurface<T>
where
    T: UpdateTransport + Sync + 'static,
{
    pub fn new(
        jobs: JobSupervisor,
        updates: UpdateChecker<T>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            jobs,
            updates,
            settings,
            default_output_dir: None,
            periodic: Mutex::new(None),
        }
    }

    /// Output directory applied to requests that leave it unset
    pub fn with_default_output_dir(mut self, dir: Option<std::path::PathBuf>) -> Self {
        self.default_output_dir = dir;
        self
    }

    /// Validate `request` and start it.
    ///
    /// Configuration errors are returned here and nothing is spawned.
    pub async fn start_job(
        &self,
        mut request: JobRequest,
    ) -> std::result::Result<Accepted, StartError> {
        if request.output_dir.is_none() {
            request.output_dir = self.default_output_dir.clone();
        }
        let config = JobConfig::try_from(request)?;
        self.jobs.start(config).await
    }

    pub fn stop_job(&self) -> std::result::Result<Stopped, StopError> {
        self.jobs.stop()
    }

    pub fn subscribe_to_job_events<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        self.jobs.subscribe(listener)
    }

    pub fn job_state(&self) -> JobState {
        self.jobs.job_state()
    }

    pub fn check_for_update(&self) -> std::result::Result<CheckStarted, CheckError> {
        self.updates.check_now()
    }

    pub async fn install_update(&self) -> std::result::Result<InstallTriggered, InstallError> {
        self.updates.install_downloaded().await
    }

    pub fn subscribe_to_update_status<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&UpdateStatus) + Send + Sync + 'static,
    {
        self.updates.subscribe(listener)
    }

    pub fn get_setting(&self, key: &str) -> Option<Value> {
        self.settings.get(key)
    }

    pub fn set_setting(&self, key: &str, value: Value) -> Result<()> {
        self.settings.set(key, value)
    }

    /// Start automatic update checks if `settings` enable them.
    ///
    /// Returns whether checks are running afterwards. Calling again while they
    /// run does not start a second schedule.
    pub fn start_periodic_checks(&self, settings: &UpdateSettings) -> bool {
        let Some(period) = settings.auto_check_interval() else {
            debug!("Automatic update checks disabled");
            return false;
        };

        let mut periodic = self.periodic.lock().unwrap_or_else(|p| p.into_inner());
        if periodic.is_none() {
            info!("Automatic update checks every {:?}", period);
            let (shutdown, shutdown_rx) = watch::channel(false);
            let task = self.updates.spawn_periodic(period, shutdown_rx);
            *periodic = Some(PeriodicChecks { shutdown, task });
        }
        true
    }

    /// Signal the automatic checks to stop; the returned task ends shortly after
    pub fn stop_periodic_checks(&self) -> Option<JoinHandle<()>> {
        let periodic = self
            .periodic
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()?;
        let _ = periodic.shutdown.send(true);
        Some(periodic.task)
    }

    pub fn jobs(&self) -> &JobSupervisor {
        &self.jobs
    }

    pub fn updates(&self) -> &UpdateChecker<T> {
        &self.updates
    }

    /// Stop automatic checks and any live job. Safe to call when idle.
    pub fn shutdown(&self) {
        if self.stop_periodic_checks().is_some() {
            debug!("Automatic update checks stopped");
        }
        match self.jobs.stop() {
            Ok(stopped) => info!("Stopped job {} on shutdown", stopped.job_id),
            Err(StopError::NotRunning) => debug!("No job running at shutdown"),
        }
    }
}
