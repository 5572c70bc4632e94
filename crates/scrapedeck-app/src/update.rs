//! Update checker state machine
//!
//! One cycle: `Checking`, then `NotAvailable`, `Error`, or `Available`
//! followed by the download (`Downloading` with a rising percentage) and
//! finally `Downloaded` or `Error`. A new cycle may only open once the
//! previous one has reached a terminal status.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use scrapedeck_core::prelude::*;
use scrapedeck_core::UpdateStatus;

use crate::bridge::{ObserverBridge, Subscription};
use crate::transport::UpdateTransport;

/// A new cycle has been opened with `Checking`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckStarted;

/// The installer was launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallTriggered;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("an update check is already in progress")]
    AlreadyChecking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InstallError {
    #[error("no update has been downloaded")]
    NothingDownloaded,
}

struct Shared<T> {
    transport: T,
    last: Mutex<Option<UpdateStatus>>,
    events: ObserverBridge<UpdateStatus>,
}

impl<T> Shared<T> {
    fn publish(&self, status: UpdateStatus) {
        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = Some(status.clone());
        debug!("Update status -> {}", status.label());
        self.events.publish(&status);
    }
}

/// Drives update cycles against an [`UpdateTransport`].
///
/// Cloning yields another handle to the same checker.
pub struct UpdateChecker<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for UpdateChecker<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> UpdateChecker<T>
where
    T: UpdateTransport + Sync + 'static,
{
    pub fn new(transport: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                last: Mutex::new(None),
                events: ObserverBridge::new(),
            }),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&UpdateStatus) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(listener)
    }

    /// Most recent status, `None` before the first check
    pub fn status(&self) -> Option<UpdateStatus> {
        self.shared
            .last
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    /// Open a new check cycle.
    ///
    /// `Checking` is published before this returns; the rest of the cycle runs
    /// in the background. Rejected without side effects while a cycle is open.
    pub fn check_now(&self) -> std::result::Result<CheckStarted, CheckError> {
        {
            let mut last = self.shared.last.lock().unwrap_or_else(|p| p.into_inner());
            if matches!(&*last, Some(status) if !status.is_terminal()) {
                debug!("Update check rejected: cycle in progress");
                return Err(CheckError::AlreadyChecking);
            }
            // Claim the cycle under the same lock as the check
            *last = Some(UpdateStatus::Checking);
        }

        info!("Checking for updates");
        self.shared.events.publish(&UpdateStatus::Checking);

        tokio::spawn(run_cycle(Arc::clone(&self.shared)));
        Ok(CheckStarted)
    }

    /// Launch the downloaded installer.
    ///
    /// Only valid when the last status is `Downloaded`. A transport failure
    /// is published as `Error` rather than returned.
    pub async fn install_downloaded(&self) -> std::result::Result<InstallTriggered, InstallError> {
        if !matches!(self.status(), Some(UpdateStatus::Downloaded { .. })) {
            return Err(InstallError::NothingDownloaded);
        }

        if let Err(e) = self.shared.transport.quit_and_install().await {
            error!("Failed to launch installer: {}", e);
            self.shared.publish(UpdateStatus::Error {
                message: e.to_string(),
            });
        }
        Ok(InstallTriggered)
    }

    /// Check on a fixed interval until `shutdown` flips to `true`.
    ///
    /// The first check runs immediately. A tick that lands while a cycle is
    /// still open is skipped.
    pub fn spawn_periodic(
        &self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let checker = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(CheckError::AlreadyChecking) = checker.check_now() {
                            trace!("Periodic update check skipped, cycle in progress");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Periodic update checks stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// Body of one check cycle, after `Checking` was published
async fn run_cycle<T>(shared: Arc<Shared<T>>)
where
    T: UpdateTransport + Sync + 'static,
{
    let info = match shared.transport.check_for_update().await {
        Ok(info) => info,
        Err(e) => {
            if e.is_recoverable() {
                warn!("Update check failed: {}", e);
            } else {
                error!("Update check failed: {}", e);
            }
            shared.publish(UpdateStatus::Error {
                message: e.to_string(),
            });
            return;
        }
    };

    let version = match (info.available, info.version) {
        (true, Some(version)) => version,
        (true, None) => {
            shared.publish(UpdateStatus::Error {
                message: "update reported without a version".to_string(),
            });
            return;
        }
        (false, _) => {
            info!("No update available");
            shared.publish(UpdateStatus::NotAvailable);
            return;
        }
    };

    info!("Update {} available, downloading", version);
    shared.publish(UpdateStatus::Available {
        version: version.clone(),
    });

    let (progress_tx, mut progress_rx) = mpsc::channel::<u8>(32);
    let download = shared.transport.download(progress_tx);
    tokio::pin!(download);

    let mut last_percent: Option<u8> = None;
    let mut report = |percent: u8| {
        let percent = percent.min(100);
        // Only strictly increasing values are published
        if last_percent.is_some_and(|last| percent <= last) {
            return;
        }
        last_percent = Some(percent);
        shared.publish(UpdateStatus::Downloading { percent });
    };

    let result = loop {
        tokio::select! {
            biased;
            Some(percent) = progress_rx.recv() => report(percent),
            result = &mut download => break result,
        }
    };

    // Progress sent just before the download resolved
    while let Ok(percent) = progress_rx.try_recv() {
        report(percent);
    }

    match result {
        Ok(()) => {
            info!("Update {} downloaded", version);
            shared.publish(UpdateStatus::Downloaded { version });
        }
        Err(e) => {
            warn!("Update download failed: {}", e);
            shared.publish(UpdateStatus::Error {
                message: e.to_string(),
            });
        }
    }
}
