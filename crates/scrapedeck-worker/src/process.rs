//! Worker process management

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use scrapedeck_core::prelude::*;
use scrapedeck_core::WorkerEvent;

use crate::protocol::LineSplitter;
use crate::resolver::WorkerInvocation;

/// Read buffer size for the stdout/stderr drain loops
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// How long the wait task lets the readers flush after the child has exited.
/// A grandchild holding the pipes open would otherwise delay `Exited` forever.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Manages one extraction worker child process.
///
/// The `Child` is moved into a background `wait_for_exit` task, which also owns
/// the two stream reader tasks. `Exited` is only sent after both readers have
/// flushed their trailing partial lines, so every output line precedes it on the
/// event channel.
///
/// `WorkerProcess` keeps the kill channel and an atomic exit flag for
/// synchronous `has_exited()` checks.
pub struct WorkerProcess {
    pid: Option<u32>,
    /// Consumed on first use (or on drop)
    kill_tx: Option<oneshot::Sender<()>>,
    exited: Arc<AtomicBool>,
}

impl WorkerProcess {
    /// Spawn the worker described by `invocation` with the given job arguments.
    ///
    /// Must be called from within a Tokio runtime. Returns as soon as the OS has
    /// accepted the spawn; output and exit arrive on `event_tx`.
    pub fn spawn(
        invocation: &WorkerInvocation,
        job_args: &[String],
        event_tx: mpsc::Sender<WorkerEvent>,
    ) -> Result<Self> {
        let args = invocation.args_with(job_args);

        info!(
            "Spawning worker: {} {}",
            invocation.executable.display(),
            args.join(" ")
        );

        let mut child = Command::new(&invocation.executable)
            .args(&args)
            .current_dir(&invocation.working_dir)
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::worker_not_found(&invocation.executable)
                } else {
                    Error::ProcessSpawn {
                        reason: e.to_string(),
                    }
                }
            })?;

        let pid = child.id();
        info!("Worker process started with PID: {:?}", pid);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::process("worker stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::process("worker stderr was not captured"))?;

        let readers = [
            tokio::spawn(read_stream(
                stdout,
                event_tx.clone(),
                WorkerEvent::Stdout,
                "stdout",
            )),
            tokio::spawn(read_stream(
                stderr,
                event_tx.clone(),
                WorkerEvent::Stderr,
                "stderr",
            )),
        ];

        let exited = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(wait_for_exit(
            child,
            kill_rx,
            readers,
            event_tx,
            Arc::clone(&exited),
        ));

        Ok(Self {
            pid,
            kill_tx: Some(kill_tx),
            exited,
        })
    }

    /// Request termination of the worker.
    ///
    /// Returns immediately. The wait task performs the kill; a refused kill is
    /// reported as [`WorkerEvent::KillFailed`]. Calling this more than once, or
    /// after the worker has exited, does nothing.
    pub fn kill(&mut self) {
        match self.kill_tx.take() {
            Some(tx) => {
                info!("Requesting worker termination (PID: {:?})", self.pid);
                // The wait task may already have finished on its own
                let _ = tx.send(());
            }
            None => debug!("Kill already requested for worker {:?}", self.pid),
        }
    }

    /// Non-blocking check backed by the flag the wait task sets
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Get the process ID
    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        // kill_tx is gone once kill() was called; nothing left to request then
        if let Some(tx) = self.kill_tx.take() {
            if !self.has_exited() {
                warn!("WorkerProcess dropped while worker may still be running");
                let _ = tx.send(());
            }
        }
        // kill_on_drop(true) on the Child covers the window before the wait
        // task handles the kill.
        debug!("WorkerProcess dropped");
    }
}

/// Drain one output stream, emitting each complete line.
///
/// Reads raw chunks rather than lines so invalid UTF-8 never ends the loop.
async fn read_stream<R>(
    mut stream: R,
    tx: mpsc::Sender<WorkerEvent>,
    wrap: fn(String) -> WorkerEvent,
    label: &'static str,
) where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("Error reading worker {}: {}", label, e);
                break;
            }
        };

        for line in splitter.push(&buf[..n]) {
            trace!("{}: {}", label, line);
            if tx.send(wrap(line)).await.is_err() {
                debug!("{} channel closed", label);
                return;
            }
        }
    }

    if let Some(line) = splitter.finish() {
        trace!("{} (unterminated): {}", label, line);
        let _ = tx.send(wrap(line)).await;
    }

    debug!("{} reader finished", label);
}

/// Background task: owns `child`, waits for it to exit, emits `WorkerEvent::Exited`.
///
/// Either the worker exits on its own, or `kill_rx` fires and the child is
/// killed first. In both cases the readers are joined before `Exited` is sent.
async fn wait_for_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    readers: [JoinHandle<()>; 2],
    event_tx: mpsc::Sender<WorkerEvent>,
    exited: Arc<AtomicBool>,
) {
    let mut killed = false;

    let code: Option<i32> = tokio::select! {
        result = child.wait() => {
            match result {
                Ok(status) => {
                    info!("Worker exited with status: {:?}", status);
                    status.code()
                }
                Err(e) => {
                    error!("Error waiting for worker process: {}", e);
                    None
                }
            }
        }
        request = kill_rx => {
            match request {
                Ok(()) => {
                    killed = true;
                    info!("Kill requested, terminating worker");
                    if let Err(e) = child.start_kill() {
                        error!("Failed to kill worker process: {}", e);
                        let _ = event_tx
                            .send(WorkerEvent::KillFailed { reason: e.to_string() })
                            .await;
                    }
                }
                // Sender dropped without a kill request; keep waiting
                Err(_) => debug!("Kill channel closed without a request"),
            }
            match child.wait().await {
                Ok(status) => {
                    info!("Worker terminated, exit status: {:?}", status);
                    status.code()
                }
                Err(e) => {
                    error!("Error waiting after kill: {}", e);
                    None
                }
            }
        }
    };

    for reader in readers {
        match tokio::time::timeout(DRAIN_TIMEOUT, reader).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Worker output reader failed: {}", e),
            Err(_) => warn!("Worker output still open after exit, not waiting further"),
        }
    }

    // Flag before sending the event, so has_exited() is already true when
    // observers see Exited.
    exited.store(true, Ordering::Release);

    debug!("Sending WorkerEvent::Exited {{ code: {:?}, killed: {} }}", code, killed);
    let _ = event_tx.send(WorkerEvent::Exited { code, killed }).await;
}
