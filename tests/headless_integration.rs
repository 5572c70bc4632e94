//! End-to-end tests for the headless runner
//!
//! Jobs run real `/bin/sh` workers; update checks run against a feed directory
//! on disk.
//!
//! Run with: cargo test --test headless_integration

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use tokio::sync::mpsc;

use scrapedeck::{check_update, run_job_with, Command, JobOutcome};
use scrapedeck_app::{
    ControlSurface, FeedDirTransport, JobSupervisor, MemorySettingsStore, UpdateChecker,
};
use scrapedeck_core::{Error, JobFailure, JobState, UpdateStatus};
use scrapedeck_worker::test_utils::{scripted_run, sh_resolver};
use scrapedeck_worker::{JobRequest, RunMode, StaticResolver, WorkerInvocation};

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

fn surface_for(
    resolver: StaticResolver,
    feed_dir: &Path,
    staging: &Path,
) -> ControlSurface<FeedDirTransport> {
    ControlSurface::new(
        JobSupervisor::new(Arc::new(resolver), RunMode::Development),
        UpdateChecker::new(FeedDirTransport::new(feed_dir, staging, "0.3.0")),
        Arc::new(MemorySettingsStore::new()),
    )
}

fn job_surface(script: &str) -> ControlSurface<FeedDirTransport> {
    let temp = std::env::temp_dir();
    surface_for(sh_resolver(script), &temp, &temp)
}

fn request() -> JobRequest {
    JobRequest {
        manufacturer: "lodes".into(),
        items: Some(vec!["kelly".into(), "megaphone".into()]),
        ..Default::default()
    }
}

fn no_commands() -> mpsc::Receiver<Command> {
    let (_tx, rx) = mpsc::channel(1);
    rx
}

async fn run(
    surface: &ControlSurface<FeedDirTransport>,
    commands: mpsc::Receiver<Command>,
) -> JobOutcome {
    tokio::time::timeout(
        Duration::from_secs(10),
        run_job_with(surface, request(), commands),
    )
    .await
    .expect("run did not finish")
    .expect("run failed")
}

fn write_feed(dir: &Path, version: &str) -> PathBuf {
    let installer = format!("scrapedeck-{}.dmg", version);
    std::fs::write(dir.join(&installer), vec![7u8; 200 * 1024]).unwrap();
    std::fs::write(
        dir.join("latest.toml"),
        format!("version = \"{}\"\ninstaller = \"{}\"\n", version, installer),
    )
    .unwrap();
    dir.join(installer)
}

// ─────────────────────────────────────────────────────────
// Jobs
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_successful_run_reports_progress() {
    let surface = job_surface(&scripted_run(0));

    let outcome = run(&surface, no_commands()).await;

    assert_eq!(outcome.state, JobState::Succeeded);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.progress.total, Some(2));
    assert_eq!(outcome.progress.succeeded, 1);
    assert_eq!(outcome.progress.failed, 1);
    assert!(outcome.progress.finished);
    assert_eq!(surface.job_state(), JobState::Idle);
}

#[tokio::test]
async fn test_failing_worker_maps_exit_code() {
    let surface = job_surface(&scripted_run(2));

    let outcome = run(&surface, no_commands()).await;

    assert_eq!(
        outcome.state,
        JobState::Failed(JobFailure::Exit { code: Some(2) })
    );
    assert_eq!(outcome.exit_code(), 1);
    // Progress still reflects what the worker reported before failing
    assert!(outcome.progress.finished);
}

#[tokio::test]
async fn test_stop_command_stops_job() {
    let surface = job_surface("echo started; exec sleep 60");
    let (tx, rx) = mpsc::channel(1);
    tx.send(Command::Stop).await.unwrap();

    let outcome = run(&surface, rx).await;

    assert_eq!(outcome.state, JobState::Stopped);
    assert_eq!(outcome.exit_code(), 130);
    assert!(!surface.jobs().is_running());
}

#[tokio::test]
async fn test_invalid_request_is_rejected() {
    let surface = job_surface(&scripted_run(0));
    let request = JobRequest {
        manufacturer: "lodes".into(),
        ..Default::default()
    };

    let err = run_job_with(&surface, request, no_commands())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config { .. }));
    assert_eq!(surface.job_state(), JobState::Idle);
}

#[tokio::test]
async fn test_missing_worker_fails_to_spawn() {
    let temp = tempdir().unwrap();
    let resolver = StaticResolver::new(WorkerInvocation {
        executable: temp.path().join("scraper"),
        prefix_args: Vec::new(),
        working_dir: temp.path().to_path_buf(),
    });
    let surface = surface_for(resolver, temp.path(), temp.path());

    let outcome = run(&surface, no_commands()).await;

    assert!(matches!(
        outcome.state,
        JobState::Failed(JobFailure::Spawn { .. })
    ));
    assert_eq!(outcome.progress.total, None);
}

#[tokio::test]
async fn test_sequential_runs_get_fresh_ids() {
    let surface = job_surface(&scripted_run(0));

    let first = run(&surface, no_commands()).await;
    let second = run(&surface, no_commands()).await;

    assert!(second.job_id > first.job_id);
    assert_eq!(second.state, JobState::Succeeded);
}

// ─────────────────────────────────────────────────────────
// Updates
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_check_update_downloads_newer_release() {
    let feed = tempdir().unwrap();
    let staging = tempdir().unwrap();
    write_feed(feed.path(), "9.9.9");
    let surface = surface_for(sh_resolver("exit 0"), feed.path(), staging.path());

    let status = tokio_test::assert_ok!(check_update(&surface, false).await);

    assert_eq!(
        status,
        UpdateStatus::Downloaded {
            version: "9.9.9".to_string()
        }
    );
    let staged = surface.updates().transport().staged_installer().unwrap();
    assert!(staged.starts_with(staging.path()));
    assert_eq!(std::fs::metadata(staged).unwrap().len(), 200 * 1024);
}

#[tokio::test]
async fn test_check_update_when_current() {
    let feed = tempdir().unwrap();
    let staging = tempdir().unwrap();
    write_feed(feed.path(), "0.3.0");
    let surface = surface_for(sh_resolver("exit 0"), feed.path(), staging.path());

    let status = tokio_test::assert_ok!(check_update(&surface, true).await);

    assert_eq!(status, UpdateStatus::NotAvailable);
    assert!(surface.updates().transport().staged_installer().is_none());
}

#[tokio::test]
async fn test_check_update_without_manifest_reports_error() {
    let feed = tempdir().unwrap();
    let staging = tempdir().unwrap();
    let surface = surface_for(sh_resolver("exit 0"), feed.path(), staging.path());

    let status = tokio_test::assert_ok!(check_update(&surface, false).await);

    assert!(matches!(status, UpdateStatus::Error { .. }));
    // A new cycle may be opened after the error
    tokio_test::assert_ok!(surface.check_for_update());
}
