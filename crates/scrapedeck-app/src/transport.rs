//! Update transport: where new releases come from
//!
//! [`UpdateTransport`] is the collaborator behind the [`UpdateChecker`](crate::UpdateChecker).
//! [`FeedDirTransport`] serves releases from a directory (a mounted share or a
//! synced folder) holding a `latest.toml` manifest next to the installers.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use scrapedeck_core::prelude::*;

/// Name of the release manifest inside a feed directory
pub const FEED_MANIFEST: &str = "latest.toml";

/// Copy chunk size for staging installers
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Answer of a version check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub available: bool,
    pub version: Option<String>,
}

impl UpdateInfo {
    pub fn available(version: impl Into<String>) -> Self {
        Self {
            available: true,
            version: Some(version.into()),
        }
    }

    pub fn none() -> Self {
        Self {
            available: false,
            version: None,
        }
    }
}

/// Release source used by the update checker
#[trait_variant::make(UpdateTransport: Send)]
pub trait LocalUpdateTransport {
    /// Ask whether a newer release exists
    async fn check_for_update(&self) -> Result<UpdateInfo>;

    /// Fetch the release found by the last check, reporting percent complete
    /// on `progress`. Resolves once the installer is ready.
    async fn download(&self, progress: mpsc::Sender<u8>) -> Result<()>;

    /// Launch the downloaded installer. The host is expected to exit afterwards.
    async fn quit_and_install(&self) -> Result<()>;
}

/// Contents of `latest.toml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedManifest {
    pub version: String,
    /// Installer file name, relative to the feed directory
    pub installer: PathBuf,
}

/// Releases published to a local or mounted directory
#[derive(Debug)]
pub struct FeedDirTransport {
    feed_dir: PathBuf,
    staging_dir: PathBuf,
    current_version: String,
    found: Mutex<Option<FeedManifest>>,
    staged: Mutex<Option<PathBuf>>,
}

impl FeedDirTransport {
    pub fn new(
        feed_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        current_version: impl Into<String>,
    ) -> Self {
        Self {
            feed_dir: feed_dir.into(),
            staging_dir: staging_dir.into(),
            current_version: current_version.into(),
            found: Mutex::new(None),
            staged: Mutex::new(None),
        }
    }

    /// Default staging location: `<cache_dir>/scrapedeck/updates`
    pub fn default_staging_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("scrapedeck")
            .join("updates")
    }

    /// Path of the installer staged by the last successful download
    pub fn staged_installer(&self) -> Option<PathBuf> {
        self.staged.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    async fn read_manifest(&self) -> Result<FeedManifest> {
        let path = self.feed_dir.join(FEED_MANIFEST);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FeedNotFound { path });
            }
            Err(e) => return Err(Error::Io(e)),
        };

        toml::from_str(&content)
            .map_err(|e| Error::update(format!("invalid {}: {}", FEED_MANIFEST, e)))
    }
}

impl UpdateTransport for FeedDirTransport {
    async fn check_for_update(&self) -> Result<UpdateInfo> {
        let manifest = self.read_manifest().await?;

        let newer =
            compare_versions(&manifest.version, &self.current_version)? == Ordering::Greater;
        debug!(
            "Feed version {} vs current {}: newer = {}",
            manifest.version, self.current_version, newer
        );

        let info = if newer {
            UpdateInfo::available(manifest.version.clone())
        } else {
            UpdateInfo::none()
        };

        *self.found.lock().unwrap_or_else(|p| p.into_inner()) = newer.then_some(manifest);
        Ok(info)
    }

    async fn download(&self, progress: mpsc::Sender<u8>) -> Result<()> {
        let manifest = self
            .found
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| Error::update("no release selected; check for updates first"))?;

        let source = self.feed_dir.join(&manifest.installer);
        let file_name = manifest
            .installer
            .file_name()
            .ok_or_else(|| Error::update("installer path has no file name"))?;

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .with_context(|| format!("creating staging dir {}", self.staging_dir.display()))?;
        let target = self.staging_dir.join(file_name);
        let partial = target.with_extension("part");

        copy_with_progress(&source, &partial, &progress).await?;
        tokio::fs::rename(&partial, &target).await?;

        info!("Staged installer {} at {}", manifest.version, target.display());
        *self.staged.lock().unwrap_or_else(|p| p.into_inner()) = Some(target);
        Ok(())
    }

    async fn quit_and_install(&self) -> Result<()> {
        let installer = self
            .staged_installer()
            .ok_or_else(|| Error::update("no installer has been downloaded"))?;

        info!("Launching installer {}", installer.display());
        launch_installer(&installer)
    }
}

/// Copy `source` to `target`, sending percent complete after each chunk
async fn copy_with_progress(
    source: &Path,
    target: &Path,
    progress: &mpsc::Sender<u8>,
) -> Result<()> {
    let mut input = tokio::fs::File::open(source).await.map_err(|e| {
        Error::update(format!("cannot open installer {}: {}", source.display(), e))
    })?;
    let total = input.metadata().await?.len();
    let mut output = tokio::fs::File::create(target).await?;

    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut copied: u64 = 0;

    loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n]).await?;
        copied += n as u64;

        // A dropped receiver only means nobody is watching
        let _ = progress.send(percent(copied, total)).await;
    }
    output.flush().await?;

    if total == 0 {
        let _ = progress.send(100).await;
    }
    Ok(())
}

fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

#[cfg(target_os = "macos")]
fn launch_installer(installer: &Path) -> Result<()> {
    std::process::Command::new("open").arg(installer).spawn()?;
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn launch_installer(installer: &Path) -> Result<()> {
    std::process::Command::new(installer).spawn()?;
    Ok(())
}

/// Compare dotted numeric versions (`1.10.0 > 1.9.3`).
///
/// A leading `v` is ignored and missing components count as zero.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    let a = parse_version(a)?;
    let b = parse_version(b)?;
    let len = a.len().max(b.len());

    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return Ok(other),
        }
    }
    Ok(Ordering::Equal)
}

fn parse_version(version: &str) -> Result<Vec<u64>> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    trimmed
        .split('.')
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| Error::update(format!("invalid version '{}'", version)))
        })
        .collect()
}
