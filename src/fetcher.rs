//! Streaming downloads that never leave a partial file behind
//!
//! The body is written into a private scratch directory next to the destination (same
//! filesystem, so the final rename is atomic). The destination is replaced only once
//! the transfer is complete and flushed. If the process dies mid-transfer the scratch
//! directory is what remains; its name starts with `.` so it is invisible to the
//! directory digest, and [`remove_stale_scratch`] clears it on the next run.

use crate::client::{Accept, ApiClient};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Name prefix of scratch directories
pub const SCRATCH_PREFIX: &str = ".release-mirror-";

/// Downloads a locator to a path through the API client
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: ApiClient,
}

impl Fetcher {
    /// Create a fetcher sharing `client`'s connection pool and settings
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Download `url` to `destination`, replacing whatever is there
    ///
    /// Returns the number of bytes written.
    pub async fn fetch(&self, url: &str, destination: &Path, accept: Accept) -> Result<u64> {
        info!("Downloading '{}'...", url);

        let (scratch, temporary) = scratch_for(destination)?;

        let mut response = self.client.get(url, accept, &[]).await?;
        let mut file = tokio::fs::File::create(&temporary).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        // A stale directory artifact cannot be renamed over; park it in a second
        // scratch directory so it is only deleted after the new file is in place
        let mut parked = None;
        if tokio::fs::metadata(destination)
            .await
            .is_ok_and(|metadata| metadata.is_dir())
        {
            let (aside, previous) = scratch_for(destination)?;
            tokio::fs::rename(destination, &previous).await?;
            parked = Some((aside, previous));
        }
        if let Err(e) = tokio::fs::rename(&temporary, destination).await {
            if let Some((_, previous)) = &parked {
                let _ = tokio::fs::rename(previous, destination).await;
            }
            return Err(e.into());
        }
        debug!(path = %destination.display(), bytes = written, "Published download");

        // scratch directories are removed when dropped
        drop(parked);
        drop(scratch);
        Ok(written)
    }
}

/// Write `contents` to `destination` through a scratch directory and an atomic rename
pub async fn write_atomic(destination: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    let (_scratch, temporary) = scratch_for(destination)?;
    tokio::fs::write(&temporary, contents).await?;
    tokio::fs::rename(&temporary, destination).await?;
    Ok(())
}

/// Create a scratch directory beside `destination` and the temporary path inside it
fn scratch_for(destination: &Path) -> Result<(tempfile::TempDir, PathBuf)> {
    let parent = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = destination.file_name().ok_or_else(|| Error::InvalidName {
        kind: "destination",
        name: destination.display().to_string(),
    })?;

    let scratch = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir_in(parent)?;
    let temporary = scratch.path().join(file_name);
    Ok((scratch, temporary))
}

/// Remove scratch directories left behind by an interrupted run
///
/// Returns the paths that were removed.
pub async fn remove_stale_scratch(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let mut entries = match tokio::fs::read_dir(directory).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let is_scratch = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(SCRATCH_PREFIX));
        if is_scratch && entry.file_type().await?.is_dir() {
            warn!(path = %entry.path().display(), "Removing leftover partial download");
            tokio::fs::remove_dir_all(entry.path()).await?;
            removed.push(entry.path());
        }
    }
    Ok(removed)
}
