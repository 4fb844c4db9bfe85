//! Scratch storage for images in flight.
//!
//! Downloaded originals and generated outputs are written here while a
//! request is processed. Each file is owned by a [`ScratchFile`] guard that
//! deletes it on drop, and a periodic sweep removes anything left behind by
//! a crashed process.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

/// Files older than this are removed by the sweep.
pub const SCRATCH_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Scratch directory on local disk.
pub struct ScratchDir {
    root: PathBuf,
    counter: AtomicU64,
}

impl ScratchDir {
    /// Open the scratch directory, creating it if absent.
    pub fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("Scratch directory: {}", root.display());
        Ok(Self {
            root,
            counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `data` to a new file tagged with the user and `kind`.
    ///
    /// Names look like `{user_id}_{unix_millis}_{seq}_{kind}.{ext}` so that
    /// concurrent requests from one user never collide.
    pub async fn write(
        &self,
        user_id: i64,
        kind: &str,
        extension: &str,
        data: &[u8],
    ) -> std::io::Result<ScratchFile> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let millis = chrono::Utc::now().timestamp_millis();
        let path = self
            .root
            .join(format!("{user_id}_{millis}_{seq}_{kind}.{extension}"));

        // The guard exists before the write so a partial file is still removed.
        let file = ScratchFile { path };
        tokio::fs::write(&file.path, data).await?;
        debug!("Wrote scratch file {} ({} bytes)", file.path.display(), data.len());
        Ok(file)
    }

    /// Delete files in the directory older than `max_age`.
    /// Returns how many files were removed.
    pub async fn sweep(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read scratch directory {}: {e}", self.root.display());
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to list scratch directory: {e}");
                    break;
                }
            };

            let path = entry.path();
            let modified = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta.modified(),
                Ok(_) => continue,
                Err(e) => {
                    warn!("Failed to stat {}: {e}", path.display());
                    continue;
                }
            };

            let age = modified
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Swept {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to delete {}: {e}", path.display()),
            }
        }

        if removed > 0 {
            info!("🧹 Swept {removed} scratch file(s)");
        }
        removed
    }
}

/// A file in scratch storage, deleted when dropped.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Deleted scratch file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete scratch file {}: {e}", self.path.display()),
        }
    }
}
