//! Run lock
//!
//! At most one run may use an identity store at a time. The lock is an
//! exclusive advisory lock on a sidecar file next to the store
//! (`seen.db` -> `seen.db.lock`), taken without blocking. A second run that
//! finds the lock held is skipped, not queued.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info};

use crate::utils::error::StoreError;

/// Holds the run lock until dropped
pub struct RunLockGuard {
    _file: File,
    lock_path: PathBuf,
}

impl RunLockGuard {
    /// Path of the lock file
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        // closing the file releases the flock
        debug!(path = %self.lock_path.display(), "Releasing run lock");
    }
}

impl std::fmt::Debug for RunLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLockGuard")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

/// Lock file path for a store path
///
/// - `/data/seen.db` -> `/data/seen.db.lock`
/// - `/data/seen` -> `/data/seen.lock`
pub fn lock_path_for(store_path: &Path) -> PathBuf {
    let mut lock_path = store_path.to_path_buf();
    match lock_path.extension() {
        Some(ext) => {
            let new_ext = format!("{}.lock", ext.to_string_lossy());
            lock_path.set_extension(new_ext);
        }
        None => {
            lock_path.set_extension("lock");
        }
    }
    lock_path
}

/// Try to take the run lock for a store, without waiting
///
/// # Errors
/// Returns `StoreError::Locked` when another run holds the lock and
/// `StoreError::Io` when the lock file cannot be created.
pub fn try_lock(store_path: &Path) -> Result<RunLockGuard, StoreError> {
    let lock_path = lock_path_for(store_path);

    if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;

    // fully qualified: std::fs::File has an inherent method of the same name
    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            info!(path = %lock_path.display(), "Acquired run lock");
            Ok(RunLockGuard {
                _file: file,
                lock_path,
            })
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            debug!(path = %lock_path.display(), "Run lock held elsewhere");
            Err(StoreError::Locked(store_path.to_path_buf()))
        }
        Err(e) => Err(StoreError::Io(e)),
    }
}
