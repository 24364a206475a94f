//! Filesystem-based locking for cross-process coordination
//!
//! Two imports writing into the same output target would interleave batches
//! and race on the branch watermark, so each run holds an exclusive flock on
//! a file derived from the target path for its whole duration.

use crate::error::SinkError;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Get the lock file path for a given output target
fn lock_file_path(lock_dir: &Path, target: &str) -> PathBuf {
    // Hash the target to create a safe filename
    let mut hasher = Sha256::new();
    hasher.update(target.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    lock_dir.join(format!("{}.lock", &hash[..16]))
}

/// Guard that holds an exclusive lock on one output target
///
/// The lock is released when this guard is dropped.
/// If the process crashes, the OS automatically releases the flock.
pub struct RunLock {
    _file: File,
    target: String,
}

impl RunLock {
    /// Acquire the lock for `target` in the default lock directory
    pub fn acquire(target: &str) -> Result<Self, SinkError> {
        Self::acquire_in(&crate::paths::PlatformPaths::lock_dir(), target)
    }

    /// Acquire the lock for `target` in `lock_dir`, non-blocking
    ///
    /// Fails with [`SinkError::Locked`] if another holder exists.
    pub fn acquire_in(lock_dir: &Path, target: &str) -> Result<Self, SinkError> {
        let lock_path = lock_file_path(lock_dir, target);

        tracing::debug!(
            "Attempting to acquire run lock: target={}, lock_file={:?}",
            target,
            lock_path
        );

        fs::create_dir_all(lock_dir).map_err(|e| {
            SinkError::ConnectionFailed(format!("Failed to create lock directory: {}", e))
        })?;

        let file = File::create(&lock_path).map_err(|e| {
            SinkError::ConnectionFailed(format!("Failed to create lock file: {}", e))
        })?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("Acquired run lock for: {}", target);
                Ok(Self {
                    _file: file,
                    target: target.to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(SinkError::Locked(target.to_string()))
            }
            Err(e) => Err(SinkError::ConnectionFailed(format!(
                "Failed to acquire run lock: {}",
                e
            ))),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        tracing::debug!("Releasing run lock for {}", self.target);
    }
}
