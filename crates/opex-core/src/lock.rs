//! Advisory run lock.
//!
//! Every mutating stage takes the exclusive lock before touching a run,
//! so two operator shells cannot interleave moves over the same tree.
//! The lock file persists between runs; only the flock matters.

use fs2::FileExt;
use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;

/// Name of the lock file at the project root.
pub const LOCK_FILE: &str = "opexprep.lock";

/// How long a stage waits for the run lock before giving up.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another stage holds the run lock at {} (waited {waited:?})", .path.display())]
    Timeout { path: PathBuf, waited: Duration },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// RAII guard for the project-wide exclusive run lock.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Acquire the exclusive run lock under `root`, retrying until
    /// `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the lock is not released within `timeout`.
    /// Returns `Io` for other I/O errors.
    pub fn acquire(root: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = root.join(LOCK_FILE);
        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self { file, path });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path,
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        let _ = self.file.unlock();
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
