//! File-based locking for process-wide named resources.
//!
//! The rpm database, the repo cache and the solver metadata are each
//! guarded by a `.lock` file so that competing daemons and helpers
//! serialize their mutations.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{UtilsError, UtilsResult};

/// A file-based lock using `flock`.
///
/// The lock is released when the `FileLock` is dropped.
pub struct FileLock {
    _file: nix::fcntl::Flock<File>,
    path: PathBuf,
}

fn lock_path(dir: &Path, name: &str) -> UtilsResult<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(UtilsError::io(format!("creating {}", dir.display())))?;
    }

    // sanitize the resource name into a valid filename
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    Ok(dir.join(format!("{sanitized}.lock")))
}

fn open_lock_file(path: &Path) -> UtilsResult<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(UtilsError::io(format!("opening {}", path.display())))
}

impl FileLock {
    /// Acquire an exclusive lock on a named resource, blocking until the
    /// lock can be taken.
    pub fn acquire(dir: &Path, name: &str) -> UtilsResult<Self> {
        let path = lock_path(dir, name)?;
        let file = open_lock_file(&path)?;
        let file = nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusive)
            .map_err(|(_, err)| {
                UtilsError::LockAcquireFailed(format!("{}: {}", path.display(), err))
            })?;
        Ok(FileLock {
            path,
            _file: file,
        })
    }

    /// Try to acquire an exclusive lock without blocking.
    ///
    /// Returns `None` if the lock is already held by another process.
    pub fn try_acquire(dir: &Path, name: &str) -> UtilsResult<Option<Self>> {
        let path = lock_path(dir, name)?;
        let file = open_lock_file(&path)?;
        match nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusiveNonblock) {
            Ok(file) => {
                Ok(Some(FileLock {
                    path,
                    _file: file,
                }))
            }
            Err((_, err)) => {
                if matches!(err, nix::errno::Errno::EWOULDBLOCK) {
                    return Ok(None);
                }
                Err(UtilsError::LockAcquireFailed(format!(
                    "{}: {}",
                    path.display(),
                    err
                )))
            }
        }
    }

    /// Path of the underlying lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
