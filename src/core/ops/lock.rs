//! core::ops::lock
//!
//! Exclusive repository lock for gitkv processes.
//!
//! # Architecture
//!
//! Each ref's commits are produced by a single writer that assumes nobody
//! else moves the ref. A second process writing the same repository would
//! break that assumption, so a pool holds this lock for its whole lifetime.
//!
//! # Storage
//!
//! - `<git_dir>/gitkv/lock` - Lock file with OS-level exclusive lock
//!
//! # Invariants
//!
//! - Lock is automatically released on drop (RAII pattern)
//! - Lock acquisition is non-blocking (fails fast if locked)
//!
//! # Example
//!
//! ```ignore
//! use gitkv::core::ops::lock::RepoLock;
//! use gitkv::core::paths::StorePaths;
//!
//! let lock = RepoLock::acquire(&StorePaths::new("/srv/data.git"))?;
//! // ... serve requests ...
//! drop(lock);
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use crate::core::paths::StorePaths;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("repository is locked by another gitkv process")]
    AlreadyLocked,

    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// An exclusive lock on the repository.
///
/// Released when dropped, even if the holder panics.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    /// The open file handle with the lock held; `Some` while held.
    file: Option<File>,
}

impl RepoLock {
    /// Attempt to acquire the repository lock.
    ///
    /// Uses OS-level file locking via `fs2`, which works across processes.
    /// The call never waits: if another process holds the lock this returns
    /// [`LockError::AlreadyLocked`] immediately.
    pub fn acquire(paths: &StorePaths) -> Result<Self, LockError> {
        let store_dir = paths.store_dir();
        fs::create_dir_all(&store_dir).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", store_dir.display(), e))
        })?;

        let path = paths.lock_path();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::AlreadyLocked),
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Try to acquire the lock, returning `None` if already held.
    pub fn try_acquire(paths: &StorePaths) -> Result<Option<Self>, LockError> {
        match Self::acquire(paths) {
            Ok(lock) => Ok(Some(lock)),
            Err(LockError::AlreadyLocked) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check if the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock before the guard goes out of scope.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            file.unlock()
                .map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        // Best-effort release on drop
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_acquire_creates_store_dir() {
        let temp = TempDir::new().expect("create temp dir");
        let paths = StorePaths::new(temp.path());
        assert!(!paths.store_dir().exists());

        let lock = RepoLock::acquire(&paths).expect("acquire lock");
        assert!(lock.is_held());
        assert_eq!(lock.path(), paths.lock_path());
        assert!(paths.store_dir().exists());
    }

    #[test]
    fn lock_prevents_second_acquire() {
        let temp = TempDir::new().expect("create temp dir");
        let paths = StorePaths::new(temp.path());

        let _lock = RepoLock::acquire(&paths).expect("first acquire");
        assert!(matches!(
            RepoLock::acquire(&paths),
            Err(LockError::AlreadyLocked)
        ));
        assert!(RepoLock::try_acquire(&paths).expect("try").is_none());
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = TempDir::new().expect("create temp dir");
        let paths = StorePaths::new(temp.path());

        {
            let _lock = RepoLock::acquire(&paths).expect("first acquire");
        }

        assert!(RepoLock::acquire(&paths).expect("second acquire").is_held());
    }

    #[test]
    fn release_is_idempotent() {
        let temp = TempDir::new().expect("create temp dir");
        let paths = StorePaths::new(temp.path());

        let mut lock = RepoLock::acquire(&paths).expect("acquire");
        lock.release().expect("first release");
        lock.release().expect("second release");
        assert!(!lock.is_held());
        assert!(RepoLock::acquire(&paths).is_ok());
    }
}
