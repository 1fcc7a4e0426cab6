use crate::error::CacheError;
use fs2::FileExt as _;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock};

/// A filesystem-backed lock that is safe to share across multiple processes using the same
/// cache root.
///
/// The lock is released when the returned value is dropped.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
    // `fs2` file locks are process-scoped on Unix (they don't exclude other threads in the
    // same process). The held-path claim excludes other threads; the file lock excludes
    // other processes.
    _claim: PathClaim,
}

impl CacheLock {
    /// Acquire an exclusive lock on `path`, creating the lockfile (and its parent
    /// directories) if needed.
    ///
    /// This call blocks until the lock is available.
    pub fn lock_exclusive(path: &Path) -> Result<Self, CacheError> {
        let claim = PathClaim::acquire(path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        file.lock_exclusive()?;

        tracing::trace!(target: "qgen.cache", path = %path.display(), "acquired cache lock");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            _claim: claim,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Paths currently locked by some thread of this process.
///
/// A path is only present while a [`CacheLock`] on it is alive, so the set stays as small as
/// the number of concurrent generations no matter how many distinct keys are served.
struct HeldPaths {
    paths: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

fn held_paths() -> &'static HeldPaths {
    static HELD: OnceLock<HeldPaths> = OnceLock::new();
    HELD.get_or_init(|| HeldPaths {
        paths: Mutex::new(HashSet::new()),
        released: Condvar::new(),
    })
}

impl HeldPaths {
    fn paths(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.paths
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-process claim on a lock path; released on drop.
#[derive(Debug)]
struct PathClaim {
    path: PathBuf,
}

impl PathClaim {
    fn acquire(path: &Path) -> Self {
        let held = held_paths();
        let mut paths = held.paths();
        while paths.contains(path) {
            paths = held
                .released
                .wait(paths)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        paths.insert(path.to_path_buf());
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        let held = held_paths();
        held.paths().remove(&self.path);
        held.released.notify_all();
    }
}
