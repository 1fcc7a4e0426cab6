use crate::error::CacheError;
use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Hard upper bound for any serialized result we will attempt to read back from disk.
///
/// A corrupted or hostile result file degrades to a cache miss rather than an unbounded
/// allocation.
pub const RESULT_PAYLOAD_LIMIT_BYTES: usize = 16 * 1024 * 1024;

pub fn now_millis() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as u64,
        Err(err) => {
            // Only log once; this is called on every cache write.
            static REPORTED: OnceLock<()> = OnceLock::new();
            if REPORTED.set(()).is_ok() {
                tracing::debug!(
                    target: "qgen.cache",
                    error = %err,
                    "system time is before unix epoch; using 0 for now_millis"
                );
            }
            0
        }
    }
}

/// Whether `file_name` looks like a leftover from [`atomic_write`] (`<dest>.<random>.tmp`).
pub fn is_atomic_write_tmp_file(file_name: &str) -> bool {
    file_name.ends_with(".tmp")
}

pub(crate) fn read_file_limited(path: &Path) -> Option<Vec<u8>> {
    // Avoid following symlinks out of the cache directory.
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            // Cache misses are expected; only log unexpected filesystem errors.
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target: "qgen.cache",
                    path = %path.display(),
                    error = %err,
                    "failed to stat cache file"
                );
            }
            return None;
        }
    };
    if meta.file_type().is_symlink() || !meta.is_file() {
        remove_file_best_effort(path, "read_file_limited.invalid_type");
        return None;
    }

    if meta.len() > RESULT_PAYLOAD_LIMIT_BYTES as u64 {
        remove_file_best_effort(path, "read_file_limited.oversize_meta");
        return None;
    }

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target: "qgen.cache",
                    path = %path.display(),
                    error = %err,
                    "failed to read cache file"
                );
            }
            return None;
        }
    };
    if bytes.len() > RESULT_PAYLOAD_LIMIT_BYTES {
        remove_file_best_effort(path, "read_file_limited.oversize_read");
        return None;
    }

    Some(bytes)
}

pub(crate) fn remove_file_best_effort(path: &Path, reason: &'static str) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::debug!(
                target: "qgen.cache",
                path = %path.display(),
                reason,
                error = %err,
                "failed to remove cache file"
            );
            false
        }
    }
}

/// Write `bytes` to `path` so that readers observe either the old file or the complete new
/// one, never a torn write.
///
/// The data is staged in `<name>.<random>.tmp` next to `path` and renamed into place.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let parent = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => return Err(io::Error::other("path has no parent").into()),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    fs::create_dir_all(parent)?;

    let mut prefix = file_name.to_os_string();
    prefix.push(".");
    // An unpersisted `NamedTempFile` deletes itself on drop, so error paths leave nothing.
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| CacheError::from(err.error))?;

    sync_dir_best_effort(parent);
    Ok(())
}

fn sync_dir_best_effort(dir: &Path) {
    #[cfg(unix)]
    if let Err(err) = fs::File::open(dir).and_then(|dir| dir.sync_all()) {
        static SYNC_DIR_ERROR_LOGGED: OnceLock<()> = OnceLock::new();
        if err.kind() != io::ErrorKind::NotFound && SYNC_DIR_ERROR_LOGGED.set(()).is_ok() {
            tracing::debug!(
                target: "qgen.cache",
                dir = %dir.display(),
                error = %err,
                "failed to sync cache directory"
            );
        }
    }

    #[cfg(not(unix))]
    let _ = dir;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_contents_without_leaving_tmp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sub").join("value.json");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        let names: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["value.json".to_string()]);
    }

    #[test]
    fn recognises_tmp_file_names() {
        assert!(is_atomic_write_tmp_file("rep_cache.json.a1B2c3.tmp"));
        assert!(!is_atomic_write_tmp_file("transformer.py"));
    }

    #[test]
    fn read_file_limited_rejects_directories() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_file_limited(tmp.path()).is_none());
        assert!(read_file_limited(&tmp.path().join("missing")).is_none());
    }
}
