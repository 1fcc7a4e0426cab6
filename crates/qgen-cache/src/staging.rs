use crate::error::CacheError;
use std::path::{Path, PathBuf};

pub const STAGING_DIR_PREFIX: &str = "qgen-staging-";

/// Per-request scratch directory.
///
/// Each instance owns a uniquely named directory. It is removed by [`StagingArea::close`]
/// (which reports removal failures) or, on every other path out of the request, by `Drop`.
#[derive(Debug)]
pub struct StagingArea {
    dir: tempfile::TempDir,
}

impl StagingArea {
    /// Create a staging directory under `parent`, or under the system temp dir when `parent`
    /// is `None`.
    pub fn new(parent: Option<&Path>) -> Result<Self, CacheError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_DIR_PREFIX);
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        tracing::trace!(
            target: "qgen.cache",
            dir = %dir.path().display(),
            "created staging directory"
        );
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the staging directory now, surfacing any removal error.
    pub fn close(self) -> Result<(), CacheError> {
        self.dir.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_are_unique_and_removed() {
        let parent = tempfile::tempdir().unwrap();
        let a = StagingArea::new(Some(parent.path())).unwrap();
        let b = StagingArea::new(Some(parent.path())).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(STAGING_DIR_PREFIX));

        std::fs::write(a.file_path("joined.zip"), b"zip").unwrap();
        let a_path = a.path().to_path_buf();
        a.close().unwrap();
        assert!(!a_path.exists());

        let b_path = b.path().to_path_buf();
        drop(b);
        assert!(!b_path.exists());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn creates_missing_parent() {
        let parent = tempfile::tempdir().unwrap();
        let nested = parent.path().join("a").join("b");
        let staging = StagingArea::new(Some(&nested)).unwrap();
        assert!(staging.path().starts_with(&nested));
    }
}
