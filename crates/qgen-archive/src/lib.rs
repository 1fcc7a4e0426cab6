//! Zip packaging of generated file trees, and reading those archives back.
//!
//! Archives written here are byte-for-byte reproducible: entries are added in sorted walk
//! order with a fixed timestamp and fixed permissions, so the same files always produce the
//! same bytes.

mod writer;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use anyhow::Context;
use zip::ZipArchive;

pub use writer::{archive_dir_to_vec, write_dir_archive, ArchiveLayout, ArchiveSummary};

/// A zip archive on disk.
#[derive(Clone, Debug)]
pub struct Archive {
    path: PathBuf,
}

impl Archive {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a file from the archive.
    ///
    /// Returns `Ok(None)` when the file isn't present.
    pub fn read(&self, name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut zip = self.open_zip()?;
        let result = match zip.by_name(name) {
            Ok(mut entry) => {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf).with_context(|| {
                    format!("failed to read {} from {}", name, self.path.display())
                })?;
                Ok(Some(buf))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(err) => Err(err).with_context(|| {
                format!("failed to read {} from zip {}", name, self.path.display())
            }),
        };
        result
    }

    /// Entry names in archive order.
    pub fn names(&self) -> anyhow::Result<Vec<String>> {
        let zip = self.open_zip()?;
        Ok((0..zip.len())
            .filter_map(|index| zip.name_for_index(index))
            .map(str::to_owned)
            .collect())
    }

    fn open_zip(&self) -> anyhow::Result<ZipArchive<File>> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open archive {}", self.path.display()))?;
        ZipArchive::new(file).with_context(|| format!("failed to read zip {}", self.path.display()))
    }
}

/// Decode every entry of an in-memory zip archive, keyed by entry name.
pub fn entries_from_bytes(bytes: &[u8]) -> anyhow::Result<BTreeMap<String, Vec<u8>>> {
    read_all_entries(Cursor::new(bytes))
}

fn read_all_entries<R: Read + Seek>(reader: R) -> anyhow::Result<BTreeMap<String, Vec<u8>>> {
    let mut zip = ZipArchive::new(reader).context("failed to read zip")?;
    let mut entries = BTreeMap::new();
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .with_context(|| format!("failed to open zip entry #{index}"))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_owned();
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .with_context(|| format!("failed to read zip entry {name}"))?;
        entries.insert(name, buf);
    }
    Ok(entries)
}
