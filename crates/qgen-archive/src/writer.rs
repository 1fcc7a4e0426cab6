use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Cursor, Seek, Write};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// How files are named inside the archive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveLayout {
    /// Every file is stored under its base name. When two files share a base name, the first
    /// one in walk order is kept and the other is dropped with a warning.
    #[default]
    Flat,
    /// Files keep their path relative to the archived directory (`/`-separated).
    Relative,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Entry names, in the order they were written.
    pub entries: Vec<String>,
    /// Relative paths of files left out because their entry name was already taken.
    pub collisions: Vec<String>,
}

/// Zip every regular file under `dir` (recursively) into `writer`.
///
/// `include` sees each file's path relative to `dir` and decides whether it is archived.
/// Symlinks are not followed. Returns the writer once the archive is finished.
pub fn write_dir_archive<W, F>(
    dir: &Path,
    writer: W,
    layout: ArchiveLayout,
    mut include: F,
) -> anyhow::Result<(W, ArchiveSummary)>
where
    W: Write + Seek,
    F: FnMut(&Path) -> bool,
{
    // Fixed timestamp/permissions keep the output reproducible.
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(writer);
    let mut summary = ArchiveSummary::default();
    let mut seen: HashSet<String> = HashSet::new();

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("{} is not under {}", entry.path().display(), dir.display()))?;
        if !include(rel) {
            continue;
        }

        let rel_string = rel
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let name = match layout {
            ArchiveLayout::Flat => entry.file_name().to_string_lossy().into_owned(),
            ArchiveLayout::Relative => rel_string.clone(),
        };

        if !seen.insert(name.clone()) {
            tracing::warn!(
                target: "qgen.archive",
                name = %name,
                path = %rel_string,
                "dropping file whose archive entry name is already taken"
            );
            summary.collisions.push(rel_string);
            continue;
        }

        let len = entry
            .metadata()
            .with_context(|| format!("failed to stat {}", entry.path().display()))?
            .len();
        zip.start_file(name.clone(), options.large_file(len >= u64::from(u32::MAX)))
            .with_context(|| format!("failed to start zip entry {name}"))?;
        let mut file = File::open(entry.path())
            .with_context(|| format!("failed to open {}", entry.path().display()))?;
        io::copy(&mut file, &mut zip)
            .with_context(|| format!("failed to archive {}", entry.path().display()))?;

        summary.entries.push(name);
    }

    let writer = zip.finish().context("failed to finish zip archive")?;
    tracing::debug!(
        target: "qgen.archive",
        dir = %dir.display(),
        entries = summary.entries.len(),
        collisions = summary.collisions.len(),
        "archived directory"
    );
    Ok((writer, summary))
}

/// Zip every regular file under `dir` into an in-memory archive.
pub fn archive_dir_to_vec(dir: &Path, layout: ArchiveLayout) -> anyhow::Result<Vec<u8>> {
    let (cursor, _) = write_dir_archive(dir, Cursor::new(Vec::new()), layout, |_| true)?;
    Ok(cursor.into_inner())
}
