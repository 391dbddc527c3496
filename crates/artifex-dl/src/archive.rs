use std::path::Path;

use tracing::debug;

use crate::error::Result;

const ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar", ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.bz2", ".tbz2", ".tar.zst", ".tzst", ".zip",
];

/// Expands archives in place after a download has been verified.
pub trait ArchiveExtractor: Send + Sync {
    fn is_archive(&self, path: &Path) -> bool;

    /// Unpacks `archive` into `dest`. The archive itself is left where it is.
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// Returns true if the file name ends in one of the recognized archive extensions.
pub fn is_archive(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|name| ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompakExtractor;

impl ArchiveExtractor for CompakExtractor {
    fn is_archive(&self, path: &Path) -> bool {
        is_archive(path)
    }

    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        debug!("Extracting {} into {}", archive.display(), dest.display());
        compak::extract_archive(archive, dest)?;
        Ok(())
    }
}
