use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    error::{DownloadError, Result},
    observer::{ChunkObserver, ObservingWriter},
};

pub const STAGING_SUFFIX: &str = ".partial";

/// Returns `<dest>.partial`.
pub fn staging_path(dest: &Path) -> PathBuf {
    let mut path = dest.as_os_str().to_owned();
    path.push(STAGING_SUFFIX);
    PathBuf::from(path)
}

/// What happened to a leftover staging file from an earlier attempt.
#[derive(Debug)]
pub enum StagingCleanup {
    Absent,
    Removed,
    Failed(io::Error),
}

/// Removes a stale staging file, if any.
///
/// Never fails by itself; the caller decides what a [`StagingCleanup::Failed`] means.
pub fn clear_stale_staging(path: &Path) -> StagingCleanup {
    match fs::remove_file(path) {
        Ok(()) => StagingCleanup::Removed,
        Err(err) if err.kind() == io::ErrorKind::NotFound => StagingCleanup::Absent,
        Err(err) => StagingCleanup::Failed(err),
    }
}

/// A freshly created `<dest>.partial` file that only becomes `dest` on [`commit`].
///
/// Dropping it without committing leaves the partial file on disk; the next attempt for the
/// same destination clears it before starting over.
///
/// [`commit`]: StagingFile::commit
pub struct StagingFile {
    dest: PathBuf,
    path: PathBuf,
    file: File,
}

impl StagingFile {
    pub fn create(dest: &Path) -> Result<Self> {
        let path = staging_path(dest);

        match clear_stale_staging(&path) {
            StagingCleanup::Absent => {}
            StagingCleanup::Removed => {
                debug!("Removed stale staging file {}", path.display());
            }
            StagingCleanup::Failed(err) => {
                warn!(
                    "Could not remove stale staging file {}: {}",
                    path.display(),
                    err
                );
                return Err(DownloadError::StaleStaging { path, source: err });
            }
        }

        let file = File::create(&path).map_err(|err| {
            DownloadError::Io {
                action: "create",
                path: path.clone(),
                source: err,
            }
        })?;

        Ok(Self {
            dest: dest.to_path_buf(),
            path,
            file,
        })
    }

    /// Copies `reader` into the staging file, showing every written chunk to `observers`.
    ///
    /// Returns the number of bytes written.
    pub fn stream_from<R: Read>(
        &mut self,
        reader: &mut R,
        observers: Vec<&mut dyn ChunkObserver>,
    ) -> Result<u64> {
        let mut writer = ObservingWriter::new(&mut self.file, observers);
        let mut buffer = [0u8; 64 * 1024];

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(DownloadError::Io {
                        action: "read response into",
                        path: self.path.clone(),
                        source: err,
                    });
                }
            };

            writer.write_all(&buffer[..n]).map_err(|err| {
                DownloadError::Io {
                    action: "write",
                    path: self.path.clone(),
                    source: err,
                }
            })?;
        }

        Ok(writer.written())
    }

    /// Flushes the staging file and renames it onto the destination.
    pub fn commit(mut self) -> Result<PathBuf> {
        self.file
            .flush()
            .and_then(|_| self.file.sync_all())
            .map_err(|err| {
                DownloadError::Io {
                    action: "sync",
                    path: self.path.clone(),
                    source: err,
                }
            })?;
        drop(self.file);

        fs::rename(&self.path, &self.dest).map_err(|err| {
            DownloadError::Rename {
                from: self.path.clone(),
                to: self.dest.clone(),
                source: err,
            }
        })?;

        Ok(self.dest)
    }

    /// Deletes the staging file instead of committing it.
    pub fn discard(self) {
        let path = self.path;
        drop(self.file);
        if let StagingCleanup::Failed(err) = clear_stale_staging(&path) {
            warn!("Could not remove staging file {}: {}", path.display(), err);
        }
    }
}
