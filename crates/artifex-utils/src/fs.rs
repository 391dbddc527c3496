use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::error::{FileSystemError, FileSystemResult};

/// Creates a directory structure if it doesn't exist.
///
/// If the directory already exists, this function does nothing. If the path exists but is
/// not a directory, an error is returned.
///
/// # Errors
///
/// * [`FileSystemError::Directory`] if the directory could not be created.
/// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
///
/// # Example
///
/// ```no_run
/// use artifex_utils::error::FileSystemResult;
/// use artifex_utils::fs::ensure_dir_exists;
///
/// fn main() -> FileSystemResult<()> {
///     ensure_dir_exists("/tmp/artifex-doc/models")?;
///     Ok(())
/// }
/// ```
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| {
            FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "create",
                source: err,
            }
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Removes a file, treating an already-missing file as success.
///
/// Returns `true` when a file was actually removed.
///
/// # Errors
///
/// * [`FileSystemError::File`] if the removal fails for any reason other than the file
///   not existing.
pub fn remove_file_if_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<bool> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => {
            Err(FileSystemError::File {
                path: path.to_path_buf(),
                action: "remove",
                source: err,
            })
        }
    }
}

/// Returns the directory containing `path`, or `.` for bare file names.
pub fn parent_dir<P: AsRef<Path>>(path: P) -> PathBuf {
    match path.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
