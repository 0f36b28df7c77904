use std::{fs, path::Path};

use crate::error::{FileSystemError, FileSystemResult};

/// Creates `path` and any missing parents.
///
/// Succeeds without doing anything when the directory already exists.
///
/// # Errors
///
/// * [`FileSystemError::Directory`] if creation fails.
/// * [`FileSystemError::NotADirectory`] if `path` exists as something else.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    fs::create_dir_all(path).map_err(|source| {
        FileSystemError::Directory {
            path: path.to_path_buf(),
            action: "create",
            source,
        }
    })
}

/// Ensures the parent directory of `file` exists.
pub fn ensure_parent_dir<P: AsRef<Path>>(file: P) -> FileSystemResult<()> {
    match file.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir_exists(parent),
        _ => Ok(()),
    }
}

/// Removes a file or directory tree, treating a missing path as success.
///
/// Used to discard a partially written package after a failed dissemination.
pub fn safe_remove<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(());
    }

    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|source| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "remove",
            source,
        }
    })
}

/// Reads a whole file into memory.
pub fn read_file<P: AsRef<Path>>(path: P) -> FileSystemResult<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|source| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "read",
            source,
        }
    })
}
