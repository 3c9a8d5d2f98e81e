//! core::fsops
//!
//! Filesystem primitives used by the engine: copy, move, tree walks and
//! empty-directory pruning. Every error names the paths involved.
//!
//! Moves try `rename` first and fall back to copy-then-delete, since the
//! storage root and the game install are often on different filesystems.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

/// Errors from filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("failed to create directory '{path}': {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to copy '{from}' to '{to}': {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("failed to move '{from}' to '{to}': {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("failed to remove '{path}': {source}")]
    Remove { path: PathBuf, source: io::Error },

    #[error("failed to walk '{path}': {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

fn ensure_parent(path: &Path) -> Result<(), FsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| FsError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Copy a file, creating the destination's parents and overwriting it.
pub fn copy_file(from: &Path, to: &Path) -> Result<u64, FsError> {
    ensure_parent(to)?;
    fs::copy(from, to).map_err(|source| FsError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

/// Move a file, creating the destination's parents and overwriting it.
pub fn move_file(from: &Path, to: &Path) -> Result<(), FsError> {
    ensure_parent(to)?;
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|source| FsError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;
    fs::remove_file(from).map_err(|source| FsError::Remove {
        path: from.to_path_buf(),
        source,
    })
}

/// Move a directory tree. The destination must not exist yet.
pub fn move_dir(from: &Path, to: &Path) -> Result<(), FsError> {
    ensure_parent(to)?;
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_tree(from, to)?;
    remove_tree(from)
}

/// Copy every file under `from` into `to`, preserving relative layout.
///
/// Returns the number of files copied.
pub fn copy_tree(from: &Path, to: &Path) -> Result<usize, FsError> {
    let files = list_files(from)?;
    for rel in &files {
        copy_file(&from.join(rel), &to.join(rel))?;
    }
    if files.is_empty() {
        fs::create_dir_all(to).map_err(|source| FsError::CreateDir {
            path: to.to_path_buf(),
            source,
        })?;
    }
    Ok(files.len())
}

/// List regular files under `root` as paths relative to it, sorted.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>, FsError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|source| FsError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Remove a directory tree. A missing tree is not an error.
pub fn remove_tree(path: &Path) -> Result<(), FsError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(FsError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Remove `start` and each of its ancestors while they are empty, stopping
/// before `stop`. Directories outside `stop` are never touched.
pub fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        // remove_dir only succeeds on empty directories
        if fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}
