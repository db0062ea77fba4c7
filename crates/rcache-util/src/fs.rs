//! Filesystem access for the cache engine.
//!
//! The engine never touches `std::fs` directly: it reads, writes and scans
//! through the [`FileReader`], [`FileWriter`] and [`DirScanner`] seams so each
//! component can be driven against any directory layout. [`LocalFs`] is the
//! production implementation.

use std::path::{Path, PathBuf};

use crate::error::UtilError;

/// Reads whole files.
pub trait FileReader {
    /// Return the file content, or `None` if nothing exists at `path`.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read.
    fn contents(&self, path: &Path) -> Result<Option<Vec<u8>>, UtilError>;
}

/// Writes whole files.
pub trait FileWriter {
    /// Replace the content of `path`, creating parent directories as needed.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<(), UtilError>;

    /// Delete the file at `path`. A missing file is not an error.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be removed.
    fn remove(&self, path: &Path) -> Result<(), UtilError>;
}

/// Lists directory entries.
pub trait DirScanner {
    /// Files directly inside `dir` (no recursion), sorted by path.
    ///
    /// # Errors
    /// Returns an error if `dir` exists but cannot be read.
    fn items(&self, dir: &Path) -> Result<Vec<PathBuf>, UtilError>;

    /// All files below `dir`, sorted by path. A missing `dir` has no items.
    ///
    /// # Errors
    /// Returns an error if part of the tree cannot be read.
    fn recursive_items(&self, dir: &Path) -> Result<Vec<PathBuf>, UtilError>;
}

/// The local disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FileReader for LocalFs {
    fn contents(&self, path: &Path) -> Result<Option<Vec<u8>>, UtilError> {
        read_optional(path)
    }
}

impl FileWriter for LocalFs {
    fn write(&self, path: &Path, contents: &[u8]) -> Result<(), UtilError> {
        write_atomic(path, contents)
    }

    fn remove(&self, path: &Path) -> Result<(), UtilError> {
        remove_file_if_exists(path)
    }
}

impl DirScanner for LocalFs {
    fn items(&self, dir: &Path) -> Result<Vec<PathBuf>, UtilError> {
        list_dir(dir)
    }

    fn recursive_items(&self, dir: &Path) -> Result<Vec<PathBuf>, UtilError> {
        list_recursive(dir)
    }
}

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::io(path, source))
}

/// Read a file, mapping "not found" to `None`.
///
/// # Errors
/// Returns an error for any failure other than the file being absent.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, UtilError> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(UtilError::io(path, source)),
    }
}

/// Write `contents` to `path` all-or-nothing.
///
/// The data lands in a sibling temp file first and is renamed over `path`, so a
/// concurrent reader sees either the old file or the complete new one.
///
/// # Errors
/// Returns an error if the temp file cannot be written or renamed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), UtilError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(".tmp-{file_name}-{}", std::process::id()));

    std::fs::write(&tmp_path, contents).map_err(|source| UtilError::io(&tmp_path, source))?;
    if let Err(source) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(UtilError::io(path, source));
    }
    Ok(())
}

/// Remove a file. No error if it is already gone.
///
/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub fn remove_file_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::io(path, source)),
    }
}

/// List the files directly inside `dir`, sorted. A missing `dir` is empty.
///
/// # Errors
/// Returns an error if `dir` exists but cannot be read.
pub fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, UtilError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(UtilError::io(dir, source)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| UtilError::io(dir, source))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// List every file below `dir`, sorted. A missing `dir` is empty.
///
/// # Errors
/// Returns an error if any directory in the tree cannot be read.
pub fn list_recursive(dir: &Path) -> Result<Vec<PathBuf>, UtilError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| UtilError::Scan {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Resolve symlinks in `path`. Paths that do not exist are returned unchanged.
pub fn resolve_symlinks(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
