//! The marker file handed from one build phase to the next.
//!
//! Its presence means the target may use the cached artifact. Its content is
//! the newline-separated list of dependencies the build system should track.

use std::path::{Path, PathBuf};

use rcache_util::{FileReader, FileWriter};

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct MarkerFile<F> {
    path: PathBuf,
    fs: F,
}

impl<F: FileReader + FileWriter> MarkerFile<F> {
    pub fn new(path: &Path, fs: F) -> Self {
        Self {
            path: path.to_path_buf(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the marker exists and can be read.
    pub fn can_read(&self) -> bool {
        matches!(self.fs.contents(&self.path), Ok(Some(_)))
    }

    /// # Errors
    /// Returns `InputUnreadable` if the marker does not exist.
    pub fn list_files(&self) -> Result<Vec<PathBuf>, EngineError> {
        let Some(content) = self.fs.contents(&self.path)? else {
            return Err(EngineError::InputUnreadable {
                path: self.path.display().to_string(),
            });
        };
        Ok(String::from_utf8_lossy(&content)
            .lines()
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    /// Create or replace the marker with `dependencies`.
    ///
    /// # Errors
    /// Returns an error if the marker cannot be written.
    pub fn enable(&self, dependencies: &[PathBuf]) -> Result<(), EngineError> {
        let mut content = String::new();
        for dependency in dependencies {
            content.push_str(&dependency.to_string_lossy());
            content.push('\n');
        }
        self.fs.write(&self.path, content.as_bytes())?;
        tracing::debug!(
            path = %self.path.display(),
            dependencies = dependencies.len(),
            "enabled marker"
        );
        Ok(())
    }

    /// Remove the marker. An absent marker is fine.
    ///
    /// # Errors
    /// Returns an error if the marker exists but cannot be removed.
    pub fn disable(&self) -> Result<(), EngineError> {
        self.fs.remove(&self.path)?;
        tracing::debug!(path = %self.path.display(), "disabled marker");
        Ok(())
    }
}
