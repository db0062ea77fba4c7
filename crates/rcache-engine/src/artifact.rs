//! Adaptation of artifact content between machines.
//!
//! Published artifacts carry generic placeholders (`$(SRCROOT)`) instead of
//! absolute paths. A consumer rewrites them to local paths after download and
//! a producer rewrites local paths back before upload. Every processed file
//! also gets a sidecar `<file>.<ext>` holding the digest of its generic
//! content, so sidecars from any machine compare equal.

use std::path::{Path, PathBuf};

use rcache_util::hash::sha256_bytes;
use rcache_util::{DirScanner, FileReader, FileWriter};

use crate::error::EngineError;
use crate::remap::{FileRemapper, PathRemapper, RemapDirection};

/// Default artifact subdirectories whose files are rewritten.
pub const DEFAULT_REMAPPING_DIRS: [&str; 1] = ["include"];

/// Prepares an artifact directory for use on this machine or for publishing.
pub trait ArtifactProcessor {
    /// Adapt a downloaded artifact: sidecar from generic content, then rewrite
    /// to local paths.
    ///
    /// # Errors
    /// Returns an error if any file cannot be read, rewritten, or fingerprinted.
    fn process_raw(&self, artifact_dir: &Path) -> Result<(), EngineError>;

    /// Adapt a locally built artifact: rewrite to generic placeholders, then
    /// write the sidecar.
    ///
    /// # Errors
    /// Returns an error if any file cannot be read, rewritten, or fingerprinted.
    fn process_local(&self, artifact_dir: &Path) -> Result<(), EngineError>;
}

/// Rewrites text files (generated headers) under the configured subdirectories.
#[derive(Debug, Clone)]
pub struct HeaderArtifactProcessor<F> {
    fs: F,
    file_remapper: FileRemapper<F>,
    remapping_dirs: Vec<String>,
    sidecar_extension: String,
}

impl<F: FileReader + FileWriter + DirScanner + Clone> HeaderArtifactProcessor<F> {
    pub fn new(
        remapper: PathRemapper,
        remapping_dirs: Vec<String>,
        sidecar_extension: impl Into<String>,
        fs: F,
    ) -> Self {
        Self {
            file_remapper: FileRemapper::new(remapper, fs.clone()),
            fs,
            remapping_dirs,
            sidecar_extension: sidecar_extension.into(),
        }
    }

    /// Sidecar location for `file`.
    pub fn sidecar_path(&self, file: &Path) -> PathBuf {
        let mut name = file.as_os_str().to_owned();
        name.push(".");
        name.push(&self.sidecar_extension);
        PathBuf::from(name)
    }

    /// Files to process, skipping hidden files and existing sidecars.
    fn files(&self, artifact_dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let mut files = Vec::new();
        for dir in &self.remapping_dirs {
            for file in self.fs.recursive_items(&artifact_dir.join(dir))? {
                let hidden = file
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with('.'));
                let sidecar = file
                    .extension()
                    .is_some_and(|ext| ext == self.sidecar_extension.as_str());
                if !hidden && !sidecar {
                    files.push(file);
                }
            }
        }
        Ok(files)
    }

    fn write_sidecar(&self, file: &Path) -> Result<(), EngineError> {
        let Some(content) = self.fs.contents(file)? else {
            return Err(EngineError::missing_expected(file));
        };
        let digest = sha256_bytes(&content);
        self.fs.write(&self.sidecar_path(file), digest.as_bytes())?;
        Ok(())
    }
}

impl<F: FileReader + FileWriter + DirScanner + Clone> ArtifactProcessor
    for HeaderArtifactProcessor<F>
{
    fn process_raw(&self, artifact_dir: &Path) -> Result<(), EngineError> {
        let files = self.files(artifact_dir)?;
        for file in &files {
            self.write_sidecar(file)?;
            self.file_remapper.remap(file, RemapDirection::ToLocal)?;
        }
        tracing::info!(
            artifact = %artifact_dir.display(),
            files = files.len(),
            "adapted raw artifact"
        );
        Ok(())
    }

    fn process_local(&self, artifact_dir: &Path) -> Result<(), EngineError> {
        let files = self.files(artifact_dir)?;
        for file in &files {
            self.file_remapper.remap(file, RemapDirection::ToGeneric)?;
            self.write_sidecar(file)?;
        }
        tracing::info!(
            artifact = %artifact_dir.display(),
            files = files.len(),
            "adapted local artifact"
        );
        Ok(())
    }
}
