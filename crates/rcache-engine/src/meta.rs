//! Meta records shipped at the root of every artifact.

use std::path::{Path, PathBuf};

use rcache_util::{DirScanner, FileReader, FileWriter};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::fingerprint::RawFingerprint;

const META_EXTENSION: &str = "json";

/// Description of a published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMeta {
    /// Key the artifact is stored under.
    #[serde(default)]
    pub file_key: String,
    /// Content fingerprint of the dependencies, without environment.
    #[serde(default)]
    pub raw_fingerprint: RawFingerprint,
    /// Dependencies combined with the environment; compared on consumers.
    #[serde(default)]
    pub fingerprint: RawFingerprint,
    #[serde(default)]
    pub generation_commit: String,
    #[serde(default)]
    pub target_name: String,
    #[serde(default)]
    pub configuration: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub xcode: String,
    /// Fingerprinted dependencies in generic form, in fingerprint order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Asset sources in generic form.
    pub assets_sources: Vec<String>,
    pub assets_sources_fingerprint: RawFingerprint,
}

impl ArtifactMeta {
    /// # Errors
    /// Returns `InputUnreadable` if the file does not exist and `Metadata` if
    /// it is not a valid record.
    pub fn read(path: &Path, reader: &impl FileReader) -> Result<Self, EngineError> {
        let origin = path.display().to_string();
        let Some(content) = reader.contents(path)? else {
            return Err(EngineError::InputUnreadable { path: origin });
        };
        serde_json::from_slice(&content).map_err(|e| EngineError::Metadata {
            path: origin,
            message: e.to_string(),
        })
    }

    /// # Errors
    /// Returns an error if the record cannot be serialized or written.
    pub fn write(&self, path: &Path, writer: &impl FileWriter) -> Result<(), EngineError> {
        let data = serde_json::to_vec_pretty(self).map_err(|e| EngineError::Metadata {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        writer.write(path, &data)?;
        Ok(())
    }
}

/// Find the meta record directly inside `artifact_dir`.
///
/// Subdirectories are not searched. Exactly one `.json` file must be present.
///
/// # Errors
/// Returns `MetadataNotFound` if there are zero or several candidates.
pub fn locate_meta(scanner: &impl DirScanner, artifact_dir: &Path) -> Result<PathBuf, EngineError> {
    let mut candidates: Vec<PathBuf> = scanner
        .items(artifact_dir)?
        .into_iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == META_EXTENSION))
        .collect();
    if candidates.len() != 1 {
        return Err(EngineError::MetadataNotFound {
            dir: artifact_dir.display().to_string(),
            found: candidates.len(),
        });
    }
    candidates.pop().ok_or_else(|| EngineError::MetadataNotFound {
        dir: artifact_dir.display().to_string(),
        found: 0,
    })
}

/// Locate and read the meta record of an artifact.
///
/// # Errors
/// See [`locate_meta`] and [`ArtifactMeta::read`].
pub fn read_artifact_meta<F: FileReader + DirScanner>(
    fs: &F,
    artifact_dir: &Path,
) -> Result<ArtifactMeta, EngineError> {
    let path = locate_meta(fs, artifact_dir)?;
    tracing::debug!(path = %path.display(), "reading meta record");
    ArtifactMeta::read(&path, fs)
}
