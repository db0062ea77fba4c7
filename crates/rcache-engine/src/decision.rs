//! Hit/miss decision for a build step.
//!
//! A [`CacheDecisionEngine`] runs once per invocation. It starts `Disabled` or
//! `Evaluating`, compares the local fingerprint against the one recorded in
//! the artifact meta, and ends `Decided`. Failures on the way never abort the
//! build: they are logged and become a miss. Only [`CacheDecisionEngine::persist`]
//! propagates its error.

use std::path::{Path, PathBuf};

use rcache_util::{DirScanner, FileReader, FileWriter};

use crate::dependency::PathClassifier;
use crate::error::EngineError;
use crate::fingerprint::{
    content_fingerprint, FingerprintGenerator, RawFingerprint, Sha256Accumulator,
};
use crate::marker::MarkerFile;
use crate::meta::{read_artifact_meta, ArtifactMeta};
use crate::remap::PathRemapper;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheVerdict {
    /// The cached artifact can be used; the build system should track these files.
    Hit(Vec<PathBuf>),
    Miss,
}

impl CacheVerdict {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionState {
    Disabled,
    Evaluating,
    Decided(CacheVerdict),
}

/// Supplies the two fingerprints a decision compares.
pub trait FingerprintCheck {
    /// Whether the step only runs after an earlier phase enabled the marker.
    fn requires_marker(&self) -> bool;

    /// # Errors
    /// Returns an error if a file that should be fingerprinted is missing or
    /// unreadable.
    fn local_fingerprint(&self, meta: &ArtifactMeta) -> Result<RawFingerprint, EngineError>;

    fn expected_fingerprint(&self, meta: &ArtifactMeta) -> RawFingerprint;

    /// Dependencies reported on a hit.
    ///
    /// # Errors
    /// Returns an error if the dependency list cannot be read.
    fn hit_dependencies<F: FileReader + FileWriter>(
        &self,
        meta: &ArtifactMeta,
        marker: &MarkerFile<F>,
    ) -> Result<Vec<PathBuf>, EngineError>;
}

/// Asset catalog step: hashes the recorded asset sources.
#[derive(Debug, Clone)]
pub struct AssetsSourcesCheck<R> {
    reader: R,
    remapper: PathRemapper,
}

impl<R: FileReader + Clone> AssetsSourcesCheck<R> {
    pub fn new(reader: R, remapper: PathRemapper) -> Self {
        Self { reader, remapper }
    }
}

impl<R: FileReader + Clone> FingerprintCheck for AssetsSourcesCheck<R> {
    fn requires_marker(&self) -> bool {
        true
    }

    fn local_fingerprint(&self, meta: &ArtifactMeta) -> Result<RawFingerprint, EngineError> {
        let sources: Vec<PathBuf> = meta
            .assets_sources
            .iter()
            .map(|source| self.remapper.path_to_local(source))
            .collect();
        content_fingerprint(self.reader.clone(), &sources)
    }

    fn expected_fingerprint(&self, meta: &ArtifactMeta) -> RawFingerprint {
        meta.assets_sources_fingerprint.clone()
    }

    fn hit_dependencies<F: FileReader + FileWriter>(
        &self,
        _meta: &ArtifactMeta,
        marker: &MarkerFile<F>,
    ) -> Result<Vec<PathBuf>, EngineError> {
        marker.list_files()
    }
}

/// Compilation step: hashes the fingerprint-relevant recorded dependencies
/// together with the environment.
#[derive(Debug, Clone)]
pub struct DependenciesCheck<R> {
    reader: R,
    classifier: PathClassifier,
    remapper: PathRemapper,
    env_fingerprint: RawFingerprint,
}

impl<R: FileReader + Clone> DependenciesCheck<R> {
    pub fn new(
        reader: R,
        classifier: PathClassifier,
        remapper: PathRemapper,
        env_fingerprint: RawFingerprint,
    ) -> Self {
        Self {
            reader,
            classifier,
            remapper,
            env_fingerprint,
        }
    }

    fn local_dependencies(&self, meta: &ArtifactMeta) -> Vec<PathBuf> {
        meta.dependencies
            .iter()
            .map(|dependency| self.remapper.path_to_local(dependency))
            .collect()
    }
}

impl<R: FileReader + Clone> FingerprintCheck for DependenciesCheck<R> {
    fn requires_marker(&self) -> bool {
        false
    }

    fn local_fingerprint(&self, meta: &ArtifactMeta) -> Result<RawFingerprint, EngineError> {
        let classification = self.classifier.classify(&self.local_dependencies(meta));
        let mut generator = FingerprintGenerator::new(
            self.env_fingerprint.clone(),
            Sha256Accumulator::new(self.reader.clone()),
        );
        generator.append_files(&classification.fingerprint_paths())?;
        Ok(generator.generate().context_specific)
    }

    fn expected_fingerprint(&self, meta: &ArtifactMeta) -> RawFingerprint {
        meta.fingerprint.clone()
    }

    fn hit_dependencies<F: FileReader + FileWriter>(
        &self,
        meta: &ArtifactMeta,
        _marker: &MarkerFile<F>,
    ) -> Result<Vec<PathBuf>, EngineError> {
        Ok(self.local_dependencies(meta))
    }
}

/// One-shot decision for a single build step.
pub struct CacheDecisionEngine<C, F> {
    check: C,
    fs: F,
    artifact_dir: PathBuf,
    marker: MarkerFile<F>,
    state: DecisionState,
}

impl<C, F> CacheDecisionEngine<C, F>
where
    C: FingerprintCheck,
    F: FileReader + FileWriter + DirScanner + Clone,
{
    /// `enabled` is the feature flag of the step. The engine also starts
    /// disabled when the check requires a marker that cannot be read.
    pub fn new(check: C, enabled: bool, artifact_dir: &Path, marker_path: &Path, fs: F) -> Self {
        let marker = MarkerFile::new(marker_path, fs.clone());
        let state = if !enabled {
            tracing::debug!("cache disabled by configuration");
            DecisionState::Disabled
        } else if check.requires_marker() && !marker.can_read() {
            tracing::debug!(marker = %marker_path.display(), "marker not readable, cache disabled");
            DecisionState::Disabled
        } else {
            DecisionState::Evaluating
        };
        Self {
            check,
            fs,
            artifact_dir: artifact_dir.to_path_buf(),
            marker,
            state,
        }
    }

    pub fn state(&self) -> &DecisionState {
        &self.state
    }

    /// Decide once. Later calls return the same verdict.
    pub fn decide(&mut self) -> CacheVerdict {
        let verdict = match &self.state {
            DecisionState::Decided(verdict) => return verdict.clone(),
            DecisionState::Disabled => CacheVerdict::Miss,
            DecisionState::Evaluating => match self.evaluate() {
                Ok(verdict) => verdict,
                Err(e @ EngineError::MissingExpectedFile { .. }) => {
                    tracing::error!(error = %e, "fingerprinting failed, falling back to a miss");
                    CacheVerdict::Miss
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cache decision failed, falling back to a miss");
                    CacheVerdict::Miss
                }
            },
        };
        self.state = DecisionState::Decided(verdict.clone());
        verdict
    }

    fn evaluate(&self) -> Result<CacheVerdict, EngineError> {
        let meta = read_artifact_meta(&self.fs, &self.artifact_dir)?;
        let local = self.check.local_fingerprint(&meta)?;
        let expected = self.check.expected_fingerprint(&meta);
        if local != expected {
            tracing::info!(%local, %expected, "fingerprint mismatch");
            return Ok(CacheVerdict::Miss);
        }
        let dependencies = self.check.hit_dependencies(&meta, &self.marker)?;
        tracing::info!(dependencies = dependencies.len(), "cache hit");
        Ok(CacheVerdict::Hit(dependencies))
    }

    /// Record the verdict in the marker: written on a hit, removed on a miss.
    ///
    /// # Errors
    /// Returns an error if the marker cannot be written or removed. The build
    /// step must then fail.
    pub fn persist(&self, verdict: &CacheVerdict) -> Result<(), EngineError> {
        match verdict {
            CacheVerdict::Hit(dependencies) => self.marker.enable(dependencies),
            CacheVerdict::Miss => self.marker.disable(),
        }
    }

    /// [`decide`](Self::decide) then [`persist`](Self::persist).
    ///
    /// # Errors
    /// Returns an error only if persisting fails.
    pub fn run(&mut self) -> Result<CacheVerdict, EngineError> {
        let verdict = self.decide();
        self.persist(&verdict)?;
        Ok(verdict)
    }
}
