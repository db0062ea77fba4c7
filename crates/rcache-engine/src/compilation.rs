//! Producer-side fingerprint of a finished compilation.

use std::path::{Path, PathBuf};

use rcache_compiler::{CompilationInfoReader, FilemapEditor};
use rcache_config::OverlayMerge;
use rcache_util::FileReader;

use crate::dependency::PathClassifier;
use crate::error::EngineError;
use crate::fingerprint::{
    content_fingerprint, FingerprintGenerator, RawFingerprint, Sha256Accumulator,
};
use crate::meta::ArtifactMeta;
use crate::overlay::{JsonOverlayReader, MappingOrder, OverlayDependencyRewriter};
use crate::reader::{CombinedDependenciesReader, DependenciesReader, FileDependenciesReader};
use crate::remap::PathRemapper;

/// Descriptive fields copied into the meta record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaDetails {
    pub generation_commit: String,
    pub target_name: String,
    pub configuration: String,
    pub platform: String,
    pub xcode: String,
}

/// Builds the meta record of a compilation from its file map.
pub struct CompilationFingerprinter<'a, R> {
    reader: R,
    classifier: &'a PathClassifier,
    remapper: &'a PathRemapper,
    env_fingerprint: RawFingerprint,
    overlay: Option<(PathBuf, OverlayMerge)>,
}

impl<'a, R: FileReader + Clone> CompilationFingerprinter<'a, R> {
    pub fn new(
        reader: R,
        classifier: &'a PathClassifier,
        remapper: &'a PathRemapper,
        env_fingerprint: RawFingerprint,
    ) -> Self {
        Self {
            reader,
            classifier,
            remapper,
            env_fingerprint,
            overlay: None,
        }
    }

    /// Map virtual dependency paths back to local files through `overlay`.
    pub fn with_overlay(mut self, overlay: &Path, merge: OverlayMerge) -> Self {
        self.overlay = Some((overlay.to_path_buf(), merge));
        self
    }

    /// Every dependency reported by the `.d` files the file map names.
    ///
    /// # Errors
    /// Returns an error if the file map, a dependency file, or the overlay
    /// cannot be read.
    pub fn dependencies(&self, filemap: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let info = FilemapEditor::new(filemap, self.reader.clone()).read()?;
        let readers: Vec<_> = info
            .dependency_files()
            .iter()
            .map(|file| FileDependenciesReader::new(file, self.reader.clone()))
            .collect();
        let combined = CombinedDependenciesReader::new(readers);

        let dependencies = match &self.overlay {
            Some((overlay, merge)) => OverlayDependencyRewriter::new(
                combined,
                JsonOverlayReader::new(overlay, self.reader.clone()),
                MappingOrder::VirtualToLocal,
                *merge,
            )
            .find_dependencies()?,
            None => combined.find_dependencies()?,
        };
        Ok(dependencies.into_iter().map(PathBuf::from).collect())
    }

    /// Fingerprint the compilation described by `filemap`.
    ///
    /// Fingerprint-relevant dependencies are hashed sorted and deduplicated,
    /// and recorded in that order in generic form.
    ///
    /// # Errors
    /// Returns an error if an input cannot be read or a dependency is missing.
    pub fn fingerprint(
        &self,
        filemap: &Path,
        details: MetaDetails,
    ) -> Result<ArtifactMeta, EngineError> {
        let classification = self.classifier.classify(&self.dependencies(filemap)?);

        let mut scoped = classification.fingerprint_paths();
        scoped.sort();
        scoped.dedup();
        let mut generator = FingerprintGenerator::new(
            self.env_fingerprint.clone(),
            Sha256Accumulator::new(self.reader.clone()),
        );
        generator.append_files(&scoped)?;
        let fingerprint = generator.generate();

        let mut assets: Vec<PathBuf> = classification
            .asset_source
            .iter()
            .map(|d| d.path.clone())
            .collect();
        assets.sort();
        assets.dedup();
        let assets_fingerprint = content_fingerprint(self.reader.clone(), &assets)?;

        tracing::info!(
            dependencies = scoped.len(),
            assets = assets.len(),
            fingerprint = %fingerprint.context_specific,
            "fingerprinted compilation"
        );

        Ok(ArtifactMeta {
            file_key: fingerprint.context_specific.to_string(),
            raw_fingerprint: fingerprint.raw,
            fingerprint: fingerprint.context_specific,
            generation_commit: details.generation_commit,
            target_name: details.target_name,
            configuration: details.configuration,
            platform: details.platform,
            xcode: details.xcode,
            dependencies: self.to_generic(&scoped),
            assets_sources: self.to_generic(&assets),
            assets_sources_fingerprint: assets_fingerprint,
        })
    }

    fn to_generic(&self, paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|path| self.remapper.path_to_generic(path))
            .collect()
    }
}
