//! Classification of raw compilation dependencies.
//!
//! Build systems report every file a compilation touched: SDK headers, files
//! generated on the fly, products of other targets, and the project sources.
//! Only some of them say anything about whether a cached artifact is still
//! valid. [`PathClassifier`] assigns each path a [`DependencyKind`] by
//! root-prefix rules and splits the result into fingerprint-scoped, asset
//! source, and extra buckets.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::EngineError;

/// Base name of the asset symbols file generated from asset catalogs into the
/// derived sources directory.
pub const GENERATED_ASSETS_FILENAME: &str = "GeneratedAssetSymbols";
const GENERATED_ASSETS_EXTENSIONS: [&str; 2] = ["swift", "h"];
const MODULEMAP_EXTENSION: &str = "modulemap";

/// Where a dependency lives and therefore how it affects caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// Inside the toolchain (SDK headers, compiler resources).
    Toolchain,
    /// Product of another target.
    Product,
    /// Project source.
    Source,
    /// Sidecar fingerprint of a generated header, hashed in place of the header.
    GeneratedFingerprintSidecar,
    /// Per-target intermediate build file.
    Intermediate,
    /// File in the derived sources directory.
    DerivedFile,
    /// Product of the target itself.
    OwnProduct,
    /// Matched a user exclusion pattern.
    UserExcluded,
    /// The asset symbols file generated from asset catalogs.
    GeneratedAssetSymbol,
    Unknown,
}

/// Evaluation order of the classification rules; the first match wins and
/// anything unmatched is [`DependencyKind::Unknown`].
pub const PRECEDENCE: [DependencyKind; 8] = [
    DependencyKind::UserExcluded,
    DependencyKind::Toolchain,
    DependencyKind::GeneratedAssetSymbol,
    DependencyKind::Intermediate,
    DependencyKind::DerivedFile,
    DependencyKind::OwnProduct,
    DependencyKind::Product,
    DependencyKind::Source,
];

/// A classified dependency. `path` is the path as reported, before symlink
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub path: PathBuf,
    pub kind: DependencyKind,
}

impl Dependency {
    pub fn new(path: impl Into<PathBuf>, kind: DependencyKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Whether a change to this file must invalidate the cache.
    ///
    /// Toolchain files are covered by the toolchain version in the environment
    /// fingerprint, intermediate and derived files are regenerated per build,
    /// and a target's own products come from the artifact on a hit. Module maps
    /// of other products describe build topology, not an actual import.
    pub fn is_fingerprint_relevant(&self) -> bool {
        match self.kind {
            DependencyKind::Toolchain
            | DependencyKind::Intermediate
            | DependencyKind::OwnProduct
            | DependencyKind::DerivedFile
            | DependencyKind::UserExcluded
            | DependencyKind::GeneratedAssetSymbol => false,
            DependencyKind::Product => self
                .path
                .extension()
                .is_none_or(|ext| ext != MODULEMAP_EXTENSION),
            DependencyKind::Source
            | DependencyKind::GeneratedFingerprintSidecar
            | DependencyKind::Unknown => true,
        }
    }
}

/// Dependencies split into disjoint buckets, each in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationResult {
    /// Must be part of the fingerprint.
    pub fingerprint_scoped: Vec<Dependency>,
    /// Asset symbol files, checked against the asset sources fingerprint.
    pub asset_source: Vec<Dependency>,
    /// Everything else.
    pub extra: Vec<Dependency>,
}

impl ClassificationResult {
    /// Total number of classified dependencies.
    pub fn len(&self) -> usize {
        self.fingerprint_scoped.len() + self.asset_source.len() + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paths of the fingerprint-scoped bucket.
    pub fn fingerprint_paths(&self) -> Vec<PathBuf> {
        self.fingerprint_scoped
            .iter()
            .map(|d| d.path.clone())
            .collect()
    }
}

/// Root directories that drive classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierRoots {
    pub toolchain: PathBuf,
    pub product: PathBuf,
    pub source: PathBuf,
    pub intermediate: PathBuf,
    pub derived_files: PathBuf,
    /// Bundle produced by the target itself, if any.
    pub bundle: Option<PathBuf>,
}

/// Classifies dependency paths by root prefix and exclusion patterns.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    toolchain: String,
    product: String,
    source: String,
    intermediate: String,
    derived_files: String,
    bundle: Option<String>,
    exclusions: Vec<Regex>,
}

impl PathClassifier {
    /// Build a classifier.
    ///
    /// # Errors
    /// Returns an error if an exclusion pattern is not a valid regular expression.
    pub fn new(roots: &ClassifierRoots, exclusions: &[String]) -> Result<Self, EngineError> {
        let exclusions = exclusions
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| EngineError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            toolchain: dir_prefix(&roots.toolchain),
            product: dir_prefix(&roots.product),
            source: dir_prefix(&roots.source),
            intermediate: dir_prefix(&roots.intermediate),
            derived_files: dir_prefix(&roots.derived_files),
            bundle: roots.bundle.as_deref().map(dir_prefix),
            exclusions,
        })
    }

    /// Classify `paths` and split them into buckets.
    pub fn classify(&self, paths: &[PathBuf]) -> ClassificationResult {
        let mut result = ClassificationResult::default();
        for path in paths {
            let dependency = Dependency::new(path.clone(), self.kind_of(path));
            if dependency.is_fingerprint_relevant() {
                result.fingerprint_scoped.push(dependency);
            } else if dependency.kind == DependencyKind::GeneratedAssetSymbol {
                result.asset_source.push(dependency);
            } else {
                result.extra.push(dependency);
            }
        }
        tracing::debug!(
            fingerprint_scoped = result.fingerprint_scoped.len(),
            asset_source = result.asset_source.len(),
            extra = result.extra.len(),
            "classified dependencies"
        );
        result
    }

    /// The kind of a single path, after resolving symlinks.
    pub fn kind_of(&self, path: &Path) -> DependencyKind {
        let resolved = rcache_util::fs::resolve_symlinks(path);
        let resolved = resolved.to_string_lossy();
        PRECEDENCE
            .into_iter()
            .find(|kind| self.matches(*kind, &resolved))
            .unwrap_or(DependencyKind::Unknown)
    }

    fn matches(&self, kind: DependencyKind, path: &str) -> bool {
        match kind {
            DependencyKind::UserExcluded => self.exclusions.iter().any(|re| re.is_match(path)),
            DependencyKind::Toolchain => path.starts_with(&self.toolchain),
            DependencyKind::GeneratedAssetSymbol => self.is_generated_asset_symbol(path),
            DependencyKind::Intermediate => path.starts_with(&self.intermediate),
            DependencyKind::DerivedFile => path.starts_with(&self.derived_files),
            DependencyKind::OwnProduct => self
                .bundle
                .as_ref()
                .is_some_and(|bundle| path.starts_with(bundle)),
            DependencyKind::Product => path.starts_with(&self.product),
            DependencyKind::Source => path.starts_with(&self.source),
            DependencyKind::GeneratedFingerprintSidecar | DependencyKind::Unknown => false,
        }
    }

    /// Only a file directly in the derived files root with the exact generated name.
    fn is_generated_asset_symbol(&self, path: &str) -> bool {
        let Some(file_name) = path.strip_prefix(&self.derived_files) else {
            return false;
        };
        GENERATED_ASSETS_EXTENSIONS
            .iter()
            .any(|ext| file_name == format!("{GENERATED_ASSETS_FILENAME}.{ext}"))
    }
}

/// A root as a string ending in exactly one separator, so `/Xcode` never
/// matches `/XcodeBeta/...`.
fn dir_prefix(root: &Path) -> String {
    let resolved = rcache_util::fs::resolve_symlinks(root);
    let mut prefix = resolved.to_string_lossy().into_owned();
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}
