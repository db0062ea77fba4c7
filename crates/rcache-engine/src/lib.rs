//! Cache keys, artifact adaptation and hit/miss decisions for remote build caching.

pub mod artifact;
pub mod compilation;
pub mod context;
pub mod decision;
pub mod dependency;
pub mod environment;
pub mod error;
pub mod fingerprint;
pub mod marker;
pub mod meta;
pub mod overlay;
pub mod reader;
pub mod remap;

pub use artifact::{ArtifactProcessor, HeaderArtifactProcessor, DEFAULT_REMAPPING_DIRS};
pub use compilation::{CompilationFingerprinter, MetaDetails};
pub use context::BuildContext;
pub use decision::{
    AssetsSourcesCheck, CacheDecisionEngine, CacheVerdict, DecisionState, DependenciesCheck,
    FingerprintCheck,
};
pub use dependency::{
    ClassificationResult, ClassifierRoots, Dependency, DependencyKind, PathClassifier,
};
pub use environment::EnvironmentFingerprintGenerator;
pub use error::EngineError;
pub use fingerprint::{
    Fingerprint, FingerprintAccumulator, FingerprintGenerator, RawFingerprint, Sha256Accumulator,
};
pub use marker::MarkerFile;
pub use meta::{locate_meta, read_artifact_meta, ArtifactMeta};
pub use overlay::{
    JsonOverlayReader, MappingOrder, OverlayDependencyRewriter, OverlayMapping, OverlayReader,
};
pub use reader::{CombinedDependenciesReader, DependenciesReader, FileDependenciesReader};
pub use remap::{FileRemapper, PathRemapper, RemapDirection, RemapRule};
