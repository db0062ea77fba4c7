//! Error types for rcache-engine.

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] rcache_util::UtilError),

    /// A compiler file format could not be read.
    #[error("{0}")]
    Compiler(#[from] rcache_compiler::CompilerError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] rcache_config::ConfigError),

    /// A cache input (meta record, dependency list, marker) could not be read.
    #[error("cannot read {path}")]
    InputUnreadable { path: String },

    /// Content is present but structurally wrong.
    #[error("invalid format in {path}: {message}")]
    InvalidFormat { path: String, message: String },

    /// A required build environment variable is not set.
    #[error("environment variable {name} is not set; run inside a build phase or export it")]
    MissingEnv { name: String },

    /// A required field is absent from a cache input.
    #[error("missing required field `{field}` in {path}")]
    MissingField { path: String, field: String },

    /// A dependency exclusion pattern does not compile.
    #[error("invalid exclusion pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A file expected to exist at fingerprinting time is absent.
    #[error("expected file {path} is missing; the step that produces it did not run or failed")]
    MissingExpectedFile { path: String },

    /// The overlay descriptor does not exist.
    #[error("overlay descriptor {path} does not exist")]
    OverlayMissing { path: String },

    /// The overlay descriptor cannot be decoded.
    #[error("invalid overlay descriptor {path}: {message}")]
    OverlayInvalid { path: String, message: String },

    /// The overlay descriptor uses a layout that cannot be flattened into mappings.
    #[error("unsupported overlay layout in {path}: {message}")]
    UnsupportedOverlayShape { path: String, message: String },

    /// Two dependency keys collapsed onto the same path after overlay remapping.
    #[error("overlay remapping maps several files onto {path}")]
    OverlayDuplication { path: String },

    /// The artifact does not contain exactly one meta record at its root.
    #[error("expected exactly one meta file in {dir}, found {found}")]
    MetadataNotFound { dir: String, found: usize },

    /// A meta record could not be serialized or deserialized.
    #[error("cannot process meta record {path}: {message}")]
    Metadata { path: String, message: String },
}

impl EngineError {
    pub(crate) fn missing_expected(path: &std::path::Path) -> Self {
        Self::MissingExpectedFile {
            path: path.display().to_string(),
        }
    }
}
