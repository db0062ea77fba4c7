//! Error types for rcache-compiler.

/// Errors produced while reading or writing compiler file formats.
#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    /// The file could not be read (including when it does not exist).
    #[error("cannot read {path}")]
    ReadingFailed { path: String },

    /// The content is present but structurally wrong.
    #[error("invalid format in {path}: {message}")]
    InvalidFormat { path: String, message: String },

    /// A required field is absent.
    #[error("missing required field `{field}` in {path}")]
    MissingField { path: String, field: String },

    /// Serialization of a file map failed.
    #[error("cannot serialize {path}: {source}")]
    Serialize {
        path: String,
        source: serde_json::Error,
    },

    /// An error propagated from rcache-util.
    #[error("{0}")]
    Util(#[from] rcache_util::UtilError),
}
