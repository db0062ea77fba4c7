//! Error types for rcache-util.

/// Errors produced by filesystem helpers.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A directory walk failed part-way through.
    #[error("cannot scan {path}: {message}")]
    Scan { path: String, message: String },
}

impl UtilError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
