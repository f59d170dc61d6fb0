//! Error types for fieldnote-core operations.

use std::path::PathBuf;

/// All errors that can occur in fieldnote-core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
