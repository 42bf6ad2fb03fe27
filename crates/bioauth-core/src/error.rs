//! Error types for bioauth-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for store and settings operations
pub type Result<T> = std::result::Result<T, BioauthError>;

/// Errors raised by the store and configuration layers.
///
/// Authentication never produces one of these: every native outcome is
/// mapped into [`crate::AuthOutcome`] instead.
#[derive(Error, Debug)]
pub enum BioauthError {
    #[error("Failed to open preference store at {path:?}: {source}")]
    StoreOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not determine data directory")]
    DataDirUnavailable,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
