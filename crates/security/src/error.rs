//! Security specific errors for the Wayfarer fetch engine.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum SecurityError {
    #[error("Malformed certificate: {0}")]
    InvalidCertificate(String),

    #[error("Client identity cannot be used with scheme: {scheme}")]
    UnsupportedIdentity { scheme: String },

    #[error("Client identity '{name}' is not valid at this time")]
    ExpiredIdentity { name: String },

    #[error("Invalid host filter pattern '{pattern}': {reason}")]
    InvalidHostFilter { pattern: String, reason: String },

    #[error("Failed to persist security state at {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SecurityResult<T> = Result<T, SecurityError>;
