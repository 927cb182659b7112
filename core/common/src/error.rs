//! Common error types for gworks.

use thiserror::Error;

/// Top-level error type for gworks operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authentication or token lifecycle failure.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network or transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not permitted on the resource.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Provider rejected the request; carries the provider's own message.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Apps Script execution reported an in-band failure.
    #[error("Script error: {0}")]
    Script(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
