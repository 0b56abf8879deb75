//! Error types for PolyNest.

use thiserror::Error;

/// Result type alias for PolyNest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during nesting operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid part geometry (degenerate outline, duplicate id, ...).
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Invalid bin polygon.
    #[error("Invalid boundary: {0}")]
    InvalidBoundary(String),

    /// Configuration rejected by validation.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// NFP computation failed for a pair.
    #[error("NFP computation failed: {0}")]
    NfpError(String),

    /// `tick` was called before `start`.
    #[error("Nester has not been started")]
    NotStarted,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
