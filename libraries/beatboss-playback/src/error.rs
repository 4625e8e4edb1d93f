//! Error types for playback management

use thiserror::Error;

/// Errors surfaced by the playback service
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The service task has shut down
    #[error("Playback service is no longer running")]
    ServiceClosed,

    /// Index out of bounds
    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Media backend error
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Source resolution error
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Source resolution failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The catalog reports the track as unavailable
    #[error("Track not found: {track_id}")]
    NotFound { track_id: String },

    /// Transient failures exhausted the retry budget
    #[error("Transport failure for {track_id} after {attempts} attempts: {message}")]
    TransportFailure {
        track_id: String,
        attempts: u32,
        message: String,
    },
}

/// Catalog client failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Track is not available for streaming
    #[error("Track unavailable")]
    Unavailable,

    /// Network hiccup, worth retrying
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Media backend failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Source could not be opened or the stream broke
    #[error("Backend transport error: {0}")]
    Transport(String),

    /// Operation not supported by this backend
    #[error("Unsupported backend operation: {0}")]
    Unsupported(String),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
