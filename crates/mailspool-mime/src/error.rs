//! Error types for message composition and rendering.

use std::io;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME composition and rendering error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error while reading a body source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Body source could not be read.
    #[error("Cannot read body source: {0}")]
    Source(String),

    /// Renderer was driven in an invalid state.
    #[error("Invalid renderer state: {0}")]
    InvalidState(String),
}
