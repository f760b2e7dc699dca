// src/error.rs
use std::io;
use thiserror::Error;

/// Errors surfaced by the reliable transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// An I/O error from the underlying UDP socket.
    #[error("network I/O error: {0}")]
    Io(#[from] io::Error),

    /// An internal invariant was violated; indicates a bug in the caller's
    /// dispatch of send results, or in the engine itself.
    #[error("engine state error: {0}")]
    UnexpectedState(String),
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
