//! Server error types.

use thiserror::Error;

/// Errors surfaced by the server runtime.
///
/// Per-session failures (decode errors, send failures) never appear
/// here: they are isolated to the one session inside the driver. This
/// type covers failures of the server itself.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Binding the listen socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An I/O operation on the listener failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
