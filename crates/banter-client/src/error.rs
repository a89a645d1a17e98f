//! Client error types.

use thiserror::Error;

use crate::session::SessionState;

/// Errors surfaced by the client state machine and transport.
///
/// Protocol violations from the server are not errors here: they have
/// defined terminal behavior and are reported through
/// [`ClientNotice::SessionFailed`](crate::ClientNotice::SessionFailed).
/// `ClientError` covers caller mistakes and transport failures.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The caller invoked an operation invalid for the current state,
    /// e.g. submitting text before the session is active.
    #[error("invalid state: cannot {operation} while {state:?}")]
    InvalidState {
        /// State when the operation was attempted.
        state: SessionState,
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// The initial transport connect failed or timed out.
    #[error("unable to connect: {0}")]
    Connect(String),

    /// An established transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}
