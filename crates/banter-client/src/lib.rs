//! Client side of the banter chat protocol.
//!
//! The [`ClientSession`] is a pure state machine following the action
//! pattern: the caller feeds in [`ClientEvent`]s (frames from the
//! network, user intents) and executes the returned [`ClientAction`]s
//! (frames to send, notices to surface). No I/O happens inside the
//! machine, which keeps every handshake path unit-testable without a
//! socket.
//!
//! The optional `transport` feature adds a tokio TCP runtime
//! (`transport::connect`) that drives the machine against a real
//! server and exposes mpsc channels for commands and notices.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod session;
#[cfg(feature = "transport")]
pub mod transport;

pub use error::ClientError;
pub use event::{ClientAction, ClientEvent, ClientNotice, SessionFailure};
pub use session::{ClientSession, SessionState};
