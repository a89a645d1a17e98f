//! Observer interface between the core and the surrounding UI.
//!
//! One tagged-union event type with a single `handle` method, implemented
//! once per concrete front-end (console, test mock). The core never
//! performs presentation - no color, no formatting - it only emits these
//! events with their data.

use banter_proto::Role;

/// Events the server core reports to its observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotification {
    /// A connection was accepted and entered the handshake.
    ConnectionAccepted {
        /// Remote address.
        addr: String,
    },

    /// A connection was rejected because the server is full.
    ConnectionRejected {
        /// Remote address.
        addr: String,
    },

    /// A connection from a blocked address was turned away.
    ConnectionBlocked {
        /// Remote address.
        addr: String,
    },

    /// A session completed its handshake and joined the broadcast set.
    SessionActive {
        /// Display name.
        name: String,
        /// Remote address.
        addr: String,
    },

    /// An active session disconnected.
    SessionInactive {
        /// Display name (address if the name never arrived).
        name: String,
        /// Remote address.
        addr: String,
    },

    /// Chat text arrived from an active session.
    TextReceived {
        /// Sender's role.
        role: Role,
        /// Sender's display name.
        name: String,
        /// Message body.
        body: String,
    },

    /// A session was kicked by the operator.
    SessionKicked {
        /// Display name.
        name: String,
        /// Remote address.
        addr: String,
    },

    /// A session's role was changed by the operator.
    SessionPromoted {
        /// Display name.
        name: String,
        /// Newly granted role.
        role: Role,
        /// True if the change was a strict promotion.
        promoted: bool,
    },

    /// A send or receive failed on a session's transport.
    TransportError {
        /// Remote address.
        addr: String,
        /// Description of the failure.
        context: String,
    },

    /// The server is shutting down.
    ShuttingDown,
}

/// Event sink implemented by each front-end.
pub trait ServerObserver: Send + Sync + 'static {
    /// Handle one notification. Must not block: this is called from the
    /// server's dispatch path.
    fn handle(&self, notification: ServerNotification);
}
