//! Client events, actions, and observer notices.

use banter_proto::{Identity, Message, PresenceReason, Role};
use bytes::Bytes;

/// Events the caller feeds into the session state machine.
///
/// The caller is responsible for:
/// - Receiving frame bodies from the network
/// - Forwarding user intents (send text, answer a password challenge)
/// - Reporting transport lifecycle changes
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The transport connected; the handshake begins (the server speaks
    /// first).
    TransportConnected,

    /// A frame body arrived from the server.
    FrameReceived(Bytes),

    /// The user wants to send chat text.
    SubmitText(String),

    /// The user answered the password challenge. `None` aborts the
    /// challenge and closes the session - the only way to end it, since
    /// retries are otherwise unbounded.
    SubmitPassword(Option<String>),

    /// The transport closed (EOF or receive failure).
    TransportClosed,

    /// The user wants to leave.
    Quit,
}

/// Actions the session produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Send this message to the server.
    Send(Message),

    /// Send the untagged identity payload (once, right after
    /// `Connected`).
    SendIdentity(Identity),

    /// Surface this notice to the observer.
    Notify(ClientNotice),

    /// Tear down the transport; the session is closed.
    Close {
        /// Reason for closing, for logs.
        reason: String,
    },
}

/// Why a session ended without (or instead of) becoming active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFailure {
    /// The transport could not be established or dropped mid-handshake.
    UnableToConnect,
    /// The server's active-session limit is reached.
    ServerIsFull,
    /// This address is blocked by the server.
    Blocked,
    /// The server sent a malformed or unexpected frame.
    ProtocolViolation,
}

/// Observer notices - one variant per event the surrounding UI renders.
///
/// The core never performs presentation; it only emits these with their
/// data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientNotice {
    /// The handshake completed; the session is active.
    Connected,

    /// The server requires a password. `retry` is true after a mismatch.
    PasswordRequired {
        /// Whether this is a re-prompt after a wrong password.
        retry: bool,
    },

    /// Chat text from a peer.
    Text {
        /// Sender's role.
        role: Role,
        /// Sender's display name.
        name: String,
        /// Message body.
        body: String,
    },

    /// Text from the server operator.
    ServerNotice {
        /// Notice body.
        body: String,
    },

    /// This session was kicked while active.
    Kicked,

    /// A peer completed its handshake.
    PeerJoined {
        /// The peer's display name.
        name: String,
    },

    /// A peer left the broadcast set.
    PeerLeft {
        /// The peer's display name.
        name: String,
        /// Whether the peer disconnected or was kicked.
        reason: PresenceReason,
    },

    /// This session's role changed.
    Promoted {
        /// The newly granted role.
        role: Role,
        /// True if the change was a strict promotion by role order.
        promoted: bool,
    },

    /// A peer's role changed.
    PeerPromotionChanged {
        /// The peer's new role.
        role: Role,
        /// The peer's display name.
        name: String,
        /// True if the change was a strict promotion.
        promoted: bool,
    },

    /// The server is shutting down.
    ServerShutdown,

    /// The transport dropped while active - distinct from an explicit
    /// kick.
    Disconnected,

    /// The session ended without becoming (or while becoming) active.
    SessionFailed {
        /// Terminal failure classification.
        failure: SessionFailure,
    },

    /// A send or receive on the established transport failed.
    TransportError {
        /// Description of the failure.
        context: String,
    },
}
