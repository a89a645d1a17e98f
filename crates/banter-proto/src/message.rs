//! The message tagged union and its codec.
//!
//! Every frame body starts with a 2-byte kind discriminant followed by
//! the kind-specific fields. Unknown discriminants are a protocol error,
//! never silently ignored.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    Role,
    errors::{ProtocolError, Result},
    wire,
};

/// Message kind discriminants.
///
/// IDs are assigned explicitly and are part of the wire format. New kinds
/// get the next free value; existing values must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Chat text, relayed by the server to every other active session.
    Text,
    /// Operator text from the server itself.
    ServerNotice,
    /// Connection attempt rejected: active session limit reached.
    ServerFull,
    /// Handshake gate passed; the client must send its identity next.
    Connected,
    /// The server requires a password before admission.
    PasswordRequired,
    /// A password guess from the client.
    PasswordAttempt,
    /// The session has been kicked (or the address is blocked).
    Kicked,
    /// Another session completed its handshake.
    PeerJoined,
    /// Another session left, disconnected, or was kicked.
    PeerLeft,
    /// This session's role changed.
    Promoted,
    /// Another session's role changed.
    PeerPromotionChanged,
    /// The server is shutting down.
    ServerShutdown,
}

impl Kind {
    /// Wire discriminant for this kind.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::Text => 0x0001,
            Self::ServerNotice => 0x0002,
            Self::ServerFull => 0x0003,
            Self::Connected => 0x0004,
            Self::PasswordRequired => 0x0005,
            Self::PasswordAttempt => 0x0006,
            Self::Kicked => 0x0007,
            Self::PeerJoined => 0x0008,
            Self::PeerLeft => 0x0009,
            Self::Promoted => 0x000A,
            Self::PeerPromotionChanged => 0x000B,
            Self::ServerShutdown => 0x000C,
        }
    }

    /// Parse a wire discriminant. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Text),
            0x0002 => Some(Self::ServerNotice),
            0x0003 => Some(Self::ServerFull),
            0x0004 => Some(Self::Connected),
            0x0005 => Some(Self::PasswordRequired),
            0x0006 => Some(Self::PasswordAttempt),
            0x0007 => Some(Self::Kicked),
            0x0008 => Some(Self::PeerJoined),
            0x0009 => Some(Self::PeerLeft),
            0x000A => Some(Self::Promoted),
            0x000B => Some(Self::PeerPromotionChanged),
            0x000C => Some(Self::ServerShutdown),
            _ => None,
        }
    }
}

/// Why a peer appeared in or disappeared from the broadcast set.
///
/// Carried as a `u16` by [`Message::PeerJoined`] and
/// [`Message::PeerLeft`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceReason {
    /// The peer completed its handshake.
    Joined,
    /// The peer's transport dropped.
    Disconnected,
    /// The peer was kicked by an operator.
    Kicked,
}

impl PresenceReason {
    /// Wire value for this reason.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::Joined => 0x0000,
            Self::Disconnected => 0x0001,
            Self::Kicked => 0x0002,
        }
    }

    /// Parse a wire value.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidReason` if the value is not in the table
    pub const fn from_u16(value: u16) -> Result<Self> {
        match value {
            0x0000 => Ok(Self::Joined),
            0x0001 => Ok(Self::Disconnected),
            0x0002 => Ok(Self::Kicked),
            _ => Err(ProtocolError::InvalidReason { value }),
        }
    }
}

/// A protocol message.
///
/// Each variant carries only the fields its kind needs. Direction is a
/// convention, not a codec concern: the server ignores kinds it never
/// expects from clients (anything but `Text` and `PasswordAttempt`), and
/// the client treats server-only kinds arriving out of place as protocol
/// violations.
///
/// # Invariants
///
/// - Round trip: for every message `m`, `decode(encode(m)) == m`.
/// - Exhaustive dispatch: `kind()`, `encode()` and `decode()` all match
///   exhaustively, so adding a variant is a compile error until every
///   site handles it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Chat text from one session, relayed to the others.
    Text {
        /// Sender's role at send time.
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

    /// The active-session limit is reached; the connection is rejected.
    ServerFull,

    /// The handshake gate passed; identity is expected next.
    Connected,

    /// A password is required (initial challenge or retry after a
    /// mismatch).
    PasswordRequired,

    /// A password guess.
    PasswordAttempt {
        /// The guessed password.
        password: String,
    },

    /// The session was kicked, or its address is blocked.
    Kicked,

    /// A peer completed its handshake.
    PeerJoined {
        /// The peer's display name.
        name: String,
        /// Always [`PresenceReason::Joined`] when emitted by this
        /// implementation; carried explicitly so the field layout matches
        /// `PeerLeft`.
        reason: PresenceReason,
    },

    /// A peer left the broadcast set.
    PeerLeft {
        /// The peer's display name.
        name: String,
        /// Whether the peer disconnected or was kicked.
        reason: PresenceReason,
    },

    /// This session's role was changed by the server.
    Promoted {
        /// The newly granted role.
        role: Role,
    },

    /// Another session's role was changed by the server.
    PeerPromotionChanged {
        /// The peer's new role.
        role: Role,
        /// The peer's display name.
        name: String,
        /// True if the change was a strict promotion.
        promoted: bool,
    },

    /// The server is shutting down; no further messages will follow.
    ServerShutdown,
}

impl Message {
    /// Kind discriminant for this message.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Text { .. } => Kind::Text,
            Self::ServerNotice { .. } => Kind::ServerNotice,
            Self::ServerFull => Kind::ServerFull,
            Self::Connected => Kind::Connected,
            Self::PasswordRequired => Kind::PasswordRequired,
            Self::PasswordAttempt { .. } => Kind::PasswordAttempt,
            Self::Kicked => Kind::Kicked,
            Self::PeerJoined { .. } => Kind::PeerJoined,
            Self::PeerLeft { .. } => Kind::PeerLeft,
            Self::Promoted { .. } => Kind::Promoted,
            Self::PeerPromotionChanged { .. } => Kind::PeerPromotionChanged,
            Self::ServerShutdown => Kind::ServerShutdown,
        }
    }

    /// Encode this message into a buffer, kind discriminant first.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::StringTooLong` if a string field exceeds the u16
    ///   length prefix
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        dst.put_u16(self.kind().to_u16());

        match self {
            Self::Text { role, name, body } => {
                dst.put_u16(role.to_u16());
                wire::put_string(dst, name)?;
                wire::put_string(dst, body)?;
            },
            Self::ServerNotice { body } => {
                wire::put_string(dst, body)?;
            },
            Self::PasswordAttempt { password } => {
                wire::put_string(dst, password)?;
            },
            Self::PeerJoined { name, reason } | Self::PeerLeft { name, reason } => {
                wire::put_string(dst, name)?;
                dst.put_u16(reason.to_u16());
            },
            Self::Promoted { role } => {
                dst.put_u16(role.to_u16());
            },
            Self::PeerPromotionChanged { role, name, promoted } => {
                dst.put_u16(role.to_u16());
                wire::put_string(dst, name)?;
                wire::put_bool(dst, *promoted);
            },
            Self::ServerFull
            | Self::Connected
            | Self::PasswordRequired
            | Self::Kicked
            | Self::ServerShutdown => {},
        }

        Ok(())
    }

    /// Encode this message into a freshly allocated frame body.
    ///
    /// # Errors
    ///
    /// Same as [`Message::encode`].
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode a message from a frame body.
    ///
    /// Trailing bytes after the final field are ignored; each field reads
    /// exactly what it declared. Decoding never panics.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownKind` if the discriminant is not in the
    ///   kind table
    /// - `ProtocolError::Truncated` if the buffer ends mid-field
    /// - `ProtocolError::InvalidRole` / `InvalidReason` / `InvalidBool` /
    ///   `InvalidUtf8` on malformed field values
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;

        let raw_kind = wire::get_u16(&mut buf)?;
        let kind =
            Kind::from_u16(raw_kind).ok_or(ProtocolError::UnknownKind { kind: raw_kind })?;

        let message = match kind {
            Kind::Text => Self::Text {
                role: Role::from_u16(wire::get_u16(&mut buf)?)?,
                name: wire::get_string(&mut buf)?,
                body: wire::get_string(&mut buf)?,
            },
            Kind::ServerNotice => Self::ServerNotice { body: wire::get_string(&mut buf)? },
            Kind::ServerFull => Self::ServerFull,
            Kind::Connected => Self::Connected,
            Kind::PasswordRequired => Self::PasswordRequired,
            Kind::PasswordAttempt => {
                Self::PasswordAttempt { password: wire::get_string(&mut buf)? }
            },
            Kind::Kicked => Self::Kicked,
            Kind::PeerJoined => Self::PeerJoined {
                name: wire::get_string(&mut buf)?,
                reason: PresenceReason::from_u16(wire::get_u16(&mut buf)?)?,
            },
            Kind::PeerLeft => Self::PeerLeft {
                name: wire::get_string(&mut buf)?,
                reason: PresenceReason::from_u16(wire::get_u16(&mut buf)?)?,
            },
            Kind::Promoted => Self::Promoted { role: Role::from_u16(wire::get_u16(&mut buf)?)? },
            Kind::PeerPromotionChanged => Self::PeerPromotionChanged {
                role: Role::from_u16(wire::get_u16(&mut buf)?)?,
                name: wire::get_string(&mut buf)?,
                promoted: wire::get_bool(&mut buf)?,
            },
            Kind::ServerShutdown => Self::ServerShutdown,
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_table_round_trips() {
        let kinds = [
            Kind::Text,
            Kind::ServerNotice,
            Kind::ServerFull,
            Kind::Connected,
            Kind::PasswordRequired,
            Kind::PasswordAttempt,
            Kind::Kicked,
            Kind::PeerJoined,
            Kind::PeerLeft,
            Kind::Promoted,
            Kind::PeerPromotionChanged,
            Kind::ServerShutdown,
        ];

        for kind in kinds {
            assert_eq!(Kind::from_u16(kind.to_u16()), Some(kind));
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let body = 0x7777u16.to_be_bytes();
        let err = Message::decode(&body).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownKind { kind: 0x7777 });
    }

    #[test]
    fn empty_buffer_is_truncated() {
        let err = Message::decode(&[]).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }

    #[test]
    fn text_round_trip() {
        let message = Message::Text {
            role: Role::Administrator,
            name: "alice".to_string(),
            body: "hello there".to_string(),
        };

        let bytes = message.to_bytes().unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn bare_kinds_encode_as_discriminant_only() {
        for message in
            [Message::ServerFull, Message::Connected, Message::Kicked, Message::ServerShutdown]
        {
            let bytes = message.to_bytes().unwrap();
            assert_eq!(bytes.len(), 2);
            assert_eq!(Message::decode(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut bytes = Message::Connected.to_bytes().unwrap().to_vec();
        bytes.extend_from_slice(&[0xDE, 0xAD]);

        assert_eq!(Message::decode(&bytes).unwrap(), Message::Connected);
    }

    #[test]
    fn truncated_text_reports_truncated() {
        let message = Message::Text {
            role: Role::Member,
            name: "bob".to_string(),
            body: "payload".to_string(),
        };
        let bytes = message.to_bytes().unwrap();

        // Every strict prefix must fail with Truncated, never panic
        for cut in 0..bytes.len() {
            let err = Message::decode(&bytes[..cut]).unwrap_err();
            assert!(
                matches!(err, ProtocolError::Truncated { .. }),
                "prefix of {cut} bytes: unexpected error {err:?}"
            );
        }
    }
}
