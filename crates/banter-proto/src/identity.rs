//! The untagged identity payload.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Role, errors::Result, wire};

/// Identity a client declares once, immediately after receiving
/// [`Connected`](crate::Message::Connected).
///
/// This is the one frame body without a kind discriminant: the server
/// only ever parses it in the awaiting-identity session state, so no tag
/// is needed and the message kind table stays closed.
///
/// The declared role is advisory only. The server stores
/// [`Role::Member`] regardless and treats its own promote operation as
/// the sole source of privilege.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Display name for the session.
    pub name: String,
    /// Self-declared role; never trusted for privilege.
    pub role: Role,
}

impl Identity {
    /// Encode the identity into a buffer.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::StringTooLong` if the name exceeds the u16
    ///   length prefix
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        wire::put_string(dst, &self.name)?;
        dst.put_u16(self.role.to_u16());
        Ok(())
    }

    /// Encode the identity into a freshly allocated frame body.
    ///
    /// # Errors
    ///
    /// Same as [`Identity::encode`].
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode an identity from a frame body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Truncated` if the buffer ends mid-field
    /// - `ProtocolError::InvalidRole` / `InvalidUtf8` on malformed values
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;

        let name = wire::get_string(&mut buf)?;
        let role = Role::from_u16(wire::get_u16(&mut buf)?)?;

        Ok(Self { name, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolError;

    #[test]
    fn identity_round_trip() {
        let identity = Identity { name: "alice".to_string(), role: Role::Member };

        let bytes = identity.to_bytes().unwrap();
        assert_eq!(Identity::decode(&bytes).unwrap(), identity);
    }

    #[test]
    fn truncated_identity_is_rejected() {
        let identity = Identity { name: "alice".to_string(), role: Role::Administrator };
        let bytes = identity.to_bytes().unwrap();

        let err = Identity::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }
}
