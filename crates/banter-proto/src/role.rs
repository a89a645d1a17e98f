//! Privilege levels.

use std::fmt;

use crate::errors::{ProtocolError, Result};

/// A totally ordered privilege level.
///
/// The derived `Ord` follows declaration order, so `Member <
/// Administrator`. Promotion and demotion are decided by comparing roles
/// with `<`; any future role must be inserted at the position matching
/// its privilege.
///
/// On the wire a role is a fixed `u16` with an explicit value table -
/// declaration order is not what the codec relies on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// Ordinary participant. The initial role of every session.
    #[default]
    Member,
    /// Elevated participant, granted via the server's promote operation.
    Administrator,
}

impl Role {
    /// Wire value for this role.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::Member => 0x0000,
            Self::Administrator => 0x0001,
        }
    }

    /// Parse a wire value.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidRole` if the value is not in the table
    pub const fn from_u16(value: u16) -> Result<Self> {
        match value {
            0x0000 => Ok(Self::Member),
            0x0001 => Ok(Self::Administrator),
            _ => Err(ProtocolError::InvalidRole { value }),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member => f.write_str("member"),
            Self::Administrator => f.write_str("administrator"),
        }
    }
}
