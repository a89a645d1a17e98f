//! Protocol error types.
//!
//! Decoding never panics: every malformed input maps to a variant here.
//! A protocol error is always fatal to the one session that produced it,
//! never to the process.

use thiserror::Error;

/// Convenience alias for codec results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced by encoding or decoding wire frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame began with a kind discriminant not in the kind table.
    #[error("unknown message kind: {kind:#06x}")]
    UnknownKind {
        /// The unrecognized discriminant value.
        kind: u16,
    },

    /// Buffer ended before the current field was complete.
    #[error("truncated frame: expected {expected} more byte(s), {remaining} available")]
    Truncated {
        /// Bytes the current field still required.
        expected: usize,
        /// Bytes actually left in the buffer.
        remaining: usize,
    },

    /// Role field carried a value outside the role table.
    #[error("invalid role value: {value:#06x}")]
    InvalidRole {
        /// The unrecognized role value.
        value: u16,
    },

    /// Presence reason field carried a value outside the reason table.
    #[error("invalid presence reason: {value:#06x}")]
    InvalidReason {
        /// The unrecognized reason value.
        value: u16,
    },

    /// Boolean field carried a byte other than 0 or 1.
    #[error("invalid boolean byte: {value:#04x}")]
    InvalidBool {
        /// The offending byte.
        value: u8,
    },

    /// String field was not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// String field exceeds the u16 length prefix.
    #[error("string too long: {len} bytes exceeds {max}")]
    StringTooLong {
        /// Actual byte length of the string.
        len: usize,
        /// Maximum encodable length.
        max: usize,
    },

    /// Frame body exceeds [`crate::MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes exceeds {max}")]
    FrameTooLarge {
        /// Claimed or actual frame size.
        size: usize,
        /// Maximum permitted size.
        max: usize,
    },
}
