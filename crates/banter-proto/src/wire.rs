//! Primitive field codecs shared by all payloads.
//!
//! `bytes::Buf` getters panic on underflow, so every read here checks
//! `remaining()` first and reports [`ProtocolError::Truncated`] instead.

use bytes::{Buf, BufMut};

use crate::errors::{ProtocolError, Result};

pub(crate) fn get_u8(buf: &mut impl Buf) -> Result<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_u16(buf: &mut impl Buf) -> Result<u16> {
    ensure(buf, 2)?;
    Ok(buf.get_u16())
}

pub(crate) fn get_bool(buf: &mut impl Buf) -> Result<bool> {
    match get_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(ProtocolError::InvalidBool { value }),
    }
}

/// Read a u16-length-prefixed UTF-8 string.
pub(crate) fn get_string(buf: &mut impl Buf) -> Result<String> {
    let len = get_u16(buf)? as usize;
    ensure(buf, len)?;

    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);

    String::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8)
}

pub(crate) fn put_bool(dst: &mut impl BufMut, value: bool) {
    dst.put_u8(u8::from(value));
}

/// Write a u16-length-prefixed UTF-8 string.
pub(crate) fn put_string(dst: &mut impl BufMut, value: &str) -> Result<()> {
    let len = value.len();
    let prefix = u16::try_from(len)
        .map_err(|_| ProtocolError::StringTooLong { len, max: u16::MAX as usize })?;

    dst.put_u16(prefix);
    dst.put_slice(value.as_bytes());
    Ok(())
}

fn ensure(buf: &impl Buf, expected: usize) -> Result<()> {
    let remaining = buf.remaining();
    if remaining < expected {
        return Err(ProtocolError::Truncated { expected, remaining });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let mut buf = Vec::new();
        put_string(&mut buf, "hello").unwrap();

        let mut slice = buf.as_slice();
        assert_eq!(get_string(&mut slice).unwrap(), "hello");
        assert!(slice.is_empty());
    }

    #[test]
    fn empty_string_round_trip() {
        let mut buf = Vec::new();
        put_string(&mut buf, "").unwrap();

        let mut slice = buf.as_slice();
        assert_eq!(get_string(&mut slice).unwrap(), "");
    }

    #[test]
    fn string_length_prefix_without_body_is_truncated() {
        // Prefix claims 10 bytes but none follow
        let buf: &[u8] = &[0x00, 0x0A];
        let mut slice = buf;

        let err = get_string(&mut slice).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { expected: 10, remaining: 0 }));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let buf: &[u8] = &[0x00, 0x02, 0xFF, 0xFE];
        let mut slice = buf;

        assert_eq!(get_string(&mut slice).unwrap_err(), ProtocolError::InvalidUtf8);
    }

    #[test]
    fn bool_rejects_values_above_one() {
        let buf: &[u8] = &[0x02];
        let mut slice = buf;

        assert_eq!(get_bool(&mut slice).unwrap_err(), ProtocolError::InvalidBool { value: 2 });
    }

    #[test]
    fn oversized_string_is_rejected_on_encode() {
        let long = "x".repeat(u16::MAX as usize + 1);
        let mut buf = Vec::new();

        let err = put_string(&mut buf, &long).unwrap_err();
        assert!(matches!(err, ProtocolError::StringTooLong { .. }));
    }
}
