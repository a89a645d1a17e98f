//! Fuzz target for Message::decode and Identity::decode
//!
//! Feeds arbitrary bytes to both decoders:
//! - Truncated frames at every length
//! - Unknown kind discriminants
//! - Invalid role/reason/bool field values
//! - Non-UTF-8 string bodies
//!
//! The decoders should NEVER panic. All invalid inputs must return a
//! ProtocolError.

#![no_main]

use banter_proto::{Identity, Message};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = Message::decode(data);
    let _ = Identity::decode(data);
});
