//! Fuzz target for decode→encode→decode stability
//!
//! Any byte sequence that decodes successfully must re-encode to a frame
//! that decodes to the identical message.

#![no_main]

use banter_proto::Message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = Message::decode(data) {
        let bytes = message.to_bytes().expect("decoded message must re-encode");
        let again = Message::decode(&bytes).expect("re-encoded frame must decode");
        assert_eq!(message, again);
    }
});
