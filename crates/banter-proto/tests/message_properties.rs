//! Property-based tests for message encoding/decoding.
//!
//! These verify the codec for ALL valid inputs, not just specific
//! examples: round-trips are identity, and no byte sequence - truncated,
//! mutated, or random - can make `decode` panic.

use banter_proto::{Message, PresenceReason, ProtocolError, Role};
use proptest::prelude::*;

/// Strategy for generating arbitrary roles.
fn arbitrary_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Member), Just(Role::Administrator)]
}

/// Strategy for generating arbitrary presence reasons.
fn arbitrary_reason() -> impl Strategy<Value = PresenceReason> {
    prop_oneof![
        Just(PresenceReason::Joined),
        Just(PresenceReason::Disconnected),
        Just(PresenceReason::Kicked),
    ]
}

/// Strategy for generating arbitrary messages covering every kind.
fn arbitrary_message() -> impl Strategy<Value = Message> {
    prop_oneof![
        (arbitrary_role(), ".{0,64}", ".{0,256}")
            .prop_map(|(role, name, body)| Message::Text { role, name, body }),
        ".{0,256}".prop_map(|body| Message::ServerNotice { body }),
        Just(Message::ServerFull),
        Just(Message::Connected),
        Just(Message::PasswordRequired),
        ".{0,64}".prop_map(|password| Message::PasswordAttempt { password }),
        Just(Message::Kicked),
        (".{0,64}", arbitrary_reason())
            .prop_map(|(name, reason)| Message::PeerJoined { name, reason }),
        (".{0,64}", arbitrary_reason())
            .prop_map(|(name, reason)| Message::PeerLeft { name, reason }),
        arbitrary_role().prop_map(|role| Message::Promoted { role }),
        (arbitrary_role(), ".{0,64}", any::<bool>()).prop_map(|(role, name, promoted)| {
            Message::PeerPromotionChanged { role, name, promoted }
        }),
        Just(Message::ServerShutdown),
    ]
}

#[test]
fn prop_message_round_trip() {
    proptest!(|(message in arbitrary_message())| {
        let bytes = message.to_bytes().expect("encode should succeed");
        let decoded = Message::decode(&bytes).expect("decode should succeed");

        // PROPERTY: round-trip must be identity
        prop_assert_eq!(decoded, message);
    });
}

#[test]
fn prop_truncated_never_panics() {
    proptest!(|(message in arbitrary_message(), cut in any::<prop::sample::Index>())| {
        let bytes = message.to_bytes().expect("encode should succeed");
        let cut = cut.index(bytes.len().max(1));

        // PROPERTY: every strict prefix decodes to an error, never a panic.
        // Prefixes that cut inside a field must report Truncated.
        if let Err(err) = Message::decode(&bytes[..cut]) {
            let is_expected = matches!(
                err,
                ProtocolError::Truncated { .. } | ProtocolError::UnknownKind { .. }
            );
            prop_assert!(is_expected, "unexpected error for prefix {}: {:?}", cut, err);
        }
    });
}

#[test]
fn prop_random_bytes_never_panic() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..512))| {
        // PROPERTY: arbitrary input is either a valid message or a
        // ProtocolError - decode must never panic
        let _ = Message::decode(&bytes);
    });
}

#[test]
fn prop_kind_discriminant_leads_every_frame() {
    proptest!(|(message in arbitrary_message())| {
        let bytes = message.to_bytes().expect("encode should succeed");

        prop_assert!(bytes.len() >= 2, "frame must carry the 2-byte kind");
        let lead = u16::from_be_bytes([bytes[0], bytes[1]]);
        prop_assert_eq!(lead, message.kind().to_u16());
    });
}
