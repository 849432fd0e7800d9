//! Property-based wire-format round-trip tests.
//!
//! Uses proptest to verify:
//! 1. Any valid `Message` survives encode → decode round-trip.
//! 2. Any valid `Envelope` survives encode → decode round-trip.
//! 3. Arbitrary text never causes a panic in `decode` (returns `Err` or
//!    `Envelope::Unknown` gracefully).

use chrono::TimeZone;
use proptest::prelude::*;
use wirechat_proto::codec;
use wirechat_proto::envelope::Envelope;
use wirechat_proto::message::{Message, MessageId, Timestamp, UserId};

// --- Strategies for protocol types ---

/// Strategy for generating arbitrary `UserId` values.
fn arb_user_id() -> impl Strategy<Value = UserId> {
    "[a-zA-Z0-9_-]{1,32}".prop_map(UserId::new)
}

/// Strategy for generating arbitrary optional `MessageId` values.
fn arb_message_id() -> impl Strategy<Value = Option<MessageId>> {
    prop::option::of("[a-f0-9]{24}".prop_map(MessageId::new))
}

/// Strategy for generating timestamps between 1970 and 2100, at
/// millisecond precision (matching the wire's RFC 3339 strings).
fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    (0i64..4_102_444_800_000).prop_map(|millis| {
        chrono::Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_default()
    })
}

/// Strategy for generating arbitrary `Message` values.
fn arb_message() -> impl Strategy<Value = Message> {
    (
        arb_message_id(),
        arb_user_id(),
        arb_user_id(),
        ".{0,256}",
        arb_timestamp(),
        any::<bool>(),
    )
        .prop_map(|(id, sender, receiver, content, created_at, seen)| Message {
            id,
            sender,
            receiver,
            content,
            created_at,
            seen,
        })
}

/// Strategy for generating arbitrary `Envelope` values.
fn arb_envelope() -> impl Strategy<Value = Envelope> {
    prop_oneof![
        arb_user_id().prop_map(|user_id| Envelope::Join { user_id }),
        (arb_user_id(), arb_user_id(), ".{0,256}").prop_map(|(sender, receiver, content)| {
            Envelope::SendMessage {
                sender,
                receiver,
                content,
            }
        }),
        arb_message().prop_map(|message| Envelope::ReceiveMessage { message }),
        arb_user_id().prop_map(|user_id| Envelope::Typing { user_id }),
        prop::collection::vec(arb_user_id(), 0..8).prop_map(|users| Envelope::OnlineUsers { users }),
    ]
}

// --- Property tests ---

proptest! {
    /// Any valid Message survives an encode → decode round-trip.
    #[test]
    fn message_round_trip(msg in arb_message()) {
        let envelope = Envelope::ReceiveMessage { message: msg };
        let text = codec::encode(&envelope).expect("encode should succeed");
        let decoded = codec::decode(&text).expect("decode should succeed");
        prop_assert_eq!(envelope, decoded);
    }

    /// Any valid Envelope survives an encode → decode round-trip.
    #[test]
    fn envelope_round_trip(envelope in arb_envelope()) {
        let text = codec::encode(&envelope).expect("encode should succeed");
        let decoded = codec::decode(&text).expect("decode should succeed");
        prop_assert_eq!(envelope, decoded);
    }

    /// Arbitrary text never panics the decoder.
    #[test]
    fn decode_never_panics(text in ".{0,512}") {
        let _ = codec::decode(&text);
    }

    /// Any JSON object with an unrecognized type tag decodes to Unknown
    /// rather than an error.
    #[test]
    fn unknown_tags_decode_to_unknown(tag in "[a-z][a-z0-9.]{1,24}") {
        // Skip tags that collide with real protocol types.
        let known = [
            "join",
            "send-message",
            "receive-message",
            "typing",
            "online-users",
        ];
        prop_assume!(!known.contains(&tag.as_str()));

        let frame = format!(r#"{{"type":"{tag}","extra":1}}"#);
        let decoded = codec::decode(&frame).expect("unknown tag should decode");
        prop_assert_eq!(decoded, Envelope::Unknown);
    }
}
