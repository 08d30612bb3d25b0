//! Property-based tests for CoAP encoding/decoding.
//!
//! Round-trip: any message the codec can construct survives
//! `from_bytes(to_bytes(m))` unchanged, and the serialized option numbers
//! are non-decreasing with extended deltas used exactly when needed.

use muplink_proto::coap::{Block, BlockSize, Code, Message, MsgType};
use proptest::prelude::*;

fn arbitrary_type() -> impl Strategy<Value = MsgType> {
    prop_oneof![
        Just(MsgType::Con),
        Just(MsgType::Non),
        Just(MsgType::Ack),
        Just(MsgType::Reset),
    ]
}

fn arbitrary_block() -> impl Strategy<Value = Block> {
    (0u32..1_048_576, any::<bool>(), 0u8..=6).prop_map(|(num, more, szx)| {
        let size = match szx {
            0 => BlockSize::B16,
            1 => BlockSize::B32,
            2 => BlockSize::B64,
            3 => BlockSize::B128,
            4 => BlockSize::B256,
            5 => BlockSize::B512,
            _ => BlockSize::B1024,
        };
        Block::new(num, more, size)
    })
}

fn arbitrary_message() -> impl Strategy<Value = Message> {
    (
        arbitrary_type(),
        (0u8..8, 0u8..32),
        any::<u16>(),
        prop::collection::vec(any::<u8>(), 0..=8),
        prop::collection::vec("[a-zA-Z0-9._~-]{1,16}", 0..4),
        prop::collection::vec("[a-z]{1,8}=[a-z0-9]{0,12}", 0..3),
        prop::option::of(any::<u16>()),
        prop::option::of(any::<u16>()),
        prop::option::of(arbitrary_block()),
        prop::option::of(arbitrary_block()),
        prop::collection::vec(any::<u8>(), 0..512),
    )
        .prop_map(
            |(ty, (class, detail), mid, token, path, query, cf, accept, b1, b2, payload)| {
                let mut msg = Message::new(ty, Code { class, detail }, mid);
                msg.token = token;
                msg.uri_path = path;
                msg.uri_query = query;
                msg.content_format = cf;
                msg.accept = accept;
                msg.block1 = b1;
                msg.block2 = b2;
                msg.payload = payload;
                msg
            },
        )
}

proptest! {
    #[test]
    fn message_round_trip(msg in arbitrary_message()) {
        let wire = msg.to_bytes();
        let parsed = Message::from_bytes(&wire).expect("should parse");
        prop_assert_eq!(parsed, msg);
    }

    #[test]
    fn truncation_never_panics(msg in arbitrary_message(), cut in 0usize..64) {
        let wire = msg.to_bytes();
        let cut = cut.min(wire.len());
        // Any prefix either parses or fails cleanly.
        let _ = Message::from_bytes(&wire[..wire.len() - cut]);
    }

    #[test]
    fn garbage_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = Message::from_bytes(&bytes);
    }
}
