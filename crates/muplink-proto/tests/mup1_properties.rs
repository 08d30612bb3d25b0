//! Property-based tests for MUP1 framing.
//!
//! Transmit-then-receive of any payload up to the frame cap yields exactly
//! one dispatched frame with the original type and payload, byte-at-a-time
//! and regardless of surrounding garbage.

use muplink_proto::mup1::{self, Decoder, Mup1Event};
use proptest::prelude::*;

fn frames(dec: &mut Decoder, wire: &[u8]) -> Vec<Mup1Event> {
    wire.iter().filter_map(|&b| dec.push(b)).collect()
}

proptest! {
    #[test]
    fn frame_round_trip(
        typ in prop_oneof![Just(b'A'), Just(b'C'), Just(b'P'), Just(b'T')],
        payload in prop::collection::vec(any::<u8>(), 0..=mup1::MAX_PAYLOAD),
    ) {
        let wire = mup1::encode(typ, &payload);
        let mut dec = Decoder::new();
        let events = frames(&mut dec, &wire);
        prop_assert_eq!(events, vec![Mup1Event::Frame { typ, payload }]);
    }

    #[test]
    fn back_to_back_frames_all_arrive(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..8),
    ) {
        let mut wire = Vec::new();
        for p in &payloads {
            wire.extend_from_slice(&mup1::encode(b'C', p));
        }
        let mut dec = Decoder::new();
        let events = frames(&mut dec, &wire);
        let expected: Vec<_> = payloads
            .into_iter()
            .map(|payload| Mup1Event::Frame { typ: b'C', payload })
            .collect();
        prop_assert_eq!(events, expected);
    }

    #[test]
    fn frame_survives_garbage_and_timeout(
        garbage in prop::collection::vec(any::<u8>(), 0..128),
        payload in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        // Arbitrary garbage can leave the machine mid-frame; the receive
        // timeout flush resynchronises, after which a clean frame parses.
        let mut dec = Decoder::new();
        for b in garbage {
            let _ = dec.push(b);
        }
        let _ = dec.flush();
        let events = frames(&mut dec, &mup1::encode(b'C', &payload));
        prop_assert_eq!(
            events.last(),
            Some(&Mup1Event::Frame { typ: b'C', payload })
        );
    }

    #[test]
    fn decoder_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..4096)) {
        let mut dec = Decoder::new();
        for b in bytes {
            let _ = dec.push(b);
        }
        let _ = dec.flush();
    }
}
