//! Block-wise engine behaviour under a manual clock.

use std::time::Duration;

use muplink_client::env::ManualEnv;
use muplink_client::{Env, Event, Exchange, Phase, RequestSpec, RetryPolicy};
use muplink_proto::coap::{Block, BlockSize, Code, Message, Method, MsgType, content_format};
use proptest::prelude::*;

const RETRY: Duration = Duration::from_secs(3);

fn exchange(env: &ManualEnv, spec: RequestSpec) -> Exchange<ManualEnv> {
    Exchange::new(env.clone(), spec, RetryPolicy::default())
}

fn ack(req: &Message, class: u8, detail: u8) -> Message {
    Message::new(MsgType::Ack, Code { class, detail }, req.message_id)
}

#[test]
fn get_round_trip() {
    let env = ManualEnv::new();
    env.push_mid(0x1234);
    let mut ex = exchange(&env, RequestSpec::new(Method::Get, "/c/running"));

    let step = ex.step(Event::Tick, env.now());
    let sent = step.send.expect("initial transmission");
    assert_eq!(sent.ty, MsgType::Con);
    assert_eq!(sent.code, Code::request(Method::Get));
    assert_eq!(sent.message_id, 0x1234);
    assert_eq!(sent.uri_path, vec!["c", "running"]);
    // Server-side fragmentation is requested up front.
    assert_eq!(sent.block2, Some(Block::new(0, false, BlockSize::B256)));
    assert_eq!(step.deadline, Some(RETRY));
    assert_eq!(ex.phase(), Phase::Sending);

    let mut reply = ack(&sent, 2, 5);
    reply.payload = b"data".to_vec();
    let step = ex.step(Event::Reply(reply), env.now());
    assert!(step.send.is_none());
    assert!(step.deadline.is_none());
    assert_eq!(ex.phase(), Phase::Terminal);

    let outcome = ex.take_outcome().expect("terminal outcome");
    assert_eq!(outcome.code, Some(Code { class: 2, detail: 5 }));
    assert_eq!(outcome.payload, b"data");
}

#[test]
fn payload_of_256_fits_one_block() {
    let env = ManualEnv::new();
    let mut spec = RequestSpec::new(Method::Put, "/c");
    spec.payload = Some(vec![0xAB; 256]);
    spec.content_format = Some(content_format::YANG_DATA_CBOR);
    let mut ex = exchange(&env, spec);

    let sent = ex.step(Event::Tick, env.now()).send.expect("transmission");
    assert_eq!(sent.payload.len(), 256);
    assert_eq!(sent.block1, Some(Block::new(0, false, BlockSize::B256)));
    assert_eq!(sent.content_format, Some(content_format::YANG_DATA_CBOR));

    // One acknowledgement finishes the request: no extra round-trip.
    let step = ex.step(Event::Reply(ack(&sent, 2, 4)), env.now());
    assert!(step.send.is_none());
    assert_eq!(ex.phase(), Phase::Terminal);
}

#[test]
fn payload_of_257_takes_two_blocks() {
    let env = ManualEnv::new();
    let mut spec = RequestSpec::new(Method::Put, "/c");
    spec.payload = Some(vec![0xCD; 257]);
    let mut ex = exchange(&env, spec);

    let first = ex.step(Event::Tick, env.now()).send.expect("first chunk");
    assert_eq!(first.block1, Some(Block::new(0, true, BlockSize::B256)));
    assert_eq!(first.payload.len(), 256);

    // 2.31 Continue acknowledges the first chunk; the second goes out as a
    // fresh confirmable message with its own id.
    let step = ex.step(Event::Reply(ack(&first, 2, 31)), env.now());
    let second = step.send.expect("second chunk");
    assert_ne!(second.message_id, first.message_id);
    assert_eq!(second.block1, Some(Block::new(1, false, BlockSize::B256)));
    assert_eq!(second.payload.len(), 1);

    let step = ex.step(Event::Reply(ack(&second, 2, 4)), env.now());
    assert!(step.send.is_none());
    assert_eq!(ex.take_outcome().unwrap().code, Some(Code { class: 2, detail: 4 }));
}

#[test]
fn block2_response_is_reassembled() {
    let env = ManualEnv::new();
    let mut ex = exchange(&env, RequestSpec::new(Method::Get, "/c"));

    let first = ex.step(Event::Tick, env.now()).send.expect("request");

    let mut reply = ack(&first, 2, 5);
    reply.payload = vec![b'A'; 256];
    reply.block2 = Some(Block::new(0, true, BlockSize::B256));
    let step = ex.step(Event::Reply(reply), env.now());

    // The continuation asks for the next block number at the server's size.
    let cont = step.send.expect("block2 continuation");
    assert_eq!(cont.block2, Some(Block::new(1, false, BlockSize::B256)));
    assert_eq!(ex.phase(), Phase::ReadingResponse);

    let mut last = ack(&cont, 2, 5);
    last.payload = b"tail".to_vec();
    last.block2 = Some(Block::new(1, false, BlockSize::B256));
    ex.step(Event::Reply(last), env.now());

    let outcome = ex.take_outcome().expect("terminal");
    assert_eq!(outcome.payload.len(), 260);
    assert_eq!(&outcome.payload[256..], b"tail");
}

#[test]
fn retransmits_five_times_then_gives_up() {
    let env = ManualEnv::new();
    let mut ex = exchange(&env, RequestSpec::new(Method::Get, "/c"));

    let first = ex.step(Event::Tick, env.now()).send.expect("request");

    for n in 1..=5 {
        env.advance(RETRY);
        let step = ex.step(Event::Timer, env.now());
        let resent = step.send.unwrap_or_else(|| panic!("retransmission {n}"));
        // Retransmissions repeat the same frame, same message id.
        assert_eq!(resent.message_id, first.message_id);
        assert_eq!(step.deadline, Some(env.now() + RETRY));
    }

    env.advance(RETRY);
    let step = ex.step(Event::Timer, env.now());
    assert!(step.send.is_none());
    assert!(step.deadline.is_none());
    let outcome = ex.take_outcome().expect("gave up");
    assert_eq!(outcome.code, None);
}

#[test]
fn timer_before_deadline_keeps_waiting() {
    let env = ManualEnv::new();
    let mut ex = exchange(&env, RequestSpec::new(Method::Get, "/c"));
    ex.step(Event::Tick, env.now());

    env.advance(Duration::from_secs(1));
    let step = ex.step(Event::Timer, env.now());
    assert!(step.send.is_none());
    assert_eq!(step.deadline, Some(RETRY));
}

#[test]
fn stale_message_id_is_ignored() {
    let env = ManualEnv::new();
    let mut ex = exchange(&env, RequestSpec::new(Method::Get, "/c"));
    let sent = ex.step(Event::Tick, env.now()).send.expect("request");

    let mut stale = ack(&sent, 2, 5);
    stale.message_id = sent.message_id.wrapping_add(1);
    stale.payload = b"bogus".to_vec();
    let step = ex.step(Event::Reply(stale), env.now());

    assert!(step.send.is_none());
    assert_eq!(step.deadline, Some(RETRY));
    assert_eq!(ex.phase(), Phase::Sending);
}

#[test]
fn server_error_terminates_with_code() {
    let env = ManualEnv::new();
    let mut ex = exchange(&env, RequestSpec::new(Method::Fetch, "/c"));
    let sent = ex.step(Event::Tick, env.now()).send.expect("request");

    let mut reply = ack(&sent, 4, 4);
    reply.payload = b"not found".to_vec();
    let step = ex.step(Event::Reply(reply), env.now());
    assert!(step.send.is_none());

    let outcome = ex.take_outcome().expect("terminal");
    assert_eq!(outcome.code, Some(Code { class: 4, detail: 4 }));
    assert_eq!(outcome.payload, b"not found");
}

proptest! {
    #[test]
    fn outbound_payloads_chunk_exactly(len in 0usize..2048) {
        let env = ManualEnv::new();
        let mut spec = RequestSpec::new(Method::Put, "/c");
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        spec.payload = Some(payload.clone());
        let mut ex = exchange(&env, spec);

        let mut sent_bytes = Vec::new();
        let mut nums = Vec::new();
        let mut step = ex.step(Event::Tick, env.now());
        let mut rounds = 0;
        while let Some(msg) = step.send.take() {
            rounds += 1;
            prop_assert!(rounds <= len / 256 + 2, "too many transmissions");
            let b1 = msg.block1.expect("payload chunks carry block1");
            nums.push(b1.num);
            sent_bytes.extend_from_slice(&msg.payload);
            // Every frame the engine produces survives the wire codec,
            // which also proves its option numbers are in order.
            let reparsed = Message::from_bytes(&msg.to_bytes()).expect("reparse");
            prop_assert_eq!(&reparsed, &msg);
            step = ex.step(Event::Reply(ack(&msg, 2, 4)), env.now());
        }

        prop_assert_eq!(ex.phase(), Phase::Terminal);
        prop_assert_eq!(sent_bytes, payload);
        let expected: Vec<u32> = (0..nums.len() as u32).collect();
        prop_assert_eq!(nums, expected);
    }
}

#[test]
fn query_items_are_form_decoded() {
    let env = ManualEnv::new();
    let mut ex = exchange(&env, RequestSpec::new(Method::Get, "/c?d=a%2Fb&flag"));
    let sent = ex.step(Event::Tick, env.now()).send.expect("request");
    assert_eq!(sent.uri_query, vec!["d=a/b", "flag"]);
}
