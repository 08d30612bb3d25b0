//! Handler pipeline behaviour: dispatch, deadlines, console flush.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use muplink_client::env::ManualEnv;
use muplink_client::handler::Tx;
use muplink_client::{CarrierError, Env, Mup1Handler, RequestSpec, RetryPolicy};
use muplink_proto::coap::{Code, Message, Method, MsgType};
use muplink_proto::mup1::{self, Decoder, Mup1Event, tag};

#[derive(Default)]
struct RecordTx {
    sent: Vec<Vec<u8>>,
}

impl Tx for RecordTx {
    fn send(&mut self, bytes: &[u8]) -> Result<(), CarrierError> {
        self.sent.push(bytes.to_vec());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().map_or(Ok(0), |mut v| {
            v.extend_from_slice(buf);
            Ok(buf.len())
        })
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Unwrap a recorded wire frame back into a CoAP message.
fn unwire(frame: &[u8]) -> Message {
    let mut dec = Decoder::new();
    let mut out = None;
    for &b in frame {
        if let Some(Mup1Event::Frame { typ, payload }) = dec.push(b) {
            assert_eq!(typ, tag::COAP);
            out = Some(Message::from_bytes(&payload).expect("valid CoAP"));
        }
    }
    out.expect("one complete frame")
}

#[test]
fn request_flows_down_framed_and_reply_flows_up() {
    let env = ManualEnv::new();
    let mut handler: Mup1Handler<ManualEnv> = Mup1Handler::new(env.clone(), RetryPolicy::default());
    let mut tx = RecordTx::default();

    handler
        .begin_request(RequestSpec::new(Method::Get, "/c"), env.now(), &mut tx)
        .expect("begin");
    assert_eq!(tx.sent.len(), 1);
    let request = unwire(&tx.sent[0]);
    assert_eq!(request.code, Code::request(Method::Get));

    // Wrap an ACK in MUP1 and feed it back through the receive path.
    let mut reply = Message::new(MsgType::Ack, Code { class: 2, detail: 5 }, request.message_id);
    reply.payload = b"ok".to_vec();
    let wire = mup1::encode(tag::COAP, &reply.to_bytes());
    handler.rx_bytes(&wire, env.now(), &mut tx).expect("rx");

    let outcome = handler.coap_mut().take_outcome().expect("terminal");
    assert_eq!(outcome.code, Some(Code { class: 2, detail: 5 }));
    assert_eq!(outcome.payload, b"ok");
    assert!(handler.coap_mut().is_idle());
}

#[test]
fn aggregate_deadline_is_min_of_layers() {
    let env = ManualEnv::new();
    let mut handler: Mup1Handler<ManualEnv> = Mup1Handler::new(env.clone(), RetryPolicy::default());
    let mut tx = RecordTx::default();

    // CoAP layer arms its 3 s retransmit deadline.
    handler
        .begin_request(RequestSpec::new(Method::Get, "/c"), env.now(), &mut tx)
        .expect("begin");
    assert_eq!(handler.deadline(), Some(Duration::from_secs(3)));

    // A partial frame arms the much shorter receive-flush deadline, which
    // must win the aggregate.
    handler.rx_bytes(&[mup1::SOF, b'C', b'x'], env.now(), &mut tx).expect("rx");
    assert_eq!(handler.deadline(), Some(Duration::from_millis(100)));
}

#[test]
fn rx_timeout_flushes_partial_frame_to_console() {
    let env = ManualEnv::new();
    let mut handler: Mup1Handler<ManualEnv> = Mup1Handler::new(env.clone(), RetryPolicy::default());
    let sink = SharedSink::default();
    handler.set_console(Box::new(sink.clone()));
    let mut tx = RecordTx::default();

    // A stray '>' swallows following console text into a frame attempt.
    handler.rx_bytes(b">Czzz", env.now(), &mut tx).expect("rx");
    assert!(sink.0.lock().unwrap().is_empty());

    env.advance(Duration::from_millis(100));
    handler.timeout_work(env.now(), &mut tx).expect("timeout");
    assert_eq!(&*sink.0.lock().unwrap(), b">Czzz");
    assert!(handler.deadline().is_none());
}

#[test]
fn announcement_and_pong_are_captured() {
    let env = ManualEnv::new();
    let mut handler: Mup1Handler<ManualEnv> = Mup1Handler::new(env.clone(), RetryPolicy::default());
    let mut tx = RecordTx::default();

    handler
        .rx_bytes(&mup1::encode(tag::ANNOUNCE, b"VelocityDRIVE v1"), env.now(), &mut tx)
        .expect("rx");
    assert_eq!(handler.announcement(), Some(&b"VelocityDRIVE v1"[..]));

    handler.send_ping(&mut tx).expect("ping");
    let ping = tx.sent.last().expect("ping frame");
    assert_eq!(ping[..3], [mup1::SOF, tag::PING, mup1::EOF]);

    handler.rx_bytes(&mup1::encode(tag::PING, b"pong"), env.now(), &mut tx).expect("rx");
    assert_eq!(handler.take_pong(), Some(b"pong".to_vec()));
}

#[test]
fn console_bytes_pass_through_between_frames() {
    let env = ManualEnv::new();
    let mut handler: Mup1Handler<ManualEnv> = Mup1Handler::new(env.clone(), RetryPolicy::default());
    let sink = SharedSink::default();
    handler.set_console(Box::new(sink.clone()));
    let mut tx = RecordTx::default();

    let mut wire = b"login: ".to_vec();
    wire.extend_from_slice(&mup1::encode(tag::TRACE, b"boot"));
    handler.rx_bytes(&wire, env.now(), &mut tx).expect("rx");

    assert_eq!(&*sink.0.lock().unwrap(), b"login: ");
}
