//! Block-wise request engine.
//!
//! One [`Exchange`] owns one request from first transmission to terminal
//! state. It is Sans-IO: the caller feeds it [`Event`]s and ships whatever
//! [`StepResult::send`] asks for, so the whole state machine runs under a
//! manual clock in tests.
//!
//! Large requests go out in 256-byte Block1 chunks, each acknowledged
//! before the next is sent; fragmented responses are pulled in with Block2
//! continuation requests and reassembled into `payload_rx`. Every request
//! carries `Block2(0, more=0, 256)` up front — even writes — so oversized
//! error bodies can be fetched in blocks too.
//!
//! Only one message id is in flight at a time; replies to other ids are
//! dropped. Tokens are carried but correlation is by message id alone.

use std::time::Duration;

use muplink_proto::coap::{Block, BlockSize, Code, Message, Method, MsgType};
use tracing::{debug, warn};

use crate::env::Env;

/// Block size used for request fragmentation and requested for responses.
const BLOCK_BYTES: usize = 256;

/// What the user asked for.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// Request method.
    pub method: Method,
    /// URI, path and optional `?query`.
    pub uri: String,
    /// Outbound payload.
    pub payload: Option<Vec<u8>>,
    /// Content-Format for the outbound payload.
    pub content_format: Option<u16>,
    /// Accept option for the response.
    pub accept: Option<u16>,
}

impl RequestSpec {
    /// A payload-less request.
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self { method, uri: uri.into(), payload: None, content_format: None, accept: None }
    }
}

/// Retransmission policy. The observable default is a fixed 3-second
/// interval with a budget of 5 retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Time between (re)transmissions.
    pub interval: Duration,
    /// Retransmissions allowed before giving up.
    pub budget: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { interval: Duration::from_secs(3), budget: 5 }
    }
}

/// Terminal result of an exchange.
///
/// `code` is unset when the retry budget ran out without a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Final response code, if any reply arrived.
    pub code: Option<Code>,
    /// Reassembled response payload (may be empty).
    pub payload: Vec<u8>,
}

/// Inputs to the state machine.
#[derive(Debug, Clone)]
pub enum Event {
    /// Evaluate without new information (used to kick off the exchange).
    Tick,
    /// The retransmit deadline may have passed.
    Timer,
    /// A CoAP message arrived.
    Reply(Message),
}

/// Where the exchange currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Request transmission not yet fully acknowledged.
    Sending,
    /// Request done; collecting response blocks.
    ReadingResponse,
    /// Finished; the outcome is available.
    Terminal,
}

/// One step's verdict: an optional frame to ship and the next deadline.
///
/// `(None, None)` is terminal, `(Some(t), Some(m))` means send `m` and wait
/// until `t`, `(Some(t), None)` means keep waiting.
#[derive(Debug, Clone)]
pub struct StepResult<I> {
    /// When the engine next needs a [`Event::Timer`].
    pub deadline: Option<I>,
    /// Message to transmit now.
    pub send: Option<Message>,
}

/// The per-request state machine.
#[derive(Debug)]
pub struct Exchange<E: Env> {
    env: E,
    spec: RequestSpec,
    policy: RetryPolicy,

    /// Bytes of the outbound payload handed to the wire so far.
    req_tx: Option<usize>,
    /// Bytes the server has acknowledged.
    req_tx_ack: Option<usize>,

    /// Server signalled more response blocks.
    res_more: bool,
    /// Block number of the last response block.
    res_num: u32,
    /// Block size the server used.
    res_bs: BlockSize,

    /// Reassembled response payload.
    payload_rx: Vec<u8>,

    /// Message id currently in flight.
    mid: Option<u16>,
    /// Retransmissions spent.
    retry: u32,
    /// Retransmit deadline for the in-flight message.
    deadline: Option<E::Instant>,
    /// Frame to repeat on retransmission.
    last_msg: Option<Message>,
    /// Code of the most recent accepted reply.
    last_code: Option<Code>,

    outcome: Option<Outcome>,
}

impl<E: Env> Exchange<E> {
    /// A fresh exchange; feed it [`Event::Tick`] to transmit.
    #[must_use]
    pub fn new(env: E, spec: RequestSpec, policy: RetryPolicy) -> Self {
        Self {
            env,
            spec,
            policy,
            req_tx: None,
            req_tx_ack: None,
            res_more: false,
            res_num: 0,
            res_bs: BlockSize::B256,
            payload_rx: Vec::new(),
            mid: None,
            retry: 0,
            deadline: None,
            last_msg: None,
            last_code: None,
            outcome: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.outcome.is_some() {
            Phase::Terminal
        } else if self.req_tx_done() {
            Phase::ReadingResponse
        } else {
            Phase::Sending
        }
    }

    /// The terminal outcome, once `phase()` is [`Phase::Terminal`].
    pub fn take_outcome(&mut self) -> Option<Outcome> {
        self.outcome.take()
    }

    /// The active retransmit deadline.
    #[must_use]
    pub fn deadline(&self) -> Option<E::Instant> {
        self.deadline
    }

    /// The message id currently in flight.
    #[must_use]
    pub fn message_id(&self) -> Option<u16> {
        self.mid
    }

    /// Advance the machine. Deterministic: same state, event, and time give
    /// the same result.
    pub fn step(&mut self, event: Event, now: E::Instant) -> StepResult<E::Instant> {
        if let Event::Reply(msg) = event {
            self.on_reply(&msg);
        }
        self.next_step(now)
    }

    fn req_tx_done(&self) -> bool {
        match self.req_tx {
            None => false,
            Some(tx) => {
                self.req_tx_ack == Some(tx)
                    && self.spec.payload.as_ref().is_none_or(|p| tx == p.len())
            },
        }
    }

    fn on_reply(&mut self, msg: &Message) {
        if self.outcome.is_some() {
            return;
        }
        if self.mid != Some(msg.message_id) {
            debug!(mid = msg.message_id, "dropping reply for stale message id");
            return;
        }
        // The in-flight message is answered; the next step decides what (if
        // anything) goes out next.
        self.deadline = None;
        if msg.ty == MsgType::Ack && msg.code.class == 2 {
            self.req_tx_ack = self.req_tx;
        }
        self.payload_rx.extend_from_slice(&msg.payload);
        match msg.block2 {
            Some(b) if b.more => {
                self.res_more = true;
                self.res_num = b.num;
                self.res_bs = b.size;
            },
            _ => self.res_more = false,
        }
        self.last_code = Some(msg.code);
        if msg.code.is_error() {
            debug!(code = %msg.code, "request failed at the server");
            self.finish(Some(msg.code));
        }
    }

    fn next_step(&mut self, now: E::Instant) -> StepResult<E::Instant> {
        if self.outcome.is_some() {
            return StepResult { deadline: None, send: None };
        }

        // An unanswered message is in flight: wait, retransmit, or give up.
        if let Some(deadline) = self.deadline {
            if now < deadline {
                return StepResult { deadline: Some(deadline), send: None };
            }
            if self.retry < self.policy.budget {
                self.retry += 1;
                self.deadline = Some(now + self.policy.interval);
                debug!(retry = self.retry, "retransmitting");
                return StepResult { deadline: self.deadline, send: self.last_msg.clone() };
            }
            warn!("retry budget exhausted, giving up");
            self.finish(None);
            return StepResult { deadline: None, send: None };
        }

        if !self.req_tx_done() {
            let mut msg = self.base_message();
            if let Some(payload) = self.spec.payload.clone() {
                let start = self.req_tx_ack.unwrap_or(0);
                let end = (start + BLOCK_BYTES).min(payload.len());
                msg.block1 = Some(Block::new(
                    (start / BLOCK_BYTES) as u32,
                    end < payload.len(),
                    BlockSize::B256,
                ));
                msg.payload = payload[start..end].to_vec();
                msg.content_format = self.spec.content_format;
                self.req_tx = Some(end);
            } else {
                self.req_tx = Some(0);
            }
            return self.transmit(msg, now);
        }

        if self.res_more {
            let mut msg = self.base_message();
            msg.block2 = Some(Block::new(self.res_num + 1, false, self.res_bs));
            return self.transmit(msg, now);
        }

        self.finish(self.last_code);
        StepResult { deadline: None, send: None }
    }

    /// A fresh confirmable request skeleton with a new message id.
    fn base_message(&self) -> Message {
        let mut msg =
            Message::new(MsgType::Con, Code::request(self.spec.method), self.env.random_u16());
        let (path, query) = parse_uri(&self.spec.uri);
        msg.uri_path = path;
        msg.uri_query = query;
        msg.accept = self.spec.accept;
        // Ask for server-side fragmentation up front; error responses can
        // need it even on non-GET methods.
        msg.block2 = Some(Block::new(0, false, BlockSize::B256));
        msg
    }

    fn transmit(&mut self, msg: Message, now: E::Instant) -> StepResult<E::Instant> {
        self.mid = Some(msg.message_id);
        self.deadline = Some(now + self.policy.interval);
        self.last_msg = Some(msg.clone());
        StepResult { deadline: self.deadline, send: Some(msg) }
    }

    fn finish(&mut self, code: Option<Code>) {
        self.deadline = None;
        self.outcome = Some(Outcome { code, payload: std::mem::take(&mut self.payload_rx) });
    }
}

/// Split a URI into non-empty path segments and form-decoded query items.
fn parse_uri(uri: &str) -> (Vec<String>, Vec<String>) {
    let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
    let path = path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect();
    let query =
        query.split('&').filter(|s| !s.is_empty()).map(form_decode).collect();
    (path, query)
}

/// Decode `application/x-www-form-urlencoded` escapes (`+` and `%XX`).
fn form_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = |b: u8| (b as char).to_digit(16);
                match (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 2;
                    },
                    _ => out.push(b'%'),
                }
            },
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
