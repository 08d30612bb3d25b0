//! MUP1 layer of the pipeline.
//!
//! Owns the frame decoder and dispatches complete frames by type byte:
//! CoAP frames go to the [`CoapHandler`], announcements and ping replies
//! are kept for the driver, traces are logged, and out-of-frame bytes go to
//! the console sink so device boot logs stay visible between frames.
//!
//! The layer's aggregate deadline is the minimum of its own receive-flush
//! deadline and the CoAP handler's; the driver recomputes it after every
//! receive and transmit, which keeps the pipeline-wide `timeout_next`
//! invariant true by construction.

use std::collections::HashSet;
use std::io::Write;
use std::time::Duration;

use muplink_proto::coap::Message;
use muplink_proto::mup1::{self, Decoder, Mup1Event, tag};
use tracing::{debug, info, warn};

use crate::env::Env;
use crate::error::LinkError;
use crate::exchange::RetryPolicy;
use crate::handler::{CoapHandler, Tx};

/// How long a partially received frame may sit before the decoder is
/// flushed and its bytes are reclassified as console output.
const RX_FLUSH_TIMEOUT: Duration = Duration::from_millis(100);

/// MUP1 framing layer and frame dispatcher.
pub struct Mup1Handler<E: Env> {
    decoder: Decoder,
    coap: CoapHandler<E>,
    console: Option<Box<dyn Write + Send>>,
    /// Latest device announcement payload.
    announcement: Option<Vec<u8>>,
    /// Latest ping reply payload.
    pong: Option<Vec<u8>>,
    /// Flush deadline while a frame is partially received.
    rx_deadline: Option<E::Instant>,
    /// Tags already complained about.
    unknown_tags: HashSet<u8>,
}

impl<E: Env> Mup1Handler<E> {
    /// A handler tree for one device link.
    #[must_use]
    pub fn new(env: E, policy: RetryPolicy) -> Self {
        Self {
            decoder: Decoder::new(),
            coap: CoapHandler::new(env, policy),
            console: None,
            announcement: None,
            pong: None,
            rx_deadline: None,
            unknown_tags: HashSet::new(),
        }
    }

    /// Attach a sink for out-of-frame bytes (device console output).
    pub fn set_console(&mut self, sink: Box<dyn Write + Send>) {
        self.console = Some(sink);
    }

    /// Enable or disable MUP1 frame recognition. Disabled, every byte goes
    /// to the console sink.
    pub fn set_framing(&mut self, on: bool) {
        self.decoder.set_framing(on);
    }

    /// The CoAP layer.
    pub fn coap_mut(&mut self) -> &mut CoapHandler<E> {
        &mut self.coap
    }

    /// Latest announcement frame payload, if one arrived.
    #[must_use]
    pub fn announcement(&self) -> Option<&[u8]> {
        self.announcement.as_deref()
    }

    /// Collect a ping reply.
    pub fn take_pong(&mut self) -> Option<Vec<u8>> {
        self.pong.take()
    }

    /// Send a ping frame.
    pub fn send_ping(&mut self, tx: &mut dyn Tx) -> Result<(), LinkError> {
        self.pong = None;
        tx.send(&mup1::encode(tag::PING, &[]))?;
        Ok(())
    }

    /// Feed received carrier bytes through the decoder.
    pub fn rx_bytes(
        &mut self,
        bytes: &[u8],
        now: E::Instant,
        tx: &mut dyn Tx,
    ) -> Result<(), LinkError> {
        for &b in bytes {
            if let Some(event) = self.decoder.push(b) {
                self.dispatch(event, now, tx)?;
            }
        }
        self.rx_deadline = self.decoder.mid_frame().then(|| now + RX_FLUSH_TIMEOUT);
        Ok(())
    }

    fn dispatch(&mut self, event: Mup1Event, now: E::Instant, tx: &mut dyn Tx) -> Result<(), LinkError> {
        match event {
            Mup1Event::NonFrame(bytes) => self.to_console(&bytes),
            Mup1Event::Frame { typ: tag::COAP, payload } => match Message::from_bytes(&payload) {
                Ok(msg) => {
                    let mut framed = CoapTx { inner: tx };
                    self.coap.rx(msg, now, &mut framed)?;
                },
                Err(e) => warn!(error = %e, "discarding unparseable CoAP frame"),
            },
            Mup1Event::Frame { typ: tag::ANNOUNCE, payload } => {
                debug!(announce = %String::from_utf8_lossy(&payload), "device announcement");
                self.announcement = Some(payload);
            },
            Mup1Event::Frame { typ: tag::PING, payload } => {
                self.pong = Some(payload);
            },
            Mup1Event::Frame { typ: tag::TRACE, payload } => {
                info!(target: "device", trace = %String::from_utf8_lossy(&payload));
            },
            Mup1Event::Frame { typ, .. } => {
                if self.unknown_tags.insert(typ) {
                    warn!(typ, "no handler for frame type (further frames suppressed)");
                }
            },
        }
        Ok(())
    }

    /// Run expired deadlines: the receive-flush timer and the CoAP layer's
    /// retransmit timer.
    pub fn timeout_work(&mut self, now: E::Instant, tx: &mut dyn Tx) -> Result<(), LinkError> {
        if self.rx_deadline.is_some_and(|d| now >= d) {
            self.rx_deadline = None;
            if let Some(event) = self.decoder.flush() {
                self.dispatch(event, now, tx)?;
            }
        }
        if self.coap.deadline().is_some_and(|d| now >= d) {
            let mut framed = CoapTx { inner: tx };
            self.coap.timeout_work(now, &mut framed)?;
        }
        Ok(())
    }

    /// Aggregate deadline: min of this layer's and its children's.
    #[must_use]
    pub fn deadline(&self) -> Option<E::Instant> {
        match (self.rx_deadline, self.coap.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Install a request on the CoAP layer, transmitting its first frame.
    pub fn begin_request(
        &mut self,
        spec: crate::exchange::RequestSpec,
        now: E::Instant,
        tx: &mut dyn Tx,
    ) -> Result<(), LinkError> {
        let mut framed = CoapTx { inner: tx };
        self.coap.begin(spec, now, &mut framed)
    }

    fn to_console(&mut self, bytes: &[u8]) {
        if let Some(sink) = self.console.as_mut()
            && let Err(e) = sink.write_all(bytes).and_then(|()| sink.flush())
        {
            warn!(error = %e, "console sink write failed");
        }
    }
}

/// Wraps CoAP message bytes into MUP1 frames on the way down.
struct CoapTx<'a> {
    inner: &'a mut dyn Tx,
}

impl Tx for CoapTx<'_> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), crate::error::CarrierError> {
        self.inner.send(&mup1::encode(tag::COAP, bytes))
    }
}
