//! The poll loop.
//!
//! The driver owns the carrier and the handler tree, and is the only place
//! anything blocks: one bounded wait on "bytes available or deadline
//! reached". Every handler method runs to completion; there are no threads
//! and no locks anywhere in the pipeline.
//!
//! User-facing calls look synchronous but are poll loops underneath:
//! [`Driver::request`] installs an exchange on the CoAP handler and polls
//! until the handler goes idle.

use std::time::Duration;

use crate::carrier::Carrier;
use crate::env::Env;
use crate::error::{CarrierError, LinkError};
use crate::exchange::{Outcome, RequestSpec, RetryPolicy};
use crate::handler::Tx;
use crate::mup1_layer::Mup1Handler;

struct CarrierTx<'a> {
    carrier: &'a mut dyn Carrier,
}

impl Tx for CarrierTx<'_> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), CarrierError> {
        self.carrier.write_all(bytes)
    }
}

/// Driver for one device link.
pub struct Driver<E: Env> {
    env: E,
    carrier: Box<dyn Carrier>,
    mup1: Mup1Handler<E>,
}

impl<E: Env> Driver<E> {
    /// A driver over an open carrier.
    #[must_use]
    pub fn new(env: E, carrier: Box<dyn Carrier>, policy: RetryPolicy) -> Self {
        let mup1 = Mup1Handler::new(env.clone(), policy);
        Self { env, carrier, mup1 }
    }

    /// The handler tree, for wiring sinks and inspecting state.
    pub fn handler(&mut self) -> &mut Mup1Handler<E> {
        &mut self.mup1
    }

    /// One scheduler turn: wait for bytes until the aggregate deadline,
    /// then run receive or timeout work.
    pub fn poll(&mut self) -> Result<(), LinkError> {
        self.poll_capped(None)
    }

    /// Like [`Driver::poll`] with an additional wakeup no later than `cap`.
    pub fn poll_capped(&mut self, cap: Option<E::Instant>) -> Result<(), LinkError> {
        let now = self.env.now();
        let deadline = match (self.mup1.deadline(), cap) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let timeout =
            deadline.map(|d| if d <= now { Duration::ZERO } else { d - now });

        let mut buf = [0u8; 4096];
        let n = self.carrier.read(&mut buf, timeout)?;

        let now = self.env.now();
        let mut tx = CarrierTx { carrier: self.carrier.as_mut() };
        if n > 0 {
            self.mup1.rx_bytes(&buf[..n], now, &mut tx)
        } else {
            self.mup1.timeout_work(now, &mut tx)
        }
    }

    /// Issue one request and block until its terminal state.
    ///
    /// Returns the response code class/detail and the reassembled payload;
    /// the code is `None` when the retry budget ran out.
    pub fn request(&mut self, spec: RequestSpec) -> Result<Outcome, LinkError> {
        let now = self.env.now();
        {
            let mut tx = CarrierTx { carrier: self.carrier.as_mut() };
            self.mup1.begin_request(spec, now, &mut tx)?;
        }
        loop {
            if let Some(outcome) = self.mup1.coap_mut().take_outcome() {
                return Ok(outcome);
            }
            self.poll()?;
        }
    }

    /// MUP1 ping round-trip.
    pub fn ping(&mut self, timeout: Duration) -> Result<Vec<u8>, LinkError> {
        let deadline = self.env.now() + timeout;
        {
            let mut tx = CarrierTx { carrier: self.carrier.as_mut() };
            self.mup1.send_ping(&mut tx)?;
        }
        loop {
            if let Some(pong) = self.mup1.take_pong() {
                return Ok(pong);
            }
            if self.env.now() >= deadline {
                return Err(LinkError::Timeout);
            }
            self.poll_capped(Some(deadline))?;
        }
    }

    /// Stream the device console until the carrier fails or is closed.
    pub fn run_console(&mut self) -> Result<(), LinkError> {
        loop {
            self.poll()?;
        }
    }
}
