//! CoAP request handler.
//!
//! Wraps one [`Exchange`] at a time and turns its step results into frames
//! on the wire. The handler is one layer of the pipeline: bytes flow in
//! through [`CoapHandler::rx`], deadlines flow up through
//! [`CoapHandler::deadline`], and the driver calls
//! [`CoapHandler::timeout_work`] when they expire.

use muplink_proto::coap::Message;
use tracing::debug;

use crate::env::Env;
use crate::error::{CarrierError, LinkError};
use crate::exchange::{Event, Exchange, Outcome, RequestSpec, RetryPolicy, StepResult};

/// Downward transmit path of a pipeline layer.
///
/// Each layer wraps the bytes it is given and hands them to the layer
/// below; the bottom writes to the carrier.
pub trait Tx {
    /// Ship one unit of data downward.
    fn send(&mut self, bytes: &[u8]) -> Result<(), CarrierError>;
}

/// The CoAP layer: owns the active exchange.
#[derive(Debug)]
pub struct CoapHandler<E: Env> {
    env: E,
    policy: RetryPolicy,
    exchange: Option<Exchange<E>>,
    outcome: Option<Outcome>,
}

impl<E: Env> CoapHandler<E> {
    /// A handler with no request in flight.
    #[must_use]
    pub fn new(env: E, policy: RetryPolicy) -> Self {
        Self { env, policy, exchange: None, outcome: None }
    }

    /// Install a request and transmit its first frame.
    ///
    /// # Errors
    ///
    /// [`LinkError::Busy`] when an exchange is already running, or a carrier
    /// error from the initial transmission.
    pub fn begin(
        &mut self,
        spec: RequestSpec,
        now: E::Instant,
        tx: &mut dyn Tx,
    ) -> Result<(), LinkError> {
        if self.exchange.is_some() {
            return Err(LinkError::Busy);
        }
        self.outcome = None;
        let mut exchange = Exchange::new(self.env.clone(), spec, self.policy.clone());
        let step = exchange.step(Event::Tick, now);
        self.exchange = Some(exchange);
        self.apply(step, tx)?;
        Ok(())
    }

    /// Feed a received CoAP message to the exchange.
    pub fn rx(&mut self, msg: Message, now: E::Instant, tx: &mut dyn Tx) -> Result<(), LinkError> {
        let Some(exchange) = self.exchange.as_mut() else {
            debug!(mid = msg.message_id, "unsolicited CoAP message");
            return Ok(());
        };
        let step = exchange.step(Event::Reply(msg), now);
        self.apply(step, tx)
    }

    /// Run the retransmit timer.
    pub fn timeout_work(&mut self, now: E::Instant, tx: &mut dyn Tx) -> Result<(), LinkError> {
        let Some(exchange) = self.exchange.as_mut() else {
            return Ok(());
        };
        let step = exchange.step(Event::Timer, now);
        self.apply(step, tx)
    }

    /// This layer's own deadline.
    #[must_use]
    pub fn deadline(&self) -> Option<E::Instant> {
        self.exchange.as_ref().and_then(Exchange::deadline)
    }

    /// Whether no request is running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.exchange.is_none()
    }

    /// Collect the finished request's outcome.
    pub fn take_outcome(&mut self) -> Option<Outcome> {
        self.outcome.take()
    }

    fn apply(&mut self, step: StepResult<E::Instant>, tx: &mut dyn Tx) -> Result<(), LinkError> {
        if let Some(msg) = step.send {
            tx.send(&msg.to_bytes())?;
        }
        if let Some(exchange) = self.exchange.as_mut()
            && let Some(outcome) = exchange.take_outcome()
        {
            self.outcome = Some(outcome);
            self.exchange = None;
        }
        Ok(())
    }
}
