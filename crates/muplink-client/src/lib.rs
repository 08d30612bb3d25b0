//! Client side of the device link.
//!
//! A layered, single-threaded pipeline over one byte-duplex carrier:
//!
//! ```text
//! Driver (poll loop, owns the carrier)
//!   └─ Mup1Handler (frame decode/dispatch, console sink)
//!        └─ CoapHandler (one Exchange at a time)
//!             └─ Exchange (block-wise request state machine)
//! ```
//!
//! Bytes flow up through `rx`, frames flow down through [`handler::Tx`],
//! and deadlines aggregate upward: each layer's deadline is the minimum of
//! its own and its children's, and the driver's bounded wait uses the root
//! value. Nothing blocks except the driver's carrier read.
//!
//! Protocol logic is Sans-IO ([`exchange::Exchange`] in particular), driven
//! by events and an [`env::Env`] clock so it runs deterministically in
//! tests.

pub mod carrier;
pub mod driver;
pub mod env;
mod error;
pub mod exchange;
pub mod handler;
pub mod mup1_layer;

pub use carrier::{Carrier, open};
pub use driver::Driver;
pub use env::{Env, SystemEnv};
pub use error::{CarrierError, LinkError};
pub use exchange::{Event, Exchange, Outcome, Phase, RequestSpec, RetryPolicy};
pub use mup1_layer::Mup1Handler;
