//! Wire formats for the device link.
//!
//! Two independent codecs live here:
//!
//! - [`coap`]: CoAP message parsing and serialization (RFC 7252 framing with
//!   the Block1/Block2 options of RFC 7959). Messages are plain data; the
//!   request state machine lives in `muplink-client`.
//! - [`mup1`]: the MUP1 serial framing protocol that carries CoAP (and other
//!   typed frames) over a raw byte stream. MUP1 is not a reliable transport;
//!   loss recovery is the CoAP layer's job.
//!
//! Both codecs are pure: bytes in, values out, no I/O.

pub mod coap;
pub mod mup1;

pub use coap::{Block, BlockSize, Code, CoapParseError, Message, Method, MsgType};
pub use mup1::{Decoder, Mup1Event};
