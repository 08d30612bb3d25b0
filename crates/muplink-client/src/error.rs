//! Client-side error taxonomy.
//!
//! Carrier errors are I/O-level and fatal for the session; link errors wrap
//! them with the few failure modes the driver itself can produce. Protocol
//! errors (bad CoAP, bad frames) never surface here — they are logged and
//! absorbed by the layers, and the request engine's retry budget is the
//! backstop.

use thiserror::Error;

/// Failures of the byte-duplex carrier.
#[derive(Debug, Error)]
pub enum CarrierError {
    /// URI that is not `termhub://`, `telnet://`, or a device path.
    #[error("invalid carrier uri {0:?}")]
    InvalidUri(String),

    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Disconnected,

    /// Socket/file I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serial port configuration or I/O failure.
    #[error("serial port: {0}")]
    Serial(String),
}

/// Failures surfaced by the driver.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Underlying carrier failure.
    #[error(transparent)]
    Carrier(#[from] CarrierError),

    /// A request was started while another is in flight.
    #[error("a request is already in progress")]
    Busy,

    /// The device did not answer within the allowed time.
    #[error("timed out waiting for the device")]
    Timeout,
}
