//! Byte-duplex carriers.
//!
//! The pipeline sees one abstraction: a stream of bytes with a bounded
//! read. Three transports provide it:
//!
//! - `termhub://host:port` — TCP to a terminal hub port.
//! - `telnet://host:port` — TCP with a minimal telnet handshake
//!   (`IAC WILL BIN, IAC DO BIN, IAC DO ECHO`) so the remote end switches
//!   to binary mode.
//! - anything else — a serial device path, opened at 115200 8N1 with no
//!   flow control.

use std::io::{Read as _, Write as _};
use std::net::TcpStream;
use std::time::Duration;

use tracing::debug;

use crate::error::CarrierError;

/// Telnet negotiation: WILL BINARY, DO BINARY, DO ECHO.
const TELNET_HANDSHAKE: [u8; 9] = [0xFF, 0xFB, 0x03, 0xFF, 0xFD, 0x03, 0xFF, 0xFD, 0x01];

/// Serial line rate.
const BAUD: u32 = 115_200;

/// Read timeout standing in for "indefinite" on carriers that require one.
const LONG_READ: Duration = Duration::from_secs(3600);

/// A bidirectional byte stream with bounded reads.
pub trait Carrier {
    /// Read available bytes, waiting at most `timeout` (`None` =
    /// indefinitely). Returns `Ok(0)` on timeout.
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, CarrierError>;

    /// Write the whole buffer.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), CarrierError>;
}

/// Open a carrier from its URI.
///
/// # Errors
///
/// [`CarrierError::InvalidUri`] on a malformed URI, otherwise connection
/// and port-open failures.
pub fn open(uri: &str) -> Result<Box<dyn Carrier>, CarrierError> {
    if let Some(addr) = uri.strip_prefix("termhub://") {
        debug!(addr, "connecting to termhub");
        let stream = connect(uri, addr)?;
        return Ok(Box::new(TcpCarrier { stream }));
    }
    if let Some(addr) = uri.strip_prefix("telnet://") {
        debug!(addr, "connecting via telnet");
        let stream = connect(uri, addr)?;
        let mut carrier = TcpCarrier { stream };
        carrier.write_all(&TELNET_HANDSHAKE)?;
        // Drain the peer's negotiation reply so it never reaches the
        // framing layer.
        let mut scratch = [0u8; 64];
        let _ = carrier.read(&mut scratch, Some(Duration::from_millis(200)))?;
        return Ok(Box::new(carrier));
    }
    if uri.contains("://") {
        return Err(CarrierError::InvalidUri(uri.to_string()));
    }

    debug!(path = uri, "opening serial port");
    let port = serialport::new(uri, BAUD)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(LONG_READ)
        .open()
        .map_err(|e| CarrierError::Serial(e.to_string()))?;
    Ok(Box::new(SerialCarrier { port }))
}

fn connect(uri: &str, addr: &str) -> Result<TcpStream, CarrierError> {
    if addr.is_empty() || !addr.contains(':') {
        return Err(CarrierError::InvalidUri(uri.to_string()));
    }
    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

struct TcpCarrier {
    stream: TcpStream,
}

impl Carrier for TcpCarrier {
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, CarrierError> {
        self.stream.set_read_timeout(timeout)?;
        match self.stream.read(buf) {
            // TCP read of zero bytes means the peer closed the stream.
            Ok(0) => Err(CarrierError::Disconnected),
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                Ok(0)
            },
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), CarrierError> {
        self.stream.write_all(bytes)?;
        Ok(())
    }
}

struct SerialCarrier {
    port: Box<dyn serialport::SerialPort>,
}

impl Carrier for SerialCarrier {
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, CarrierError> {
        self.port
            .set_timeout(timeout.unwrap_or(LONG_READ))
            .map_err(|e| CarrierError::Serial(e.to_string()))?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), CarrierError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}
