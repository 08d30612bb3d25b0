//! CoAP message codec.
//!
//! [`Message`] is the in-memory form of one CoAP frame. Only the options the
//! device link uses are modelled as fields (Uri-Path, Uri-Query,
//! Content-Format, Accept, Block1, Block2); unrecognized options are skipped
//! on parse and never emitted.
//!
//! # Invariants
//!
//! - The version on the wire is always 1; anything else fails parsing.
//! - Serialized option numbers are non-decreasing. [`Message::to_bytes`]
//!   emits fields in ascending option-number order, so deltas never go
//!   negative.
//! - The `0xFF` payload marker appears iff the payload is non-empty.

mod code;
mod option;

pub use code::{Code, Method, MsgType, content_format};
pub use option::{Block, BlockSize};

use thiserror::Error;
use tracing::trace;

/// CoAP parse failures.
///
/// A failed parse poisons the whole frame; the request engine discards it
/// and keeps waiting for a valid reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoapParseError {
    /// Version field was not 1.
    #[error("unsupported CoAP version {0}")]
    InvalidVersion(u8),

    /// Token length nibble exceeded 8.
    #[error("invalid token length {0}")]
    InvalidTokenLength(u8),

    /// Input ended inside a header, option, or after a payload marker.
    #[error("truncated message")]
    Truncated,

    /// Reserved delta/length nibble 15.
    #[error("reserved option nibble")]
    ReservedNibble,

    /// Option number overflow or otherwise unusable option.
    #[error("invalid option near number {number}")]
    InvalidOption {
        /// Last valid absolute option number.
        number: u16,
    },

    /// Block option SZX outside 0..=6.
    #[error("invalid block size szx={szx}")]
    InvalidBlockSize {
        /// Raw SZX field.
        szx: u8,
    },
}

/// One CoAP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type.
    pub ty: MsgType,
    /// Code class/detail.
    pub code: Code,
    /// 16-bit message id.
    pub message_id: u16,
    /// Token, 0..=8 bytes.
    pub token: Vec<u8>,
    /// Uri-Path segments, in order.
    pub uri_path: Vec<String>,
    /// Uri-Query items, verbatim `k=v` or `k`, in order.
    pub uri_query: Vec<String>,
    /// Content-Format id, when present.
    pub content_format: Option<u16>,
    /// Accept id, when present.
    pub accept: Option<u16>,
    /// Block1 option (request fragmentation).
    pub block1: Option<Block>,
    /// Block2 option (response fragmentation).
    pub block2: Option<Block>,
    /// Payload bytes (empty = no payload).
    pub payload: Vec<u8>,
}

impl Message {
    /// A bare message of the given type and code with a fresh id.
    #[must_use]
    pub fn new(ty: MsgType, code: Code, message_id: u16) -> Self {
        Self {
            ty,
            code,
            message_id,
            token: Vec::new(),
            uri_path: Vec::new(),
            uri_query: Vec::new(),
            content_format: None,
            accept: None,
            block1: None,
            block2: None,
            payload: Vec::new(),
        }
    }

    /// Parse one message from `bytes`.
    ///
    /// # Errors
    ///
    /// Any [`CoapParseError`]; the input is not consumed incrementally, a
    /// message either parses whole or not at all.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoapParseError> {
        if bytes.len() < 4 {
            return Err(CoapParseError::Truncated);
        }
        let ver = bytes[0] >> 6;
        if ver != 1 {
            return Err(CoapParseError::InvalidVersion(ver));
        }
        let ty = MsgType::from_bits(bytes[0] >> 4);
        let tkl = bytes[0] & 0xF;
        if tkl > 8 {
            return Err(CoapParseError::InvalidTokenLength(tkl));
        }
        let code = Code::from_byte(bytes[1]);
        let message_id = u16::from_be_bytes([bytes[2], bytes[3]]);
        let rest = &bytes[4..];
        if rest.len() < tkl as usize {
            return Err(CoapParseError::Truncated);
        }
        let (token, rest) = rest.split_at(tkl as usize);

        let mut msg = Self::new(ty, code, message_id);
        msg.token = token.to_vec();

        let (options, payload) = option::decode_options(rest)?;
        for opt in options {
            match opt.number {
                option::URI_PATH => {
                    msg.uri_path.push(String::from_utf8_lossy(opt.value).into_owned());
                },
                option::URI_QUERY => {
                    msg.uri_query.push(String::from_utf8_lossy(opt.value).into_owned());
                },
                option::CONTENT_FORMAT => {
                    msg.content_format = Some(option::uint_from_bytes(opt.value) as u16);
                },
                option::ACCEPT => {
                    msg.accept = Some(option::uint_from_bytes(opt.value) as u16);
                },
                option::BLOCK2 => {
                    msg.block2 = Some(Block::from_value(option::uint_from_bytes(opt.value))?);
                },
                option::BLOCK1 => {
                    msg.block1 = Some(Block::from_value(option::uint_from_bytes(opt.value))?);
                },
                number => trace!(number, len = opt.value.len(), "skipping unknown option"),
            }
        }
        msg.payload = payload.to_vec();
        Ok(msg)
    }

    /// Serialize to wire bytes.
    ///
    /// Options are emitted in ascending option-number order; zero-length
    /// path and query items are omitted.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.payload.len());
        let tkl = self.token.len().min(8) as u8;
        out.push((1 << 6) | (self.ty.to_bits() << 4) | tkl);
        out.push(self.code.to_byte());
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token[..tkl as usize]);

        let mut last = 0u16;
        for seg in self.uri_path.iter().filter(|s| !s.is_empty()) {
            option::encode_option(&mut out, &mut last, option::URI_PATH, seg.as_bytes());
        }
        if let Some(cf) = self.content_format {
            option::encode_option(
                &mut out,
                &mut last,
                option::CONTENT_FORMAT,
                &option::uint_to_bytes(u32::from(cf)),
            );
        }
        for item in self.uri_query.iter().filter(|s| !s.is_empty()) {
            option::encode_option(&mut out, &mut last, option::URI_QUERY, item.as_bytes());
        }
        if let Some(acc) = self.accept {
            option::encode_option(
                &mut out,
                &mut last,
                option::ACCEPT,
                &option::uint_to_bytes(u32::from(acc)),
            );
        }
        if let Some(b) = self.block2 {
            option::encode_option(
                &mut out,
                &mut last,
                option::BLOCK2,
                &option::uint_to_bytes(b.to_value()),
            );
        }
        if let Some(b) = self.block1 {
            option::encode_option(
                &mut out,
                &mut last,
                option::BLOCK1,
                &option::uint_to_bytes(b.to_value()),
            );
        }

        if !self.payload.is_empty() {
            out.push(0xFF);
            out.extend_from_slice(&self.payload);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_request_wire_format() {
        // GET /c/Bth with message id 0x1234 and a block2(0, more=0, 256)
        // option: header, two path options, block2 with delta 12.
        let mut msg = Message::new(MsgType::Con, Code::request(Method::Get), 0x1234);
        msg.uri_path = vec!["c".into(), "Bth".into()];
        msg.block2 = Some(Block::new(0, false, BlockSize::B256));

        let bytes = msg.to_bytes();
        assert_eq!(
            bytes,
            vec![
                0x40, 0x01, 0x12, 0x34, // ver 1, CON, tkl 0, code 0.01, mid
                0xB1, b'c', // uri-path delta 11, len 1
                0x03, b'B', b't', b'h', // uri-path delta 0, len 3
                0xC1, 0x04, // block2 delta 12, szx 4 (256)
            ]
        );
        assert_eq!(Message::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn version_must_be_one() {
        let err = Message::from_bytes(&[0x00, 0x01, 0x00, 0x01]).unwrap_err();
        assert_eq!(err, CoapParseError::InvalidVersion(0));
    }

    #[test]
    fn token_parses_and_serializes() {
        let mut msg = Message::new(MsgType::Ack, Code { class: 2, detail: 5 }, 7);
        msg.token = vec![0xAB];
        let bytes = msg.to_bytes();
        assert_eq!(bytes[0] & 0xF, 1);
        assert_eq!(Message::from_bytes(&bytes).unwrap().token, vec![0xAB]);
    }

    #[test]
    fn payload_marker_with_no_payload_is_truncated() {
        let err = Message::from_bytes(&[0x40, 0x45, 0x00, 0x01, 0xFF]).unwrap_err();
        assert_eq!(err, CoapParseError::Truncated);
    }

    #[test]
    fn missing_marker_means_empty_payload() {
        let msg = Message::from_bytes(&[0x40, 0x45, 0x00, 0x01]).unwrap();
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn unknown_options_are_skipped() {
        // Max-Age (14, uint) between path and query.
        let bytes = vec![
            0x40, 0x01, 0x00, 0x01, //
            0xB1, b'c', // uri-path "c"
            0x31, 60, // max-age delta 3
            0x15, b'a', b'=', b'b', b'c', b'd', // uri-query delta 1
        ];
        let msg = Message::from_bytes(&bytes).unwrap();
        assert_eq!(msg.uri_path, vec!["c"]);
        assert_eq!(msg.uri_query, vec!["a=bcd"]);
    }

    #[test]
    fn extended_delta_encoding_round_trips() {
        // Accept (17) straight after content-format (12): delta 5; block1
        // (27) after block2 (23): delta 4. Force a large query to exercise
        // extended length.
        let mut msg = Message::new(MsgType::Con, Code::request(Method::Fetch), 0xBEEF);
        msg.content_format = Some(content_format::YANG_IDENTIFIERS_CBOR);
        msg.accept = Some(content_format::YANG_INSTANCES_CBOR);
        msg.uri_query = vec!["k=".to_string() + &"v".repeat(300)];
        msg.block1 = Some(Block::new(1, true, BlockSize::B256));
        msg.block2 = Some(Block::new(0, false, BlockSize::B256));
        msg.payload = vec![0xA0];
        let parsed = Message::from_bytes(&msg.to_bytes()).unwrap();
        assert_eq!(parsed, msg);
    }
}
