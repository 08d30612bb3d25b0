//! YANG schema model and payload translation.
//!
//! The device speaks CBOR with RFC 9254 SID-based numeric identifiers; humans
//! edit JSON or YAML. This crate holds the bridge:
//!
//! - [`schema`]: an arena-allocated tree of resolved YANG statements with
//!   SIDs attached, produced by an external module parser and consumed here
//!   via [`schema::Schema::from_json_str`].
//! - [`codec`]: the schema-driven JSON↔CBOR translation, including
//!   SID-relative map keys, identityref/bits/enumeration encodings, and
//!   union discrimination.
//! - [`iid`]: the `/mod:list[k='v']/leaf` instance-identifier codec.
//! - [`jsonschema`]: draft-07 JSON Schema emission for editor support.
//! - [`cache`]: the on-disk resolved-schema cache.
//!
//! Translation is directional but symmetric: any value that conforms to a
//! node's JSON schema round-trips through CBOR unchanged.

pub mod cache;
pub mod codec;
mod error;
pub mod iid;
pub mod jsonschema;
pub mod schema;
mod types;

pub use codec::Codec;
pub use error::{CodecError, SchemaError};
pub use schema::{Identity, Keyword, Node, NodeId, Schema};
pub use types::Type;

use std::str::FromStr;

/// Top-level payload layout, keyed by the CoAP content format in use.
///
/// `Yang`, `Get` and `Put` payloads are one CBOR map; `Fetch` is a sequence
/// of instance-identifiers (requests) or single-entry `{iid: value}` maps
/// (responses); `Ipatch` and `Post` are sequences of `{iid: value}` maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentMode {
    /// Whole-datastore YANG data.
    #[default]
    Yang,
    /// GET response data.
    Get,
    /// PUT request data.
    Put,
    /// FETCH request/response items.
    Fetch,
    /// iPATCH request items.
    Ipatch,
    /// POST (RPC/action) items.
    Post,
}

impl ContentMode {
    /// All mode names, for CLI help text.
    pub const NAMES: [&'static str; 6] = ["yang", "get", "put", "fetch", "ipatch", "post"];
}

impl FromStr for ContentMode {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yang" => Ok(Self::Yang),
            "get" => Ok(Self::Get),
            "put" => Ok(Self::Put),
            "fetch" => Ok(Self::Fetch),
            "ipatch" => Ok(Self::Ipatch),
            "post" => Ok(Self::Post),
            other => Err(SchemaError::UnknownContentMode(other.to_string())),
        }
    }
}
