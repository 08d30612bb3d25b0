//! Error types for schema loading and payload translation.
//!
//! Loader errors are fatal: a broken schema means nothing downstream can be
//! trusted. Codec errors are recoverable per item when the codec runs with
//! `continue_on_error` (the offending item is logged and skipped), and
//! propagate otherwise.

use thiserror::Error;

/// Fatal schema construction/loading failures.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The normalized schema document did not parse.
    #[error("invalid schema input: {0}")]
    Parse(String),

    /// Two statements claim the same SID.
    #[error("duplicate sid {sid} ({first} and {second})")]
    DuplicateSid {
        /// The SID in question.
        sid: i64,
        /// First claimant's argument.
        first: String,
        /// Second claimant's argument.
        second: String,
    },

    /// An rpc or action without materialized input/output children.
    #[error("rpc/action {0} is missing its input/output statements")]
    MissingInputOutput(String),

    /// A list `key` names something that is not a child leaf.
    #[error("list {list} key {key} is not a child leaf")]
    BadListKey {
        /// The list argument.
        list: String,
        /// The offending key name.
        key: String,
    },

    /// A leafref path that does not resolve against the tree.
    #[error("unresolved leafref path {path} at {node}")]
    UnresolvedLeafref {
        /// The leafref path statement.
        path: String,
        /// Node carrying the leafref.
        node: String,
    },

    /// Content mode string outside the known set.
    #[error("unknown content format {0:?} (expected one of yang/get/put/fetch/ipatch/post)")]
    UnknownContentMode(String),

    /// Filesystem trouble reading schema inputs.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Payload translation failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A JSON key that is not a child of the current node.
    #[error("unknown child {arg:?} under {parent:?}")]
    UnknownChild {
        /// Parent node argument.
        parent: String,
        /// Offending key.
        arg: String,
    },

    /// A schema node participating in translation has no SID.
    #[error("node {0:?} has no sid assigned")]
    MissingSid(String),

    /// A delta key resolving to no child of the current node.
    #[error("no child with sid {sid} under {parent:?}")]
    UnknownSid {
        /// Parent node argument.
        parent: String,
        /// Absolute SID looked up.
        sid: i64,
    },

    /// Value shape did not match the node or type.
    #[error("expected {expected} for {node:?}, got {got}")]
    Shape {
        /// What the schema called for.
        expected: &'static str,
        /// Node argument.
        node: String,
        /// Short description of the actual value.
        got: String,
    },

    /// No union member type accepted the value.
    #[error("no union member matched value for {0:?}")]
    UnionMismatch(String),

    /// Base64 decoding of a binary leaf failed.
    #[error("invalid base64 in {0:?}")]
    InvalidBase64(String),

    /// A decimal64 string that does not parse or overflows.
    #[error("invalid decimal64 value {0:?}")]
    InvalidDecimal(String),

    /// An identityref naming no known identity.
    #[error("unknown identity {0:?}")]
    UnknownIdentity(String),

    /// A bits value naming an undefined bit.
    #[error("unknown bit name {0:?}")]
    UnknownBit(String),

    /// An enumeration value outside the defined set.
    #[error("unknown enum {0:?}")]
    UnknownEnum(String),

    /// Malformed or unresolvable instance-identifier.
    #[error("invalid instance-identifier {iid:?}: {reason}")]
    InvalidIid {
        /// The offending identifier text.
        iid: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Raw CBOR that does not parse.
    #[error("cbor: {0}")]
    Cbor(String),
}
