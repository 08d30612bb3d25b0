//! Schema-driven JSON↔CBOR translation.
//!
//! The device encodes YANG data as CBOR maps whose keys are SID deltas:
//! each child's key is `child.sid − parent.sid` (RFC 9254). The synthetic
//! schema root acts as SID 0, so top-level children carry their absolute
//! SIDs. RPC and action payloads are keyed relative to the rpc/action's own
//! SID, not the implicit input/output statement.
//!
//! Translation is driven entirely by node keywords and resolved types; the
//! JSON side never contains SIDs and the CBOR side never contains names.

mod bits;
mod scalar;

use ciborium::value::{Integer, Value};
use serde_json::Value as Json;
use tracing::warn;

use crate::ContentMode;
use crate::error::CodecError;
use crate::schema::{Keyword, NodeId, Schema};

/// A translation session over one schema and content mode.
pub struct Codec<'a> {
    schema: &'a Schema,
    mode: ContentMode,
    continue_on_error: bool,
}

impl<'a> Codec<'a> {
    /// A codec that logs and skips recoverable per-item errors.
    #[must_use]
    pub fn new(schema: &'a Schema, mode: ContentMode) -> Self {
        Self { schema, mode, continue_on_error: true }
    }

    /// Make every codec error fatal instead of skipping the item.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.continue_on_error = false;
        self
    }

    pub(crate) fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Skip or propagate a recoverable error, per `continue_on_error`.
    fn recover(&self, err: CodecError) -> Result<(), CodecError> {
        if self.continue_on_error {
            warn!(error = %err, "skipping item");
            Ok(())
        } else {
            Err(err)
        }
    }

    // Encode direction -----------------------------------------------------

    /// Encode the JSON value for `node` into a CBOR value.
    pub fn encode(&self, node: NodeId, value: &Json) -> Result<Value, CodecError> {
        let n = self.schema.node(node);
        match n.keyword {
            Keyword::Module | Keyword::Container | Keyword::Input | Keyword::Output => {
                self.encode_children(node, self.schema.effective_sid(node), value)
            },
            Keyword::List => self.encode_list(node, value),
            Keyword::Leaf => {
                let typ = n.typ.clone().unwrap_or_default();
                self.type_encode(node, &typ, value, false)
            },
            Keyword::LeafList => {
                let typ = n.typ.clone().unwrap_or_default();
                let items = value.as_array().ok_or_else(|| shape("array", n, value))?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.type_encode(node, &typ, item, false)?);
                }
                Ok(Value::Array(out))
            },
            Keyword::Rpc | Keyword::Action => self.encode_rpc(node, value),
            // The factory-default blob recurses over the whole schema.
            Keyword::Anydata if n.arg.ends_with("factory_default_config") => {
                self.encode(self.schema.root(), value)
            },
            _ => Err(shape("encodable node", n, value)),
        }
    }

    /// Encode an object's children as a delta-SID map relative to `base`.
    fn encode_children(&self, parent: NodeId, base: i64, value: &Json) -> Result<Value, CodecError> {
        let n = self.schema.node(parent);
        let obj = value.as_object().ok_or_else(|| shape("object", n, value))?;
        let mut entries = Vec::with_capacity(obj.len());
        for (key, item) in obj {
            let Some(child) = self.schema.child_by_arg(parent, key) else {
                self.recover(CodecError::UnknownChild { parent: n.arg.clone(), arg: key.clone() })?;
                continue;
            };
            let Some(sid) = self.schema.node(child).sid else {
                self.recover(CodecError::MissingSid(self.schema.node(child).arg.clone()))?;
                continue;
            };
            let encoded = self.encode(child, item)?;
            entries.push((Value::Integer(Integer::from(sid - base)), encoded));
        }
        Ok(Value::Map(entries))
    }

    fn encode_list(&self, node: NodeId, value: &Json) -> Result<Value, CodecError> {
        let n = self.schema.node(node);
        let base = self.schema.effective_sid(node);
        match value {
            Json::Array(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for entry in entries {
                    out.push(self.encode_children(node, base, entry)?);
                }
                Ok(Value::Array(out))
            },
            // In fetch/ipatch payloads a bare map addresses one entry.
            Json::Object(_) if matches!(self.mode, ContentMode::Fetch | ContentMode::Ipatch) => {
                self.encode_children(node, base, value)
            },
            _ => Err(shape("array of entries", n, value)),
        }
    }

    /// `{ "input": {...} }` or `{ "output": {...} }`, children keyed
    /// relative to the rpc/action's own SID.
    fn encode_rpc(&self, node: NodeId, value: &Json) -> Result<Value, CodecError> {
        let n = self.schema.node(node);
        let obj = value.as_object().ok_or_else(|| shape("object", n, value))?;
        let (dir, inner) = match (obj.len(), obj.iter().next()) {
            (1, Some((k, v))) if k == "input" || k == "output" => (k.as_str(), v),
            _ => return Err(shape("single input/output key", n, value)),
        };
        let want = if dir == "input" { Keyword::Input } else { Keyword::Output };
        let io = n
            .children
            .iter()
            .copied()
            .find(|&c| self.schema.node(c).keyword == want)
            .ok_or_else(|| shape("rpc with input/output", n, value))?;
        self.encode_children(io, self.schema.effective_sid(node), inner)
    }

    // Decode direction -----------------------------------------------------

    /// Decode the CBOR value for `node` back into JSON.
    pub fn decode(&self, node: NodeId, value: &Value) -> Result<Json, CodecError> {
        let n = self.schema.node(node);
        match n.keyword {
            Keyword::Module | Keyword::Container | Keyword::Input | Keyword::Output => {
                self.decode_children(node, self.schema.effective_sid(node), value)
            },
            Keyword::List => self.decode_list(node, value),
            Keyword::Leaf => {
                let typ = n.typ.clone().unwrap_or_default();
                self.type_decode(node, &typ, value, false)
            },
            Keyword::LeafList => {
                let typ = n.typ.clone().unwrap_or_default();
                let Value::Array(items) = value else {
                    return Err(shape_cbor("array", n, value));
                };
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.type_decode(node, &typ, item, false)?);
                }
                Ok(Json::Array(out))
            },
            Keyword::Rpc | Keyword::Action => self.decode_rpc(node, value),
            Keyword::Anydata if n.arg.ends_with("factory_default_config") => {
                self.decode(self.schema.root(), value)
            },
            _ => Err(shape_cbor("decodable node", n, value)),
        }
    }

    fn decode_children(&self, parent: NodeId, base: i64, value: &Value) -> Result<Json, CodecError> {
        let n = self.schema.node(parent);
        let Value::Map(entries) = value else {
            return Err(shape_cbor("map", n, value));
        };
        let mut obj = serde_json::Map::with_capacity(entries.len());
        for (key, item) in entries {
            let Value::Integer(delta) = key else {
                return Err(shape_cbor("integer delta key", n, key));
            };
            let sid = base + i128::from(*delta) as i64;
            let Some(child) = self.schema.child_by_sid(parent, sid) else {
                self.recover(CodecError::UnknownSid { parent: n.arg.clone(), sid })?;
                continue;
            };
            let decoded = self.decode(child, item)?;
            obj.insert(self.schema.node(child).arg.clone(), decoded);
        }
        Ok(Json::Object(obj))
    }

    fn decode_list(&self, node: NodeId, value: &Value) -> Result<Json, CodecError> {
        let n = self.schema.node(node);
        let base = self.schema.effective_sid(node);
        match value {
            Value::Array(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for entry in entries {
                    out.push(self.decode_children(node, base, entry)?);
                }
                Ok(Json::Array(out))
            },
            Value::Map(_) if matches!(self.mode, ContentMode::Fetch | ContentMode::Ipatch) => {
                self.decode_children(node, base, value)
            },
            _ => Err(shape_cbor("array of entries", n, value)),
        }
    }

    fn decode_rpc(&self, node: NodeId, value: &Value) -> Result<Json, CodecError> {
        let n = self.schema.node(node);
        let Value::Map(entries) = value else {
            return Err(shape_cbor("map", n, value));
        };
        let base = self.schema.effective_sid(node);
        // Work out the direction from the first resolvable key; responses
        // are rpc output, so that side wins ties.
        let io_child = |want: Keyword| {
            n.children.iter().copied().find(|&c| self.schema.node(c).keyword == want)
        };
        let output = io_child(Keyword::Output);
        let input = io_child(Keyword::Input);
        let dir = entries
            .iter()
            .find_map(|(k, _)| {
                let Value::Integer(delta) = k else { return None };
                let sid = base + i128::from(*delta) as i64;
                if output.is_some_and(|io| self.schema.child_by_sid(io, sid).is_some()) {
                    Some(("output", output))
                } else if input.is_some_and(|io| self.schema.child_by_sid(io, sid).is_some()) {
                    Some(("input", input))
                } else {
                    None
                }
            })
            .unwrap_or(("output", output));
        let (name, Some(io)) = dir else {
            return Err(shape_cbor("rpc with input/output", n, value));
        };
        let inner = self.decode_children(io, base, value)?;
        let mut obj = serde_json::Map::with_capacity(1);
        obj.insert(name.to_string(), inner);
        Ok(Json::Object(obj))
    }

    // Payload forms --------------------------------------------------------

    /// Encode a complete payload for the current content mode.
    ///
    /// `Yang`/`Get`/`Put` take the top-level data map; `Fetch` takes an
    /// array of instance-identifier strings and/or `{iid: value}` objects;
    /// `Ipatch`/`Post` take arrays of `{iid: value}` objects. The result is
    /// a concatenated CBOR item sequence.
    pub fn encode_payload(&self, value: &Json) -> Result<Vec<u8>, CodecError> {
        let items = match self.mode {
            ContentMode::Yang | ContentMode::Get | ContentMode::Put => {
                vec![self.encode(self.schema.root(), value)?]
            },
            ContentMode::Fetch => {
                let arr = value.as_array().ok_or_else(|| CodecError::Shape {
                    expected: "array of fetch items",
                    node: "/".into(),
                    got: json_kind(value).into(),
                })?;
                let mut out = Vec::with_capacity(arr.len());
                for item in arr {
                    out.push(match item {
                        Json::String(iid) => self.encode_iid(iid)?,
                        Json::Object(m) if m.len() == 1 => self.encode_iid_entry(m)?,
                        other => {
                            return Err(CodecError::Shape {
                                expected: "instance-identifier or {iid: value}",
                                node: "/".into(),
                                got: json_kind(other).into(),
                            });
                        },
                    });
                }
                out
            },
            ContentMode::Ipatch | ContentMode::Post => {
                let arr = value.as_array().ok_or_else(|| CodecError::Shape {
                    expected: "array of {iid: value} items",
                    node: "/".into(),
                    got: json_kind(value).into(),
                })?;
                let mut out = Vec::with_capacity(arr.len());
                for item in arr {
                    let m = item.as_object().filter(|m| m.len() == 1).ok_or_else(|| {
                        CodecError::Shape {
                            expected: "{iid: value}",
                            node: "/".into(),
                            got: json_kind(item).into(),
                        }
                    })?;
                    out.push(self.encode_iid_entry(m)?);
                }
                out
            },
        };

        let mut bytes = Vec::new();
        for item in &items {
            ciborium::ser::into_writer(item, &mut bytes)
                .map_err(|e| CodecError::Cbor(e.to_string()))?;
        }
        Ok(bytes)
    }

    /// One `{iid: value}` pair. A null value is passed through unvalidated
    /// (deletion in iPATCH, empty rpc input in POST).
    fn encode_iid_entry(&self, m: &serde_json::Map<String, Json>) -> Result<Value, CodecError> {
        let (iid, val) = m.iter().next().ok_or(CodecError::Cbor("empty map item".into()))?;
        let key = self.encode_iid(iid)?;
        let value = if val.is_null() {
            Value::Null
        } else {
            let (target, _) = self.resolve_iid(iid)?;
            self.encode(target, val)?
        };
        Ok(Value::Map(vec![(key, value)]))
    }

    /// Decode a CBOR item sequence for the current content mode.
    pub fn decode_payload(&self, bytes: &[u8]) -> Result<Json, CodecError> {
        let mut items = Vec::new();
        let mut rest = bytes;
        while !rest.is_empty() {
            let item: Value = ciborium::de::from_reader(&mut rest)
                .map_err(|e| CodecError::Cbor(e.to_string()))?;
            items.push(item);
        }

        match self.mode {
            ContentMode::Yang | ContentMode::Get | ContentMode::Put => match items.first() {
                None => Ok(Json::Null),
                Some(item) => self.decode(self.schema.root(), item),
            },
            ContentMode::Fetch | ContentMode::Ipatch | ContentMode::Post => {
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    out.push(match item {
                        Value::Map(entries) if entries.len() == 1 => {
                            self.decode_iid_entry(&entries[0])?
                        },
                        Value::Integer(_) | Value::Array(_) => {
                            Json::String(self.decode_iid(item)?)
                        },
                        other => {
                            return Err(CodecError::Cbor(format!(
                                "unexpected top-level item {other:?}"
                            )));
                        },
                    });
                }
                Ok(Json::Array(out))
            },
        }
    }

    fn decode_iid_entry(&self, (key, value): &(Value, Value)) -> Result<Json, CodecError> {
        let iid = self.decode_iid(key)?;
        let decoded = if matches!(value, Value::Null) {
            Json::Null
        } else {
            let (target, _) = self.resolve_iid(&iid)?;
            self.decode(target, value)?
        };
        let mut obj = serde_json::Map::with_capacity(1);
        obj.insert(iid, decoded);
        Ok(Json::Object(obj))
    }
}

pub(crate) fn shape(expected: &'static str, node: &crate::schema::Node, got: &Json) -> CodecError {
    CodecError::Shape { expected, node: node.arg.clone(), got: json_kind(got).into() }
}

pub(crate) fn shape_cbor(
    expected: &'static str,
    node: &crate::schema::Node,
    got: &Value,
) -> CodecError {
    let kind = match got {
        Value::Integer(_) => "integer",
        Value::Bytes(_) => "bytes",
        Value::Float(_) => "float",
        Value::Text(_) => "text",
        Value::Bool(_) => "bool",
        Value::Null => "null",
        Value::Tag(..) => "tag",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        _ => "unknown",
    };
    CodecError::Shape { expected, node: node.arg.clone(), got: kind.into() }
}

fn json_kind(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
