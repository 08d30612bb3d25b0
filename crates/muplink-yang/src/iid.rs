//! Instance-identifier codec.
//!
//! An instance-identifier names one data node as a path string,
//! `/module:a/b[key='v']/c`. On the wire it is the target node's SID,
//! wrapped in an array with the key values of every list on the path when
//! there are any: `[sid, k1, k2, ...]`.
//!
//! Key values are written as strings in the path but encoded through the
//! key leaf's type (`[name='eth0']` stays text, `[uid='7']` becomes the
//! integer 7, `true`/`false` become booleans, `[null]` is the empty type's
//! null).

use ciborium::value::{Integer, Value};

use crate::codec::Codec;
use crate::error::CodecError;
use crate::schema::{Keyword, NodeId};

/// One parsed path segment: argument plus `[k='v']` predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Node argument, `module:name` at the top level.
    pub arg: String,
    /// Key predicates in written order.
    pub keys: Vec<(String, String)>,
}

/// Split an instance-identifier into segments.
///
/// Splitting happens on `/` only outside `[...]`; predicate values may be
/// quoted with `'` or `"` (quotes optional when the value has no bracket or
/// quote characters).
pub fn parse(s: &str) -> Result<Vec<Segment>, CodecError> {
    let bad = |reason: &str| CodecError::InvalidIid { iid: s.to_string(), reason: reason.into() };
    let body = s.strip_prefix('/').ok_or_else(|| bad("must start with '/'"))?;

    let mut segments = Vec::new();
    let mut chars = body.chars().peekable();
    'outer: loop {
        // Argument part up to '[' or '/'.
        let mut arg = String::new();
        let mut keys = Vec::new();
        loop {
            match chars.next() {
                None | Some('/') => break,
                Some('[') => {
                    // One predicate: name = value, value optionally quoted.
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('=') => break,
                            Some(c) if c != ']' => name.push(c),
                            _ => return Err(bad("predicate without '='")),
                        }
                    }
                    let mut value = String::new();
                    match chars.peek() {
                        Some(&q @ ('\'' | '"')) => {
                            chars.next();
                            loop {
                                match chars.next() {
                                    Some(c) if c == q => break,
                                    Some(c) => value.push(c),
                                    None => return Err(bad("unterminated quote")),
                                }
                            }
                            if chars.next() != Some(']') {
                                return Err(bad("missing ']' after quoted value"));
                            }
                        },
                        _ => loop {
                            match chars.next() {
                                Some(']') => break,
                                Some(c) => value.push(c),
                                None => return Err(bad("missing ']'")),
                            }
                        },
                    }
                    keys.push((name.trim().to_string(), value));
                    // After a predicate: another '[', a '/', or the end.
                    match chars.peek() {
                        Some('[') => {},
                        Some('/') => {
                            chars.next();
                            break;
                        },
                        None => {
                            segments.push(Segment { arg, keys });
                            break 'outer;
                        },
                        Some(_) => return Err(bad("unexpected text after ']'")),
                    }
                },
                Some(c) => arg.push(c),
            }
        }
        if arg.is_empty() && keys.is_empty() && chars.peek().is_none() {
            break;
        }
        if arg.is_empty() {
            return Err(bad("empty segment"));
        }
        segments.push(Segment { arg, keys });
        if chars.peek().is_none() {
            break;
        }
    }
    if segments.is_empty() {
        return Err(bad("empty path"));
    }
    Ok(segments)
}

impl Codec<'_> {
    /// Encode a path string to its wire form.
    pub fn encode_iid(&self, path: &str) -> Result<Value, CodecError> {
        let (target, keys) = self.resolve_iid(path)?;
        let sid = self
            .schema()
            .node(target)
            .sid
            .ok_or_else(|| CodecError::MissingSid(self.schema().node(target).arg.clone()))?;
        if keys.is_empty() {
            return Ok(Value::Integer(Integer::from(sid)));
        }
        let mut items = Vec::with_capacity(keys.len() + 1);
        items.push(Value::Integer(Integer::from(sid)));
        items.extend(keys);
        Ok(Value::Array(items))
    }

    /// Resolve a path string to its target node and encoded key values.
    pub(crate) fn resolve_iid(&self, path: &str) -> Result<(NodeId, Vec<Value>), CodecError> {
        let segments = parse(path)?;
        let bad = |reason: String| CodecError::InvalidIid { iid: path.to_string(), reason };
        let schema = self.schema();

        let mut cur = schema.root();
        let mut keys = Vec::new();
        for seg in &segments {
            cur = schema
                .resolve_path(cur, &[seg.arg.as_str()])
                .ok_or_else(|| bad(format!("unknown node {:?}", seg.arg)))?;
            if seg.keys.is_empty() {
                continue;
            }
            let node = schema.node(cur);
            if node.keyword != Keyword::List {
                return Err(bad(format!("{:?} is not a list", seg.arg)));
            }
            for key_name in &node.keys {
                let (_, raw) = seg
                    .keys
                    .iter()
                    .find(|(k, _)| k == key_name)
                    .ok_or_else(|| bad(format!("missing key {key_name:?}")))?;
                let leaf = schema
                    .child_by_arg(cur, key_name)
                    .ok_or_else(|| bad(format!("missing key leaf {key_name:?}")))?;
                keys.push(self.encode_key_value(leaf, raw)?);
            }
        }
        Ok((cur, keys))
    }

    /// Coerce a predicate string through the key leaf's type and encode it.
    fn encode_key_value(&self, leaf: NodeId, raw: &str) -> Result<Value, CodecError> {
        let node = self.schema().node(leaf);
        let typ = node.typ.clone().unwrap_or_default();
        let json = match self.effective_type_name(&typ).as_str() {
            "int8" | "int16" | "int32" | "int64" | "uint8" | "uint16" | "uint32" | "uint64" => {
                serde_json::Value::String(raw.to_string())
            },
            "boolean" => serde_json::Value::Bool(raw == "true"),
            "empty" if raw == "[null]" => serde_json::Value::Null,
            _ => serde_json::Value::String(raw.to_string()),
        };
        self.type_encode(leaf, &typ, &json, false)
    }

    /// Decode the wire form back into a path string.
    pub fn decode_iid(&self, value: &Value) -> Result<String, CodecError> {
        let (sid, mut key_values) = match value {
            Value::Integer(i) => (i128::from(*i) as i64, Vec::new()),
            Value::Array(items) => match items.split_first() {
                Some((Value::Integer(i), rest)) => (i128::from(*i) as i64, rest.to_vec()),
                _ => {
                    return Err(CodecError::Cbor("instance-identifier array without sid".into()));
                },
            },
            other => {
                return Err(CodecError::Cbor(format!(
                    "instance-identifier must be int or array, got {other:?}"
                )));
            },
        };

        let schema = self.schema();
        let (_, path) = schema
            .find_by_sid(sid)
            .ok_or(CodecError::UnknownSid { parent: "/".into(), sid })?;

        let mut out = String::new();
        let mut pending = key_values.drain(..);
        for &id in &path {
            let node = schema.node(id);
            match node.keyword {
                Keyword::Module => continue,
                kw if kw.is_transparent() => continue,
                _ => {},
            }
            out.push('/');
            out.push_str(&node.arg);
            if node.keyword == Keyword::List {
                for key_name in &node.keys {
                    let Some(raw) = pending.next() else {
                        // Key-less form addresses the whole list.
                        continue;
                    };
                    let leaf = schema.child_by_arg(id, key_name).ok_or_else(|| {
                        CodecError::InvalidIid {
                            iid: out.clone(),
                            reason: format!("missing key leaf {key_name:?}"),
                        }
                    })?;
                    let typ = schema.node(leaf).typ.clone().unwrap_or_default();
                    let json = self.type_decode(leaf, &typ, &raw, false)?;
                    out.push_str(&format!("[{}='{}']", key_name, render_key(&json)));
                }
            }
        }
        Ok(out)
    }
}

fn render_key(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "[null]".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_outside_brackets_only() {
        let segs = parse("/ietf-interfaces:interfaces/interface[name='e/0']/enabled").unwrap();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].arg, "ietf-interfaces:interfaces");
        assert_eq!(segs[1].arg, "interface");
        assert_eq!(segs[1].keys, vec![("name".to_string(), "e/0".to_string())]);
        assert_eq!(segs[2].arg, "enabled");
    }

    #[test]
    fn double_quotes_and_bare_values() {
        let segs = parse(r#"/m:l[a="x"][b=7]"#).unwrap();
        assert_eq!(
            segs[0].keys,
            vec![("a".to_string(), "x".to_string()), ("b".to_string(), "7".to_string())]
        );
    }

    #[test]
    fn rejects_missing_slash_and_unterminated() {
        assert!(parse("m:x").is_err());
        assert!(parse("/m:l[a='x").is_err());
        assert!(parse("/").is_err());
    }
}
