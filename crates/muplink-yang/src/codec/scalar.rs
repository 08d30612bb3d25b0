//! Leaf type translation (RFC 9254 §6).
//!
//! Most builtins pass through; the interesting cases are the types whose
//! wire form differs from their JSON form:
//!
//! | type                | top level              | inside a union          |
//! |---------------------|------------------------|-------------------------|
//! | enumeration         | integer value          | tag 44, name            |
//! | bits                | compact bytes/array    | tag 43, names string    |
//! | identityref         | identity SID           | tag 45, SID             |
//! | decimal64           | tag 4 `[-fd, mant]`    | same                    |
//! | int64/uint64        | integer (string JSON)  | same                    |
//! | binary              | byte string (base64)   | same                    |
//!
//! Union members are tried in declaration order; the first whose JSON-side
//! predicate matches wins and is wrapped in the tag that names its type.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ciborium::value::{Integer, Value};
use serde_json::Value as Json;

use crate::codec::{Codec, bits, shape, shape_cbor};
use crate::error::CodecError;
use crate::schema::NodeId;
use crate::types::Type;

/// CBOR tag for bits inside a union (RFC 9254 §6.7.2).
const TAG_BITS: u64 = 43;
/// CBOR tag for enumeration inside a union (RFC 9254 §6.6.2).
const TAG_ENUM: u64 = 44;
/// CBOR tag for identityref inside a union (RFC 9254 §6.10.2).
const TAG_IDENTITY: u64 = 45;
/// CBOR decimal fraction tag (RFC 8949 §3.4.4).
const TAG_DECIMAL: u64 = 4;

impl Codec<'_> {
    /// The builtin a type bottoms out at, following leafref indirection.
    pub(crate) fn effective_type_name(&self, typ: &Type) -> String {
        if typ.name == "leafref"
            && let Some(target) = typ.leafref_target
            && let Some(t) = self.schema().node(target).typ.as_ref()
        {
            return self.effective_type_name(t);
        }
        typ.name.clone()
    }

    /// Encode one leaf value.
    pub(crate) fn type_encode(
        &self,
        node: NodeId,
        typ: &Type,
        value: &Json,
        in_union: bool,
    ) -> Result<Value, CodecError> {
        let n = self.schema().node(node);
        match typ.name.as_str() {
            "leafref" => {
                let target = typ.leafref_target.ok_or_else(|| shape("resolved leafref", n, value))?;
                let t = self.schema().node(target).typ.clone().unwrap_or_default();
                self.type_encode(target, &t, value, in_union)
            },
            "union" => {
                for member in &typ.members {
                    if self.match_type_json(node, member, value) {
                        return self.type_encode(node, member, value, true);
                    }
                }
                Err(CodecError::UnionMismatch(n.arg.clone()))
            },
            "enumeration" => {
                let name = value.as_str().ok_or_else(|| shape("enum name", n, value))?;
                let &val = typ.enums.get(name).ok_or_else(|| {
                    CodecError::UnknownEnum(name.to_string())
                })?;
                if in_union {
                    Ok(Value::Tag(TAG_ENUM, Box::new(Value::Text(name.to_string()))))
                } else {
                    Ok(Value::Integer(Integer::from(val)))
                }
            },
            "bits" => {
                let text = value.as_str().ok_or_else(|| shape("bits string", n, value))?;
                let mut positions = Vec::new();
                for name in text.split_whitespace() {
                    let &pos = typ
                        .bits
                        .get(name)
                        .ok_or_else(|| CodecError::UnknownBit(name.to_string()))?;
                    positions.push(pos);
                }
                positions.sort_unstable();
                positions.dedup();
                if in_union {
                    Ok(Value::Tag(
                        TAG_BITS,
                        Box::new(Value::Text(bit_names(typ, &positions).join(" "))),
                    ))
                } else {
                    Ok(bits::encode(&positions))
                }
            },
            "identityref" => {
                let name = value.as_str().ok_or_else(|| shape("identity name", n, value))?;
                let sid = self.identity_sid(typ, name)?;
                if in_union {
                    Ok(Value::Tag(TAG_IDENTITY, Box::new(Value::Integer(Integer::from(sid)))))
                } else {
                    Ok(Value::Integer(Integer::from(sid)))
                }
            },
            "decimal64" => {
                let text = match value {
                    Json::String(s) => s.clone(),
                    Json::Number(num) => num.to_string(),
                    _ => return Err(shape("decimal string", n, value)),
                };
                let fd = typ
                    .fraction_digits
                    .ok_or_else(|| CodecError::InvalidDecimal(text.clone()))?;
                let mantissa = parse_decimal(&text, fd)?;
                Ok(Value::Tag(
                    TAG_DECIMAL,
                    Box::new(Value::Array(vec![
                        Value::Integer(Integer::from(-i64::from(fd))),
                        Value::Integer(
                            Integer::try_from(mantissa)
                                .map_err(|_| CodecError::InvalidDecimal(text))?,
                        ),
                    ])),
                ))
            },
            "binary" => {
                let text = value.as_str().ok_or_else(|| shape("base64 string", n, value))?;
                let bytes = BASE64
                    .decode(text)
                    .map_err(|_| CodecError::InvalidBase64(n.arg.clone()))?;
                Ok(Value::Bytes(bytes))
            },
            "int8" | "int16" | "int32" | "uint8" | "uint16" | "uint32" | "int64" | "uint64" => {
                let v = json_int(value).ok_or_else(|| shape("integer", n, value))?;
                Ok(Value::Integer(
                    Integer::try_from(v).map_err(|_| shape("integer", n, value))?,
                ))
            },
            "boolean" => {
                let b = value.as_bool().ok_or_else(|| shape("boolean", n, value))?;
                Ok(Value::Bool(b))
            },
            "string" => {
                let s = value.as_str().ok_or_else(|| shape("string", n, value))?;
                Ok(Value::Text(s.to_string()))
            },
            "empty" => match value {
                Json::Null => Ok(Value::Null),
                Json::Array(items) if items.len() == 1 && items[0].is_null() => Ok(Value::Null),
                _ => Err(shape("null", n, value)),
            },
            "instance-identifier" => {
                let s = value.as_str().ok_or_else(|| shape("instance-identifier", n, value))?;
                self.encode_iid(s)
            },
            _ => Ok(json_to_cbor(value)),
        }
    }

    /// Decode one leaf value.
    pub(crate) fn type_decode(
        &self,
        node: NodeId,
        typ: &Type,
        value: &Value,
        in_union: bool,
    ) -> Result<Json, CodecError> {
        let n = self.schema().node(node);
        match typ.name.as_str() {
            "leafref" => {
                let target =
                    typ.leafref_target.ok_or_else(|| shape_cbor("resolved leafref", n, value))?;
                let t = self.schema().node(target).typ.clone().unwrap_or_default();
                self.type_decode(target, &t, value, in_union)
            },
            "union" => self.union_decode(node, typ, value),
            "enumeration" => match value {
                Value::Integer(i) => {
                    let v = i128::from(*i) as i64;
                    let name = typ
                        .enums
                        .iter()
                        .find(|&(_, &val)| val == v)
                        .map(|(name, _)| name.clone())
                        .ok_or_else(|| CodecError::UnknownEnum(v.to_string()))?;
                    Ok(Json::String(name))
                },
                Value::Tag(TAG_ENUM, inner) => match inner.as_ref() {
                    Value::Text(name) => Ok(Json::String(name.clone())),
                    other => Err(shape_cbor("enum name", n, other)),
                },
                other => Err(shape_cbor("enum value", n, other)),
            },
            "bits" => match value {
                Value::Text(names) => Ok(Json::String(names.clone())),
                Value::Tag(TAG_BITS, inner) => match inner.as_ref() {
                    Value::Text(names) => Ok(Json::String(names.clone())),
                    other => Err(shape_cbor("bits names", n, other)),
                },
                other => {
                    let positions = bits::decode(other)?;
                    Ok(Json::String(bit_names(typ, &positions).join(" ")))
                },
            },
            "identityref" => {
                let sid = match value {
                    Value::Integer(i) => i128::from(*i) as i64,
                    Value::Tag(TAG_IDENTITY, inner) => match inner.as_ref() {
                        Value::Integer(i) => i128::from(*i) as i64,
                        other => return Err(shape_cbor("identity sid", n, other)),
                    },
                    other => return Err(shape_cbor("identity sid", n, other)),
                };
                let ident = self
                    .schema()
                    .identity_by_sid(sid)
                    .ok_or_else(|| CodecError::UnknownIdentity(sid.to_string()))?;
                Ok(Json::String(ident.qualified()))
            },
            "decimal64" => {
                let inner = match value {
                    Value::Tag(TAG_DECIMAL, inner) => inner.as_ref(),
                    v @ Value::Array(_) => v,
                    other => return Err(shape_cbor("decimal fraction", n, other)),
                };
                let Value::Array(parts) = inner else {
                    return Err(shape_cbor("decimal fraction", n, inner));
                };
                let (Some(Value::Integer(exp)), Some(Value::Integer(mant))) =
                    (parts.first(), parts.get(1))
                else {
                    return Err(shape_cbor("decimal fraction", n, inner));
                };
                Ok(Json::String(render_decimal(
                    i128::from(*exp) as i64,
                    i128::from(*mant),
                )))
            },
            "binary" => match value {
                Value::Bytes(bytes) => Ok(Json::String(BASE64.encode(bytes))),
                other => Err(shape_cbor("bytes", n, other)),
            },
            "int64" | "uint64" => match value {
                Value::Integer(i) => Ok(Json::String(i128::from(*i).to_string())),
                other => Err(shape_cbor("integer", n, other)),
            },
            "int8" | "int16" | "int32" | "uint8" | "uint16" | "uint32" => match value {
                Value::Integer(i) => {
                    let v = i128::from(*i);
                    let num = if v < 0 {
                        serde_json::Number::from(v as i64)
                    } else {
                        serde_json::Number::from(v as u64)
                    };
                    Ok(Json::Number(num))
                },
                other => Err(shape_cbor("integer", n, other)),
            },
            "boolean" => match value {
                Value::Bool(b) => Ok(Json::Bool(*b)),
                other => Err(shape_cbor("boolean", n, other)),
            },
            "string" => match value {
                Value::Text(s) => Ok(Json::String(s.clone())),
                other => Err(shape_cbor("text", n, other)),
            },
            "empty" => match value {
                Value::Null => Ok(Json::Null),
                other => Err(shape_cbor("null", n, other)),
            },
            "instance-identifier" => Ok(Json::String(self.decode_iid(value)?)),
            _ => Ok(cbor_to_json(value)),
        }
    }

    /// Route a union value: tagged values pick their member kind directly,
    /// anything else is tried against each member in declaration order.
    fn union_decode(&self, node: NodeId, typ: &Type, value: &Value) -> Result<Json, CodecError> {
        let n = self.schema().node(node);
        if let Value::Tag(tag @ (TAG_BITS | TAG_ENUM | TAG_IDENTITY), _) = value {
            let want = match *tag {
                TAG_BITS => "bits",
                TAG_ENUM => "enumeration",
                _ => "identityref",
            };
            let member = typ
                .members
                .iter()
                .find(|m| self.effective_type_name(m) == want)
                .ok_or_else(|| CodecError::UnionMismatch(n.arg.clone()))?;
            return self.type_decode(node, member, value, true);
        }
        for member in &typ.members {
            if let Ok(v) = self.type_decode(node, member, value, true) {
                return Ok(v);
            }
        }
        Err(CodecError::UnionMismatch(n.arg.clone()))
    }

    /// JSON-side union discrimination.
    pub(crate) fn match_type_json(&self, node: NodeId, typ: &Type, value: &Json) -> bool {
        match typ.name.as_str() {
            "leafref" => {
                let Some(target) = typ.leafref_target else { return false };
                let Some(t) = self.schema().node(target).typ.clone() else { return false };
                self.match_type_json(target, &t, value)
            },
            "union" => typ.members.iter().any(|m| self.match_type_json(node, m, value)),
            "int8" | "int16" | "int32" | "uint8" | "uint16" | "uint32" | "int64" | "uint64" => {
                json_int(value).is_some_and(|v| typ.in_ranges(v))
            },
            "decimal64" => {
                let Some(fd) = typ.fraction_digits else { return false };
                let text = match value {
                    Json::String(s) => s.clone(),
                    Json::Number(num) => num.to_string(),
                    _ => return false,
                };
                parse_decimal(&text, fd).is_ok_and(|mant| typ.ranges.is_empty() || typ.in_ranges(mant))
            },
            "string" => {
                let Some(s) = value.as_str() else { return false };
                typ.in_lengths(s.chars().count() as u64)
                    && typ.patterns.iter().all(|p| {
                        regex::Regex::new(&anchored(p)).is_ok_and(|re| re.is_match(s))
                    })
            },
            "binary" => value
                .as_str()
                .and_then(|s| BASE64.decode(s).ok())
                .is_some_and(|bytes| typ.in_lengths(bytes.len() as u64)),
            "bits" => value
                .as_str()
                .is_some_and(|s| s.split_whitespace().all(|name| typ.bits.contains_key(name))),
            "enumeration" => {
                // Membership is checked against the enum table; the bit
                // table plays no part here.
                value.as_str().is_some_and(|s| typ.enums.contains_key(s))
            },
            "identityref" => value.as_str().is_some_and(|s| {
                self.lookup_identity(typ, s).is_some_and(|ident| {
                    typ.identity_bases.is_empty()
                        || typ
                            .identity_bases
                            .iter()
                            .any(|b| self.schema().identity_derived_from(ident, b))
                })
            }),
            "boolean" => value.is_boolean(),
            "empty" => value.is_null(),
            "instance-identifier" => {
                value.as_str().is_some_and(|s| self.resolve_iid(s).is_ok())
            },
            _ => false,
        }
    }

    fn lookup_identity(&self, typ: &Type, name: &str) -> Option<&crate::schema::Identity> {
        let (module, bare) = match name.split_once(':') {
            Some((m, n)) => (Some(m), n),
            None => (None, name),
        };
        self.schema().identity(module, bare, typ.identity_module.as_deref())
    }

    fn identity_sid(&self, typ: &Type, name: &str) -> Result<i64, CodecError> {
        let ident = self
            .lookup_identity(typ, name)
            .ok_or_else(|| CodecError::UnknownIdentity(name.to_string()))?;
        ident.sid.ok_or_else(|| CodecError::MissingSid(ident.qualified()))
    }
}

/// Bit names for sorted positions, in position order.
fn bit_names(typ: &Type, positions: &[u32]) -> Vec<String> {
    positions
        .iter()
        .filter_map(|&p| {
            typ.bits.iter().find(|&(_, &pos)| pos == p).map(|(name, _)| name.clone())
        })
        .collect()
}

/// Integers arrive as JSON numbers or, for the 64-bit types, strings.
fn json_int(value: &Json) -> Option<i128> {
    match value {
        Json::Number(n) => {
            if let Some(v) = n.as_i64() {
                Some(i128::from(v))
            } else {
                n.as_u64().map(i128::from)
            }
        },
        Json::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Parse a decimal string into mantissa units of `10^-fd`.
fn parse_decimal(s: &str, fd: u8) -> Result<i128, CodecError> {
    let bad = || CodecError::InvalidDecimal(s.to_string());
    let (neg, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s),
    };
    let (int_part, frac_part) = rest.split_once('.').unwrap_or((rest, ""));
    if int_part.is_empty()
        || frac_part.len() > usize::from(fd)
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(bad());
    }
    let mut digits = String::with_capacity(int_part.len() + usize::from(fd));
    digits.push_str(int_part);
    digits.push_str(frac_part);
    for _ in frac_part.len()..usize::from(fd) {
        digits.push('0');
    }
    let mant: i128 = digits.parse().map_err(|_| bad())?;
    Ok(if neg { -mant } else { mant })
}

/// Render a decimal fraction `[exp, mant]` with `-exp` fraction digits.
fn render_decimal(exp: i64, mant: i128) -> String {
    if exp >= 0 {
        let mut s = mant.to_string();
        s.extend(std::iter::repeat_n('0', exp as usize));
        return s;
    }
    let fd = exp.unsigned_abs() as usize;
    let neg = mant < 0;
    let mut digits = mant.unsigned_abs().to_string();
    while digits.len() <= fd {
        digits.insert(0, '0');
    }
    let split = digits.len() - fd;
    format!("{}{}.{}", if neg { "-" } else { "" }, &digits[..split], &digits[split..])
}

/// YANG patterns match the whole value.
fn anchored(pattern: &str) -> String {
    format!("^(?:{pattern})$")
}

/// Generic passthrough for types with no special wire form.
fn json_to_cbor(value: &Json) -> Value {
    match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(v) = n.as_i64() {
                Value::Integer(Integer::from(v))
            } else if let Some(v) = n.as_u64() {
                Value::Integer(Integer::from(v))
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(json_to_cbor).collect()),
        Json::Object(obj) => Value::Map(
            obj.iter().map(|(k, v)| (Value::Text(k.clone()), json_to_cbor(v))).collect(),
        ),
    }
}

fn cbor_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(i) => {
            let v = i128::from(*i);
            if let Ok(small) = i64::try_from(v) {
                Json::Number(small.into())
            } else if let Ok(big) = u64::try_from(v) {
                Json::Number(big.into())
            } else {
                Json::String(v.to_string())
            }
        },
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Bytes(bytes) => Json::String(BASE64.encode(bytes)),
        Value::Text(s) => Json::String(s.clone()),
        Value::Array(items) => Json::Array(items.iter().map(cbor_to_json).collect()),
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        Value::Text(s) => s.clone(),
                        other => format!("{other:?}"),
                    };
                    (key, cbor_to_json(v))
                })
                .collect(),
        ),
        Value::Tag(_, inner) => cbor_to_json(inner),
        _ => Json::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_parse_scales_to_mantissa() {
        assert_eq!(parse_decimal("2.57", 2).unwrap(), 257);
        assert_eq!(parse_decimal("257", 2).unwrap(), 25700);
        assert_eq!(parse_decimal("-0.07", 2).unwrap(), -7);
        assert!(parse_decimal("2.575", 2).is_err());
        assert!(parse_decimal("abc", 2).is_err());
    }

    #[test]
    fn decimal_render_pads_both_sides() {
        assert_eq!(render_decimal(-2, 257), "2.57");
        assert_eq!(render_decimal(-2, 25700), "257.00");
        assert_eq!(render_decimal(-3, 7), "0.007");
        assert_eq!(render_decimal(-2, -7), "-0.07");
        assert_eq!(render_decimal(2, 3), "300");
    }
}
