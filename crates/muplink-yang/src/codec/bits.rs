//! Compact representation of `bits` values (RFC 9254 §6.7).
//!
//! The set of positions becomes either one byte string (bit N of byte I is
//! position `I*8 + N`) or, when the set is sparse, a heterogeneous array
//! alternating byte-string fragments and integer skip counts measured in
//! bytes. The empty set is the empty array.

use ciborium::value::{Integer, Value};

use crate::error::CodecError;

/// Encode sorted, deduplicated bit positions.
pub(crate) fn encode(positions: &[u32]) -> Value {
    let mut frags: Vec<Value> = Vec::new();
    let mut bytes: Vec<u8> = Vec::new();
    // Byte index the next appended byte would occupy.
    let mut next_byte: u32 = 0;

    for &pos in positions {
        let idx = pos / 8;
        let bit = 1u8 << (pos % 8);
        if !bytes.is_empty() && idx + 1 == next_byte {
            // Still inside the current byte.
            if let Some(last) = bytes.last_mut() {
                *last |= bit;
            }
        } else if idx == next_byte {
            // Adjacent byte, same fragment.
            bytes.push(bit);
            next_byte = idx + 1;
        } else {
            // Gap: flush the fragment, record the skip in bytes.
            if !bytes.is_empty() {
                frags.push(Value::Bytes(std::mem::take(&mut bytes)));
            }
            frags.push(Value::Integer(Integer::from(idx - next_byte)));
            bytes.push(bit);
            next_byte = idx + 1;
        }
    }

    if frags.is_empty() {
        if bytes.is_empty() {
            Value::Array(Vec::new())
        } else {
            Value::Bytes(bytes)
        }
    } else {
        if !bytes.is_empty() {
            frags.push(Value::Bytes(bytes));
        }
        Value::Array(frags)
    }
}

/// Recover the set of positions from a compact value.
pub(crate) fn decode(value: &Value) -> Result<Vec<u32>, CodecError> {
    let mut positions = Vec::new();
    let mut cursor: u32 = 0;
    let scan = |bytes: &[u8], cursor: &mut u32, positions: &mut Vec<u32>| {
        for &b in bytes {
            for bit in 0..8 {
                if b & (1 << bit) != 0 {
                    positions.push(*cursor * 8 + bit);
                }
            }
            *cursor += 1;
        }
    };
    match value {
        Value::Bytes(bytes) => scan(bytes, &mut cursor, &mut positions),
        Value::Array(frags) => {
            for frag in frags {
                match frag {
                    Value::Bytes(bytes) => scan(bytes, &mut cursor, &mut positions),
                    Value::Integer(skip) => {
                        cursor = cursor
                            .checked_add(i128::from(*skip).try_into().map_err(|_| {
                                CodecError::Cbor("negative bits skip".into())
                            })?)
                            .ok_or_else(|| CodecError::Cbor("bits skip overflow".into()))?;
                    },
                    other => {
                        return Err(CodecError::Cbor(format!(
                            "bits fragment must be bytes or int, got {other:?}"
                        )));
                    },
                }
            }
        },
        other => {
            return Err(CodecError::Cbor(format!("bits value must be bytes or array, got {other:?}")));
        },
    }
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_bits_make_one_byte_string() {
        // {2, 8}: bytes 0 and 1, no gap.
        assert_eq!(encode(&[2, 8]), Value::Bytes(vec![0x04, 0x01]));
    }

    #[test]
    fn sparse_bits_fragment_with_skips() {
        // {2, 8, 128}: fragment [04 01], skip 14 bytes, fragment [01].
        assert_eq!(
            encode(&[2, 8, 128]),
            Value::Array(vec![
                Value::Bytes(vec![0x04, 0x01]),
                Value::Integer(Integer::from(14)),
                Value::Bytes(vec![0x01]),
            ])
        );
    }

    #[test]
    fn leading_gap_starts_with_skip() {
        assert_eq!(
            encode(&[40]),
            Value::Array(vec![Value::Integer(Integer::from(5)), Value::Bytes(vec![0x01])])
        );
    }

    #[test]
    fn empty_set_is_empty_array() {
        assert_eq!(encode(&[]), Value::Array(Vec::new()));
        assert_eq!(decode(&Value::Array(Vec::new())).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn decode_inverts_encode() {
        for set in [vec![], vec![0], vec![2, 8], vec![2, 8, 128], vec![7, 9, 1000, 1001]] {
            assert_eq!(decode(&encode(&set)).unwrap(), set, "set {set:?}");
        }
    }
}
