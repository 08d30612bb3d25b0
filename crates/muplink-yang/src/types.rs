//! Resolved YANG type information.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::NodeId;

/// The resolved type of a leaf or leaf-list, facets flattened.
///
/// `name` is the builtin the type derives from (`uint8`, `string`, `union`,
/// ...); restrictions from the whole derivation chain arrive pre-merged from
/// the module parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Type {
    /// Builtin type name.
    pub name: String,

    /// Integer ranges, inclusive. For `decimal64` the bounds are scaled to
    /// mantissa units (value × 10^fraction-digits).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<(i128, i128)>,

    /// String/binary length ranges, inclusive, in bytes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lengths: Vec<(u64, u64)>,

    /// Regex pattern statements (all must match).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,

    /// Bit name → position.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bits: BTreeMap<String, u32>,

    /// Enum name → value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enums: BTreeMap<String, i64>,

    /// Union member types, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Type>,

    /// Leafref target path as written in the module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leafref: Option<String>,

    /// Leafref target, resolved at load time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leafref_target: Option<NodeId>,

    /// Identityref base identities, as `module:name`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identity_bases: Vec<String>,

    /// Module owning the identityref type, for resolving bare identity
    /// names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_module: Option<String>,

    /// decimal64 fraction digits (1..=18).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraction_digits: Option<u8>,
}

impl Type {
    /// A bare builtin type with no facets.
    #[must_use]
    pub fn builtin(name: &str) -> Self {
        Self { name: name.to_string(), ..Self::default() }
    }

    /// Natural bounds of the builtin integer types; `None` for
    /// non-integers.
    #[must_use]
    pub fn integer_bounds(&self) -> Option<(i128, i128)> {
        match self.name.as_str() {
            "int8" => Some((i128::from(i8::MIN), i128::from(i8::MAX))),
            "int16" => Some((i128::from(i16::MIN), i128::from(i16::MAX))),
            "int32" => Some((i128::from(i32::MIN), i128::from(i32::MAX))),
            "int64" => Some((i128::from(i64::MIN), i128::from(i64::MAX))),
            "uint8" => Some((0, i128::from(u8::MAX))),
            "uint16" => Some((0, i128::from(u16::MAX))),
            "uint32" => Some((0, i128::from(u32::MAX))),
            "uint64" => Some((0, i128::from(u64::MAX))),
            _ => None,
        }
    }

    /// Whether `v` satisfies the range facets (and natural bounds).
    #[must_use]
    pub fn in_ranges(&self, v: i128) -> bool {
        if let Some((lo, hi)) = self.integer_bounds()
            && !(lo..=hi).contains(&v)
        {
            return false;
        }
        self.ranges.is_empty() || self.ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&v))
    }

    /// Whether a byte/char count satisfies the length facets.
    #[must_use]
    pub fn in_lengths(&self, len: u64) -> bool {
        self.lengths.is_empty() || self.lengths.iter().any(|&(lo, hi)| (lo..=hi).contains(&len))
    }
}
