//! Draft-07 JSON Schema emission.
//!
//! Gives editors completion and validation for the JSON/YAML forms of device
//! data. The mapping mirrors the codec: whatever validates here encodes
//! cleanly. 64-bit integers and decimal64 are strings on the JSON side, so
//! they emit string schemas with value patterns.

use serde_json::{Value as Json, json};

use crate::schema::{Keyword, NodeId, Schema};
use crate::types::Type;
use crate::ContentMode;

/// JSON Schema generator for one schema and content mode.
pub struct Generator<'a> {
    schema: &'a Schema,
    mode: ContentMode,
    config_only: bool,
}

impl<'a> Generator<'a> {
    /// A generator for the full tree.
    ///
    /// `Put` and `Ipatch` modes imply configuration-only output: state
    /// (`config false`) subtrees are omitted.
    #[must_use]
    pub fn new(schema: &'a Schema, mode: ContentMode) -> Self {
        let config_only = matches!(mode, ContentMode::Put | ContentMode::Ipatch);
        Self { schema, mode, config_only }
    }

    /// The draft-07 document with every top-level data node as a property.
    #[must_use]
    pub fn document(&self) -> Json {
        let mut properties = serde_json::Map::new();
        for id in self.schema.data_children(self.schema.root()) {
            if let Some(sub) = self.node_schema(id) {
                properties.insert(self.schema.node(id).arg.clone(), sub);
            }
        }
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": Json::Object(properties),
            "additionalProperties": false,
        })
    }

    /// Subschema for one node; `None` when filtered by configuration-only
    /// mode.
    #[must_use]
    pub fn node_schema(&self, id: NodeId) -> Option<Json> {
        let node = self.schema.node(id);
        if self.config_only && !node.config {
            return None;
        }
        let sub = match node.keyword {
            Keyword::Container | Keyword::Input | Keyword::Output | Keyword::Module => {
                self.object_schema(id)
            },
            Keyword::List => {
                let entry = self.object_schema(id);
                let array = json!({
                    "type": "array",
                    "items": entry,
                    "uniqueItems": node.config,
                });
                // Fetch/iPATCH payloads may address one entry as a bare map.
                if matches!(self.mode, ContentMode::Fetch | ContentMode::Ipatch) {
                    json!({ "oneOf": [array, entry] })
                } else {
                    array
                }
            },
            Keyword::Leaf => self.type_schema(node.typ.as_ref()?),
            Keyword::LeafList => json!({
                "type": "array",
                "items": self.type_schema(node.typ.as_ref()?),
            }),
            Keyword::Rpc | Keyword::Action => {
                let mut props = serde_json::Map::new();
                for &c in &node.children {
                    let child = self.schema.node(c);
                    if matches!(child.keyword, Keyword::Input | Keyword::Output) {
                        props.insert(
                            if child.keyword == Keyword::Input { "input" } else { "output" }
                                .to_string(),
                            self.object_schema(c),
                        );
                    }
                }
                json!({ "type": "object", "properties": Json::Object(props) })
            },
            Keyword::Anydata | Keyword::Anyxml => json!({}),
            _ => return None,
        };
        Some(sub)
    }

    fn object_schema(&self, id: NodeId) -> Json {
        let mut properties = serde_json::Map::new();
        for c in self.schema.data_children(id) {
            if let Some(sub) = self.node_schema(c) {
                properties.insert(self.schema.node(c).arg.clone(), sub);
            }
        }
        json!({
            "type": "object",
            "properties": Json::Object(properties),
            "additionalProperties": false,
        })
    }

    fn type_schema(&self, typ: &Type) -> Json {
        match typ.name.as_str() {
            "int8" | "int16" | "int32" | "uint8" | "uint16" | "uint32" => {
                let (lo, hi) = typ.integer_bounds().unwrap_or((0, 0));
                let (lo, hi) = typ
                    .ranges
                    .first()
                    .map_or((lo, hi), |&(rlo, rhi)| (rlo.max(lo), rhi.min(hi)));
                json!({ "type": "integer", "minimum": lo as i64, "maximum": hi as i64 })
            },
            "int64" => json!({ "type": "string", "pattern": "^-?\\d+$" }),
            "uint64" => json!({ "type": "string", "pattern": "^\\d+$" }),
            "decimal64" => json!({ "type": "string", "pattern": "^-?\\d+(\\.\\d+)?$" }),
            "string" => {
                let mut sub = serde_json::Map::new();
                sub.insert("type".into(), json!("string"));
                if let Some(p) = typ.patterns.first() {
                    sub.insert("pattern".into(), json!(format!("^(?:{p})$")));
                }
                if let Some(&(lo, hi)) = typ.lengths.first() {
                    sub.insert("minLength".into(), json!(lo));
                    sub.insert("maxLength".into(), json!(hi));
                }
                Json::Object(sub)
            },
            "boolean" => json!({ "type": "boolean" }),
            "empty" => json!({ "type": "null" }),
            "binary" => {
                let mut sub = serde_json::Map::new();
                sub.insert("type".into(), json!("string"));
                sub.insert("pattern".into(), json!("^[A-Za-z0-9+/]*={0,2}$"));
                if let Some(&(lo, hi)) = typ.lengths.first() {
                    // Length facets constrain the decoded bytes; base64
                    // expands 3 bytes into 4 characters.
                    sub.insert("minLength".into(), json!(lo.div_ceil(3) * 4));
                    sub.insert("maxLength".into(), json!(hi.div_ceil(3) * 4));
                }
                Json::Object(sub)
            },
            "enumeration" => {
                json!({ "enum": typ.enums.keys().collect::<Vec<_>>() })
            },
            "bits" => {
                let names: Vec<String> =
                    typ.bits.keys().map(|n| regex::escape(n)).collect();
                let alt = names.join("|");
                json!({
                    "type": "string",
                    "pattern": format!("^({alt})?(\\s({alt}))*$"),
                })
            },
            "identityref" => {
                let mut names = Vec::new();
                for ident in self.schema.identities() {
                    let derived = typ.identity_bases.is_empty()
                        || typ
                            .identity_bases
                            .iter()
                            .any(|b| self.schema.identity_derived_from(ident, b));
                    if !derived {
                        continue;
                    }
                    names.push(ident.qualified());
                    if typ.identity_module.as_deref() == Some(ident.module.as_str()) {
                        names.push(ident.name.clone());
                    }
                }
                json!({ "enum": names })
            },
            "union" => {
                let members: Vec<Json> =
                    typ.members.iter().map(|m| self.type_schema(m)).collect();
                json!({ "oneOf": members })
            },
            "leafref" => typ
                .leafref_target
                .and_then(|t| self.schema.node(t).typ.as_ref().map(|tt| self.type_schema(tt)))
                .unwrap_or_else(|| json!({})),
            "instance-identifier" => json!({ "type": "string", "pattern": "^/" }),
            _ => json!({}),
        }
    }
}
