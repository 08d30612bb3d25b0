//! Loader for the normalized schema documents produced by the external
//! module parser.
//!
//! The parser (out of scope here) flattens YANG modules into a JSON tree of
//! `{keyword, arg, config?, default?, keys?, sid?, type?, substmts[]}`
//! records with SIDs already attached, plus an `identities` table. This
//! loader builds the arena, enforces structural invariants, and resolves
//! leafref targets to node ids.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::SchemaError;
use crate::schema::{Identity, Keyword, Node, NodeId, Schema};
use crate::types::Type;

#[derive(Debug, Deserialize)]
struct InputDoc {
    #[serde(default)]
    modules: Vec<InputStmt>,
    #[serde(default)]
    identities: Vec<InputIdentity>,
}

#[derive(Debug, Deserialize)]
struct InputStmt {
    keyword: Keyword,
    arg: String,
    config: Option<bool>,
    default: Option<String>,
    #[serde(default)]
    keys: Vec<String>,
    sid: Option<i64>,
    #[serde(rename = "type")]
    typ: Option<Type>,
    #[serde(default)]
    substmts: Vec<InputStmt>,
}

#[derive(Debug, Deserialize)]
struct InputIdentity {
    name: String,
    module: String,
    sid: Option<i64>,
    #[serde(default)]
    bases: Vec<String>,
}

impl Schema {
    /// Build a schema from one normalized JSON document.
    pub fn from_json_str(input: &str) -> Result<Self, SchemaError> {
        let doc: InputDoc =
            serde_json::from_str(input).map_err(|e| SchemaError::Parse(e.to_string()))?;
        Self::build(vec![doc])
    }

    /// Build a schema from a set of normalized JSON documents, merging
    /// their modules and identities.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, SchemaError> {
        let mut docs = Vec::with_capacity(paths.len());
        for p in paths {
            let text = std::fs::read_to_string(p)?;
            docs.push(serde_json::from_str(&text).map_err(|e| SchemaError::Parse(e.to_string()))?);
        }
        Self::build(docs)
    }

    fn build(docs: Vec<InputDoc>) -> Result<Self, SchemaError> {
        let mut schema = Self {
            nodes: vec![Node {
                keyword: Keyword::Module,
                arg: String::new(),
                config: true,
                default: None,
                keys: Vec::new(),
                sid: None,
                typ: None,
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
            identities: Vec::new(),
        };

        for doc in docs {
            for stmt in doc.modules {
                let id = schema.insert(stmt, Some(schema.root), true)?;
                schema.nodes[0].children.push(id);
            }
            for ident in doc.identities {
                schema.identities.push(Identity {
                    name: ident.name,
                    module: ident.module,
                    sid: ident.sid,
                    bases: ident.bases,
                });
            }
        }

        schema.check_unique_sids()?;
        schema.order_list_keys()?;
        schema.resolve_leafrefs()?;
        Ok(schema)
    }

    fn insert(
        &mut self,
        stmt: InputStmt,
        parent: Option<NodeId>,
        parent_config: bool,
    ) -> Result<NodeId, SchemaError> {
        let config = stmt.config.unwrap_or(parent_config);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            keyword: stmt.keyword,
            arg: stmt.arg.clone(),
            config,
            default: stmt.default,
            keys: stmt.keys,
            sid: stmt.sid,
            typ: stmt.typ,
            parent,
            children: Vec::new(),
        });
        for sub in stmt.substmts {
            let child = self.insert(sub, Some(id), config)?;
            self.nodes[id.0 as usize].children.push(child);
        }

        // Invalid YANG is fatal: an rpc/action must carry its materialized
        // input and output statements.
        if matches!(stmt.keyword, Keyword::Rpc | Keyword::Action) {
            let has = |kw| {
                self.nodes[id.0 as usize]
                    .children
                    .iter()
                    .any(|&c| self.nodes[c.0 as usize].keyword == kw)
            };
            if !has(Keyword::Input) || !has(Keyword::Output) {
                return Err(SchemaError::MissingInputOutput(stmt.arg));
            }
        }
        Ok(id)
    }

    fn check_unique_sids(&self) -> Result<(), SchemaError> {
        let mut seen: HashMap<i64, &str> = HashMap::new();
        for node in &self.nodes {
            if let Some(sid) = node.sid
                && let Some(first) = seen.insert(sid, &node.arg)
            {
                return Err(SchemaError::DuplicateSid {
                    sid,
                    first: first.to_string(),
                    second: node.arg.clone(),
                });
            }
        }
        for ident in &self.identities {
            if let Some(sid) = ident.sid
                && let Some(first) = seen.insert(sid, &ident.name)
            {
                return Err(SchemaError::DuplicateSid {
                    sid,
                    first: first.to_string(),
                    second: ident.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Reorder every list's children so the key leaves come first, in `key`
    /// statement order.
    fn order_list_keys(&mut self) -> Result<(), SchemaError> {
        for idx in 0..self.nodes.len() {
            if self.nodes[idx].keyword != Keyword::List {
                continue;
            }
            let keys = self.nodes[idx].keys.clone();
            let mut ordered = Vec::with_capacity(self.nodes[idx].children.len());
            for key in &keys {
                let child = self.nodes[idx]
                    .children
                    .iter()
                    .copied()
                    .find(|&c| {
                        self.nodes[c.0 as usize].keyword == Keyword::Leaf
                            && self.nodes[c.0 as usize].arg == *key
                    })
                    .ok_or_else(|| SchemaError::BadListKey {
                        list: self.nodes[idx].arg.clone(),
                        key: key.clone(),
                    })?;
                ordered.push(child);
            }
            for &c in &self.nodes[idx].children {
                if !ordered.contains(&c) {
                    ordered.push(c);
                }
            }
            self.nodes[idx].children = ordered;
        }
        Ok(())
    }

    fn resolve_leafrefs(&mut self) -> Result<(), SchemaError> {
        for idx in 0..self.nodes.len() {
            let Some(typ) = self.nodes[idx].typ.clone() else { continue };
            let mut typ = typ;
            self.resolve_leafref_type(NodeId(idx as u32), &mut typ)?;
            self.nodes[idx].typ = Some(typ);
        }
        Ok(())
    }

    fn resolve_leafref_type(&self, at: NodeId, typ: &mut Type) -> Result<(), SchemaError> {
        if let Some(path) = typ.leafref.clone() {
            let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
            // Relative paths resolve from the node carrying the leafref, so
            // a leading `..` steps to its parent.
            let start = if path.starts_with('/') { self.root } else { at };
            let target = self.resolve_path(start, &segments).ok_or_else(|| {
                SchemaError::UnresolvedLeafref { path, node: self.node(at).arg.clone() }
            })?;
            typ.leafref_target = Some(target);
        }
        for member in &mut typ.members {
            self.resolve_leafref_type(at, member)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::schema::{Keyword, Schema};

    const DOC: &str = r#"{
      "modules": [{
        "keyword": "module", "arg": "demo", "sid": 1000,
        "substmts": [
          {"keyword": "container", "arg": "demo:system", "sid": 1001, "substmts": [
            {"keyword": "list", "arg": "user", "sid": 1010, "keys": ["name"], "substmts": [
              {"keyword": "leaf", "arg": "uid", "sid": 1012, "type": {"name": "uint32"}},
              {"keyword": "leaf", "arg": "name", "sid": 1011, "type": {"name": "string"}},
              {"keyword": "leaf", "arg": "shell", "sid": 1013,
               "type": {"name": "leafref", "leafref": "../uid"}}
            ]}
          ]},
          {"keyword": "rpc", "arg": "demo:reboot", "sid": 1100, "substmts": [
            {"keyword": "input", "arg": "input", "substmts": [
              {"keyword": "leaf", "arg": "delay", "sid": 1101, "type": {"name": "uint16"}}
            ]},
            {"keyword": "output", "arg": "output", "substmts": []}
          ]}
        ]
      }],
      "identities": [
        {"name": "base-type", "module": "demo", "sid": 1200},
        {"name": "sub-type", "module": "demo", "sid": 1201, "bases": ["demo:base-type"]}
      ]
    }"#;

    #[test]
    fn loads_and_orders_list_keys() {
        let schema = Schema::from_json_str(DOC).unwrap();
        let list = schema.resolve_path(schema.root(), &["demo:system", "user"]).unwrap();
        let children = &schema.node(list).children;
        // "name" is the key and must come first even though it was declared
        // second.
        assert_eq!(schema.node(children[0]).arg, "name");
        assert_eq!(schema.node(children[1]).arg, "uid");
    }

    #[test]
    fn resolves_leafrefs_to_node_ids() {
        let schema = Schema::from_json_str(DOC).unwrap();
        let shell =
            schema.resolve_path(schema.root(), &["demo:system", "user", "shell"]).unwrap();
        let uid = schema.resolve_path(schema.root(), &["demo:system", "user", "uid"]).unwrap();
        let typ = schema.node(shell).typ.as_ref().unwrap();
        assert_eq!(typ.leafref_target, Some(uid));
    }

    #[test]
    fn rpc_input_output_selectable() {
        let schema = Schema::from_json_str(DOC).unwrap();
        let delay =
            schema.resolve_path(schema.root(), &["demo:reboot", "input", "delay"]).unwrap();
        assert_eq!(schema.node(delay).keyword, Keyword::Leaf);
    }

    #[test]
    fn duplicate_sid_is_fatal() {
        let doc = r#"{"modules": [
          {"keyword": "module", "arg": "a", "sid": 5},
          {"keyword": "module", "arg": "b", "sid": 5}
        ]}"#;
        assert!(Schema::from_json_str(doc).is_err());
    }

    #[test]
    fn rpc_without_output_is_fatal() {
        let doc = r#"{"modules": [
          {"keyword": "module", "arg": "m", "sid": 1, "substmts": [
            {"keyword": "rpc", "arg": "m:r", "sid": 2, "substmts": [
              {"keyword": "input", "arg": "input"}
            ]}
          ]}
        ]}"#;
        assert!(Schema::from_json_str(doc).is_err());
    }

    #[test]
    fn find_by_sid_returns_path() {
        let schema = Schema::from_json_str(DOC).unwrap();
        let (id, path) = schema.find_by_sid(1011).unwrap();
        assert_eq!(schema.node(id).arg, "name");
        let args: Vec<_> = path.iter().map(|&p| schema.node(p).arg.clone()).collect();
        assert_eq!(args, vec!["demo", "demo:system", "user", "name"]);
    }
}
