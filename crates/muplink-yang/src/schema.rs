//! Arena-allocated YANG schema tree.
//!
//! Nodes are stored flat and referenced by [`NodeId`] indices, so groupings,
//! augments, and leafref targets never create reference cycles: a leafref
//! holds the target's id, not the target.
//!
//! The tree is rooted at a synthetic node whose children are the modules;
//! top-level data nodes carry module-qualified arguments (`module:name`),
//! everything below is unqualified.

mod load;

use serde::{Deserialize, Serialize};

use crate::types::Type;

/// Index of a node in the schema arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

/// YANG statement keywords the data model uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Keyword {
    /// `module`.
    Module,
    /// `container`.
    Container,
    /// `list`.
    List,
    /// `leaf`.
    Leaf,
    /// `leaf-list`.
    LeafList,
    /// `choice` (transparent in data).
    Choice,
    /// `case` (transparent in data).
    Case,
    /// `rpc`.
    Rpc,
    /// `action`.
    Action,
    /// `input` under rpc/action.
    Input,
    /// `output` under rpc/action.
    Output,
    /// `anydata`.
    Anydata,
    /// `anyxml`.
    Anyxml,
    /// `notification`.
    Notification,
}

impl Keyword {
    /// Whether this statement is invisible in encoded data (descends
    /// straight into its children).
    #[must_use]
    pub fn is_transparent(self) -> bool {
        matches!(self, Self::Choice | Self::Case)
    }
}

/// One resolved statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Statement keyword.
    pub keyword: Keyword,
    /// Argument; module-qualified (`module:name`) for top-level data nodes.
    pub arg: String,
    /// Effective `config` value.
    pub config: bool,
    /// Default value, verbatim.
    pub default: Option<String>,
    /// Key leaf names for lists, in `key` statement order.
    pub keys: Vec<String>,
    /// Schema item identifier, when assigned.
    pub sid: Option<i64>,
    /// Resolved type for leafs and leaf-lists.
    pub typ: Option<Type>,
    /// Parent node; `None` only for the root.
    pub parent: Option<NodeId>,
    /// Child statements. For lists, key leaves come first in key order.
    pub children: Vec<NodeId>,
}

/// A YANG identity with its SID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Identity name.
    pub name: String,
    /// Defining module.
    pub module: String,
    /// Schema item identifier.
    pub sid: Option<i64>,
    /// Direct bases, as `module:name`.
    pub bases: Vec<String>,
}

impl Identity {
    /// `module:name` form.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}:{}", self.module, self.name)
    }
}

/// The resolved schema: statement arena plus the identity table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    nodes: Vec<Node>,
    root: NodeId,
    identities: Vec<Identity>,
}

impl Schema {
    /// The synthetic root node (acts as SID 0).
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Node storage lookup.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// All identities.
    #[must_use]
    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// The SID a node contributes to delta arithmetic: its own SID, or 0
    /// for the root and for sid-less transparent nodes.
    #[must_use]
    pub fn effective_sid(&self, id: NodeId) -> i64 {
        self.node(id).sid.unwrap_or(0)
    }

    /// Children as seen by encoded data: `choice`/`case` statements are
    /// descended through, modules are descended into from the root.
    pub fn data_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_data_children(id, &mut out);
        out
    }

    fn collect_data_children(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &c in &self.node(id).children {
            let child = self.node(c);
            if child.keyword.is_transparent() || (id == self.root && child.keyword == Keyword::Module)
            {
                self.collect_data_children(c, out);
            } else {
                out.push(c);
            }
        }
    }

    /// Find a data child by argument. Matches the full argument, or the
    /// part after `module:` when the caller left the prefix off (or vice
    /// versa).
    #[must_use]
    pub fn child_by_arg(&self, parent: NodeId, arg: &str) -> Option<NodeId> {
        let bare = arg.rsplit(':').next().unwrap_or(arg);
        self.data_children(parent).into_iter().find(|&c| {
            let carg = &self.node(c).arg;
            carg == arg || carg.rsplit(':').next().unwrap_or(carg) == bare
        })
    }

    /// Find a data child whose absolute SID is `sid`.
    #[must_use]
    pub fn child_by_sid(&self, parent: NodeId, sid: i64) -> Option<NodeId> {
        self.data_children(parent).into_iter().find(|&c| self.node(c).sid == Some(sid))
    }

    /// Walk a path of argument segments from `start`.
    ///
    /// `..` ascends; under an rpc or action the segments `input` and
    /// `output` select the implicit child of that keyword.
    #[must_use]
    pub fn resolve_path(&self, start: NodeId, segments: &[&str]) -> Option<NodeId> {
        let mut cur = start;
        for seg in segments {
            cur = match *seg {
                "" | "." => cur,
                ".." => self.node(cur).parent?,
                "input" | "output"
                    if matches!(self.node(cur).keyword, Keyword::Rpc | Keyword::Action) =>
                {
                    let want =
                        if *seg == "input" { Keyword::Input } else { Keyword::Output };
                    self.node(cur).children.iter().copied().find(|&c| self.node(c).keyword == want)?
                },
                seg => self.child_by_arg(cur, seg)?,
            };
        }
        Some(cur)
    }

    /// Depth-first search for a SID; returns the node and the root-to-node
    /// path (root excluded, node included).
    #[must_use]
    pub fn find_by_sid(&self, sid: i64) -> Option<(NodeId, Vec<NodeId>)> {
        let mut path = Vec::new();
        self.dfs_sid(self.root, sid, &mut path).map(|id| (id, path))
    }

    fn dfs_sid(&self, cur: NodeId, sid: i64, path: &mut Vec<NodeId>) -> Option<NodeId> {
        for &c in &self.node(cur).children {
            path.push(c);
            if self.node(c).sid == Some(sid) {
                return Some(c);
            }
            if let Some(found) = self.dfs_sid(c, sid, path) {
                return Some(found);
            }
            path.pop();
        }
        None
    }

    /// Look an identity up by (optional module, name).
    ///
    /// Without a module the `hint` module (usually the identityref's owning
    /// module) is preferred; a unique bare-name match anywhere also counts.
    #[must_use]
    pub fn identity(&self, module: Option<&str>, name: &str, hint: Option<&str>) -> Option<&Identity> {
        if let Some(m) = module {
            return self.identities.iter().find(|i| i.module == m && i.name == name);
        }
        if let Some(h) = hint
            && let Some(found) = self.identities.iter().find(|i| i.module == h && i.name == name)
        {
            return Some(found);
        }
        let mut matches = self.identities.iter().filter(|i| i.name == name);
        let first = matches.next()?;
        matches.next().is_none().then_some(first)
    }

    /// Look an identity up by SID.
    #[must_use]
    pub fn identity_by_sid(&self, sid: i64) -> Option<&Identity> {
        self.identities.iter().find(|i| i.sid == Some(sid))
    }

    /// Whether `ident` is `base` or transitively derived from it.
    #[must_use]
    pub fn identity_derived_from(&self, ident: &Identity, base: &str) -> bool {
        if ident.qualified() == base || ident.name == base {
            return true;
        }
        ident.bases.iter().any(|b| {
            self.identity(b.split_once(':').map(|(m, _)| m), b.rsplit(':').next().unwrap_or(b), None)
                .is_some_and(|p| self.identity_derived_from(p, base))
        })
    }
}
