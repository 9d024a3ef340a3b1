//! Typed nodes and their interning store.
//!
//! A node is a `(NodeType, Value)` pair. Nodes are interned: asking twice for
//! the same pair yields the same [`NodeId`], so everything downstream compares
//! nodes by id and never re-compares values. The [`NodeStore`] is safe to share
//! across threads, letting independent runs intern nodes concurrently.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

/// Identifier of a registered node type (a named domain such as `tokenIndex`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeTypeId(pub(crate) u32);

impl NodeTypeId {
    /// Position of this type in the schema's registry.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type:{}", self.0)
    }
}

/// Unique, niche-optimized identifier for an interned node.
///
/// Uses `NonZeroU32` so that `Option<NodeId>` is the same size as `NodeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    fn from_index(index: usize) -> Self {
        let raw = u32::try_from(index + 1).expect("node id space exhausted");
        // index + 1 is never zero
        NodeId(NonZeroU32::new(raw).expect("non-zero node id"))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u32) -> Self {
        NodeId(NonZeroU32::new(raw).expect("non-zero node id"))
    }

    /// Position of this node in the store.
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// Get the underlying raw value.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// The value carried by a node.
///
/// Ordering is total so that ties on the agenda and state dumps can be broken
/// deterministically by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Str(Arc<str>),
    /// Used for witness heads: the tuple of a fact's tail values.
    Tuple(Arc<[Value]>),
}

impl Value {
    /// Parse a bare token: integers become [`Value::Int`], anything else a string.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        match token.parse::<i64>() {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Str(Arc::from(token)),
        }
    }

    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Tuple(vs) => {
                write!(f, "(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Node store
// ---------------------------------------------------------------------------

/// What a node id stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    pub node_type: NodeTypeId,
    pub value: Value,
}

/// Thread-safe intern table for nodes.
///
/// Nodes are created lazily on first lookup, never mutated and never removed.
pub struct NodeStore {
    /// (type, value) → id.
    ids: DashMap<(NodeTypeId, Value), NodeId>,
    /// id → (type, value), indexed by `NodeId::index`.
    nodes: RwLock<Vec<NodeData>>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self {
            ids: DashMap::new(),
            nodes: RwLock::new(Vec::new()),
        }
    }

    /// Return the node for `(node_type, value)`, creating it on first request.
    pub fn intern(&self, node_type: NodeTypeId, value: Value) -> NodeId {
        let key = (node_type, value);
        if let Some(id) = self.ids.get(&key) {
            return *id.value();
        }
        // The entry holds the shard lock, so only one thread allocates an id.
        match self.ids.entry(key) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => {
                let mut nodes = self.nodes.write().expect("node store lock poisoned");
                nodes.push(NodeData {
                    node_type,
                    value: e.key().1.clone(),
                });
                let id = NodeId::from_index(nodes.len() - 1);
                e.insert(id);
                id
            }
        }
    }

    /// Look up a node without creating it.
    pub fn lookup(&self, node_type: NodeTypeId, value: &Value) -> Option<NodeId> {
        self.ids
            .get(&(node_type, value.clone()))
            .map(|id| *id.value())
    }

    /// Type and value of a node.
    pub fn get(&self, id: NodeId) -> Option<NodeData> {
        let nodes = self.nodes.read().expect("node store lock poisoned");
        nodes.get(id.index()).cloned()
    }

    /// Value of a node. Panics on ids from a different store.
    pub fn value(&self, id: NodeId) -> Value {
        let nodes = self.nodes.read().expect("node store lock poisoned");
        nodes[id.index()].value.clone()
    }

    /// Type of a node. Panics on ids from a different store.
    pub fn node_type(&self, id: NodeId) -> NodeTypeId {
        let nodes = self.nodes.read().expect("node store lock poisoned");
        nodes[id.index()].node_type
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeStore").field("len", &self.len()).finish()
    }
}
