//! Facts: immutable hyperedges over interned nodes.
//!
//! A [`Fact`] is `(relation, head, tail[])`. It is reference counted so the
//! state, the agenda and in-flight matches can share one allocation, but
//! equality, hashing and ordering are structural over ids: two separately
//! constructed facts with the same relation and nodes are the same map key.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Identifier of a registered relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationId(pub(crate) u32);

impl RelationId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel:{}", self.0)
    }
}

/// An argument position of a fact: the head, or the i-th tail node.
///
/// `Head` sorts before every tail position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArgPos {
    Head,
    Tail(usize),
}

impl fmt::Display for ArgPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgPos::Head => write!(f, "head"),
            ArgPos::Tail(i) => write!(f, "{i}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct FactData {
    relation: RelationId,
    head: NodeId,
    tail: Box<[NodeId]>,
}

/// A committed or candidate fact.
///
/// Construct through [`Schema::make_fact`](crate::schema::Schema::make_fact),
/// which validates arity and node types.
#[derive(Clone)]
pub struct Fact(Arc<FactData>);

impl Fact {
    pub(crate) fn new(relation: RelationId, head: NodeId, tail: Vec<NodeId>) -> Self {
        Fact(Arc::new(FactData {
            relation,
            head,
            tail: tail.into_boxed_slice(),
        }))
    }

    pub fn relation(&self) -> RelationId {
        self.0.relation
    }

    pub fn head(&self) -> NodeId {
        self.0.head
    }

    pub fn tail(&self) -> &[NodeId] {
        &self.0.tail
    }

    pub fn arity(&self) -> usize {
        self.0.tail.len()
    }

    /// The node at `pos`, or `None` when the tail is shorter than `pos`.
    pub fn arg(&self, pos: ArgPos) -> Option<NodeId> {
        match pos {
            ArgPos::Head => Some(self.0.head),
            ArgPos::Tail(i) => self.0.tail.get(i).copied(),
        }
    }

    /// Every `(position, node)` pair, head first.
    pub fn args(&self) -> impl Iterator<Item = (ArgPos, NodeId)> + '_ {
        std::iter::once((ArgPos::Head, self.0.head)).chain(
            self.0
                .tail
                .iter()
                .enumerate()
                .map(|(i, n)| (ArgPos::Tail(i), *n)),
        )
    }

    /// Distinct nodes this fact touches, head first.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.0.tail.len() + 1);
        for (_, n) in self.args() {
            if !out.contains(&n) {
                out.push(n);
            }
        }
        out
    }

    /// Whether two handles share one allocation.
    pub fn ptr_eq(&self, other: &Fact) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Fact {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Fact {}

impl Hash for Fact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for Fact {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fact {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}](", self.0.relation, self.0.head)?;
        for (i, n) in self.0.tail.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{n}")?;
        }
        write!(f, ")")
    }
}
