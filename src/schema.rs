//! Schema registry: node types, relations and the node intern table.
//!
//! A [`Schema`] is built once before any facts exist and then shared
//! read-only (as `Arc<Schema>`) by every engine that decodes against it.
//! Registries are `DashMap`-backed so interning remains possible through a
//! shared reference while independent runs proceed in parallel.

use std::fmt;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{SchemaError, UbertsResult};
use crate::fact::{ArgPos, Fact, RelationId};
use crate::node::{NodeId, NodeStore, NodeTypeId, Value};

/// Prefix of the node type auto-created for relations without an explicit head.
pub const WITNESS_PREFIX: &str = "witness-";

/// A registered relation: ordered argument types plus a head type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub id: RelationId,
    pub name: Arc<str>,
    pub arg_types: Vec<NodeTypeId>,
    pub head_type: NodeTypeId,
    /// True when the head type is the auto-created witness type, whose values
    /// are the tuples of tail values.
    pub witness_head: bool,
}

impl Relation {
    pub fn arity(&self) -> usize {
        self.arg_types.len()
    }

    /// Declared type of the node at `pos`.
    pub fn type_at(&self, pos: ArgPos) -> Option<NodeTypeId> {
        match pos {
            ArgPos::Head => Some(self.head_type),
            ArgPos::Tail(i) => self.arg_types.get(i).copied(),
        }
    }
}

/// Sort key of a fact: relation name, then tail values, then head value.
///
/// Used for deterministic agenda tie-breaking and sorted dumps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactKey {
    pub relation: Arc<str>,
    pub values: Vec<Value>,
}

/// Node types, relations and interned nodes.
pub struct Schema {
    type_names: RwLock<Vec<Arc<str>>>,
    type_ids: DashMap<String, NodeTypeId>,
    relations: RwLock<Vec<Arc<Relation>>>,
    relation_ids: DashMap<String, RelationId>,
    nodes: NodeStore,
}

impl Schema {
    pub fn new() -> Self {
        Self {
            type_names: RwLock::new(Vec::new()),
            type_ids: DashMap::new(),
            relations: RwLock::new(Vec::new()),
            relation_ids: DashMap::new(),
            nodes: NodeStore::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Node types
    // -----------------------------------------------------------------------

    /// Register a node type, or return the existing one with this name.
    pub fn define_node_type(&self, name: &str) -> NodeTypeId {
        if let Some(id) = self.type_ids.get(name) {
            return *id.value();
        }
        match self.type_ids.entry(name.to_string()) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => {
                let mut names = self.type_names.write().expect("schema type lock poisoned");
                let id = NodeTypeId(names.len() as u32);
                names.push(Arc::from(name));
                e.insert(id);
                id
            }
        }
    }

    pub fn node_type(&self, name: &str) -> UbertsResult<NodeTypeId> {
        self.type_ids
            .get(name)
            .map(|id| *id.value())
            .ok_or_else(|| {
                SchemaError::UnknownNodeType {
                    name: name.to_string(),
                }
                .into()
            })
    }

    pub fn node_type_name(&self, id: NodeTypeId) -> Arc<str> {
        let names = self.type_names.read().expect("schema type lock poisoned");
        names
            .get(id.index())
            .cloned()
            .unwrap_or_else(|| Arc::from(id.to_string()))
    }

    pub fn node_type_count(&self) -> usize {
        self.type_ids.len()
    }

    // -----------------------------------------------------------------------
    // Relations
    // -----------------------------------------------------------------------

    /// Register a relation whose head is an auto-created witness node.
    pub fn define_relation(&self, name: &str, arg_types: &[NodeTypeId]) -> UbertsResult<RelationId> {
        self.register_relation(name, arg_types, None)
    }

    /// Register a relation with an explicit head type.
    pub fn define_relation_with_head(
        &self,
        name: &str,
        arg_types: &[NodeTypeId],
        head_type: NodeTypeId,
    ) -> UbertsResult<RelationId> {
        self.register_relation(name, arg_types, Some(head_type))
    }

    /// Register a relation by type names, defining missing node types.
    pub fn define_relation_by_names(&self, name: &str, arg_types: &[&str]) -> UbertsResult<RelationId> {
        let types: Vec<NodeTypeId> = arg_types.iter().map(|t| self.define_node_type(t)).collect();
        self.define_relation(name, &types)
    }

    fn register_relation(
        &self,
        name: &str,
        arg_types: &[NodeTypeId],
        head_type: Option<NodeTypeId>,
    ) -> UbertsResult<RelationId> {
        let (head_type, witness_head) = match head_type {
            Some(t) => (t, false),
            None => (self.define_node_type(&format!("{WITNESS_PREFIX}{name}")), true),
        };
        match self.relation_ids.entry(name.to_string()) {
            Entry::Occupied(_) => Err(SchemaError::DuplicateRelation {
                name: name.to_string(),
            }
            .into()),
            Entry::Vacant(e) => {
                let mut relations = self.relations.write().expect("schema relation lock poisoned");
                let id = RelationId(relations.len() as u32);
                relations.push(Arc::new(Relation {
                    id,
                    name: Arc::from(name),
                    arg_types: arg_types.to_vec(),
                    head_type,
                    witness_head,
                }));
                e.insert(id);
                tracing::debug!(relation = name, arity = arg_types.len(), witness_head, "defined relation");
                Ok(id)
            }
        }
    }

    /// Relation metadata. Panics on ids from a different schema.
    pub fn relation(&self, id: RelationId) -> Arc<Relation> {
        let relations = self.relations.read().expect("schema relation lock poisoned");
        Arc::clone(&relations[id.index()])
    }

    pub fn relation_id(&self, name: &str) -> UbertsResult<RelationId> {
        self.relation_ids
            .get(name)
            .map(|id| *id.value())
            .ok_or_else(|| {
                SchemaError::UnknownRelation {
                    name: name.to_string(),
                }
                .into()
            })
    }

    pub fn relation_by_name(&self, name: &str) -> UbertsResult<Arc<Relation>> {
        let id = self.relation_id(name)?;
        Ok(self.relation(id))
    }

    pub fn relation_name(&self, id: RelationId) -> Arc<str> {
        Arc::clone(&self.relation(id).name)
    }

    /// All relations in registration order.
    pub fn relations(&self) -> Vec<Arc<Relation>> {
        self.relations
            .read()
            .expect("schema relation lock poisoned")
            .clone()
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Intern a node; the same `(type, value)` always yields the same id.
    pub fn intern_node(&self, node_type: NodeTypeId, value: impl Into<Value>) -> NodeId {
        self.nodes.intern(node_type, value.into())
    }

    pub fn lookup_node(&self, node_type: NodeTypeId, value: &Value) -> Option<NodeId> {
        self.nodes.lookup(node_type, value)
    }

    pub fn node_value(&self, id: NodeId) -> Value {
        self.nodes.value(id)
    }

    pub fn node_type_of(&self, id: NodeId) -> NodeTypeId {
        self.nodes.node_type(id)
    }

    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    // -----------------------------------------------------------------------
    // Facts
    // -----------------------------------------------------------------------

    /// Build a fact of a witness-headed relation. The head is the witness node
    /// whose value is the tuple of tail values.
    pub fn make_fact(&self, relation: RelationId, tail: &[NodeId]) -> UbertsResult<Fact> {
        let rel = self.relation(relation);
        if !rel.witness_head {
            return Err(SchemaError::SchemaMismatch {
                relation: rel.name.to_string(),
                position: ArgPos::Head.to_string(),
                expected: self.node_type_name(rel.head_type).to_string(),
                actual: "<witness>".to_string(),
            }
            .into());
        }
        self.check_tail(&rel, tail)?;
        let values: Vec<Value> = tail.iter().map(|n| self.nodes.value(*n)).collect();
        let head = self
            .nodes
            .intern(rel.head_type, Value::Tuple(Arc::from(values)));
        Ok(Fact::new(relation, head, tail.to_vec()))
    }

    /// Build a fact with a caller-supplied head node.
    pub fn make_fact_with_head(&self, relation: RelationId, head: NodeId, tail: &[NodeId]) -> UbertsResult<Fact> {
        let rel = self.relation(relation);
        self.check_type(&rel, ArgPos::Head, rel.head_type, head)?;
        self.check_tail(&rel, tail)?;
        Ok(Fact::new(relation, head, tail.to_vec()))
    }

    /// Build a witness-headed fact from raw values, interning each tail node
    /// with the declared argument type.
    pub fn fact_from_values(&self, relation: &str, values: &[Value]) -> UbertsResult<Fact> {
        let rel = self.relation_by_name(relation)?;
        if values.len() != rel.arity() {
            return Err(SchemaError::ArityMismatch {
                relation: rel.name.to_string(),
                expected: rel.arity(),
                actual: values.len(),
            }
            .into());
        }
        let tail: Vec<NodeId> = rel
            .arg_types
            .iter()
            .zip(values)
            .map(|(t, v)| self.nodes.intern(*t, v.clone()))
            .collect();
        self.make_fact(rel.id, &tail)
    }

    fn check_tail(&self, rel: &Relation, tail: &[NodeId]) -> UbertsResult<()> {
        if tail.len() != rel.arity() {
            return Err(SchemaError::ArityMismatch {
                relation: rel.name.to_string(),
                expected: rel.arity(),
                actual: tail.len(),
            }
            .into());
        }
        for (i, (expected, node)) in rel.arg_types.iter().zip(tail).enumerate() {
            self.check_type(rel, ArgPos::Tail(i), *expected, *node)?;
        }
        Ok(())
    }

    fn check_type(&self, rel: &Relation, pos: ArgPos, expected: NodeTypeId, node: NodeId) -> UbertsResult<()> {
        let actual = self.nodes.node_type(node);
        if actual != expected {
            return Err(SchemaError::SchemaMismatch {
                relation: rel.name.to_string(),
                position: pos.to_string(),
                expected: self.node_type_name(expected).to_string(),
                actual: self.node_type_name(actual).to_string(),
            }
            .into());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    pub fn fact_key(&self, fact: &Fact) -> FactKey {
        let mut values: Vec<Value> = fact.tail().iter().map(|n| self.nodes.value(*n)).collect();
        values.push(self.nodes.value(fact.head()));
        FactKey {
            relation: self.relation_name(fact.relation()),
            values,
        }
    }

    /// Human-readable form: `rel(a, b)` for witness heads, `rel'(h, a, b)`
    /// otherwise.
    pub fn display_fact(&self, fact: &Fact) -> String {
        let rel = self.relation(fact.relation());
        let mut parts: Vec<String> = Vec::with_capacity(fact.arity() + 1);
        if !rel.witness_head {
            parts.push(self.nodes.value(fact.head()).to_string());
        }
        parts.extend(fact.tail().iter().map(|n| self.nodes.value(*n).to_string()));
        let prime = if rel.witness_head { "" } else { "'" };
        format!("{}{}({})", rel.name, prime, parts.join(", "))
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("node_types", &self.node_type_count())
            .field("relations", &self.relation_ids.len())
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
