//! Incremental join matcher.
//!
//! Every rule is inserted once per LHS term, with that term as the trigger:
//! the path for trigger `t` starts at the root edge for `t`'s relation and
//! then visits the remaining terms, each joined to what is already bound.
//! Paths that agree on a prefix share trie nodes, so rules with a common
//! prefix are joined once.
//!
//! A join edge finds candidate facts through the state's argument index:
//! every position whose node is already known (a constant, or a
//! back-reference to a position of a fact bound higher up the path) yields
//! one chronological list, and the lists are intersected. An edge with no
//! such position is free and scans the whole relation.
//!
//! A rule fires once per satisfying tuple of facts, counted at the moment
//! the newest fact of the tuple is committed. To count a tuple exactly once
//! when the new fact could fill several terms, a term earlier than the
//! trigger never binds the trigger fact itself, and no term binds a fact
//! committed after the trigger.
//!
//! The order in which a path binds terms differs from the rule's term order;
//! each accepting node keeps the map from term index to path depth, so a
//! [`Match`] always answers in rule terms.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::compile::{CompiledRule, RuleId, Slot};
use crate::fact::{ArgPos, Fact, RelationId};
use crate::node::NodeId;
use crate::state::{Seq, State, intersect_seqs};

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Source {
    Const(NodeId),
    /// The node at `pos` of the fact bound at `depth`.
    BackRef { depth: usize, pos: ArgPos },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Lookup {
    pos: ArgPos,
    source: Source,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Edge {
    relation: RelationId,
    lookups: Vec<Lookup>,
    /// Position pairs of the candidate that must hold the same node.
    same: Vec<(ArgPos, ArgPos)>,
    skip_trigger: bool,
}

impl Edge {
    fn same_ok(&self, fact: &Fact) -> bool {
        self.same.iter().all(|(a, b)| fact.arg(*a) == fact.arg(*b))
    }

    /// Check a fact directly against the edge (used for triggers, whose
    /// lookups are all constants).
    fn admits(&self, fact: &Fact) -> bool {
        fact.relation() == self.relation
            && self.same_ok(fact)
            && self.lookups.iter().all(|l| match l.source {
                Source::Const(n) => fact.arg(l.pos) == Some(n),
                Source::BackRef { .. } => true,
            })
    }
}

#[derive(Debug)]
struct Accept {
    rule: Arc<CompiledRule>,
    /// Path depth at which each LHS term is bound, by term index.
    term_depth: Vec<usize>,
    trigger_term: usize,
}

#[derive(Debug)]
struct TrieNode {
    edge: Edge,
    children: Vec<usize>,
    accepts: Vec<Accept>,
}

// ---------------------------------------------------------------------------
// Bindings and matches
// ---------------------------------------------------------------------------

/// Facts bound along the current path, one per depth. Grows on descent and
/// shrinks on backtrack.
#[derive(Debug, Default)]
pub struct Bindings {
    facts: Vec<Fact>,
}

impl Bindings {
    fn push(&mut self, fact: Fact) {
        self.facts.push(fact);
    }

    fn pop(&mut self) {
        self.facts.pop();
    }

    pub fn depth(&self) -> usize {
        self.facts.len()
    }

    pub fn get(&self, depth: usize) -> Option<&Fact> {
        self.facts.get(depth)
    }

    pub fn node(&self, depth: usize, pos: ArgPos) -> Option<NodeId> {
        self.facts.get(depth)?.arg(pos)
    }

    /// The `occurrence`-th bound fact of `relation`, counting from the root.
    pub fn occurrence(&self, relation: RelationId, occurrence: usize) -> Option<&Fact> {
        self.facts
            .iter()
            .filter(|f| f.relation() == relation)
            .nth(occurrence)
    }
}

/// One satisfying assignment of a rule's LHS.
#[derive(Debug, Clone)]
pub struct Match {
    rule: Arc<CompiledRule>,
    facts: Vec<Fact>,
    trigger_term: usize,
}

impl Match {
    pub fn rule_id(&self) -> RuleId {
        self.rule.id
    }

    pub fn rule(&self) -> &CompiledRule {
        &self.rule
    }

    /// Bound facts in LHS term order.
    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    pub fn fact(&self, term: usize) -> Option<&Fact> {
        self.facts.get(term)
    }

    /// Node at `pos` of the fact bound to LHS term `term`.
    pub fn value(&self, term: usize, pos: ArgPos) -> Option<NodeId> {
        self.facts.get(term)?.arg(pos)
    }

    /// Node bound to a variable, by name.
    pub fn var(&self, name: &str) -> Option<NodeId> {
        let v = self.rule.var_index(name)?;
        self.rule.var_value(v, &self.facts)
    }

    /// The LHS term the newly committed fact was bound to.
    pub fn trigger_term(&self) -> usize {
        self.trigger_term
    }

    pub fn trigger(&self) -> &Fact {
        &self.facts[self.trigger_term]
    }
}

// ---------------------------------------------------------------------------
// Trie
// ---------------------------------------------------------------------------

/// Summary figures for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrieStats {
    pub rules: usize,
    pub nodes: usize,
    pub trigger_relations: usize,
    pub accepting_paths: usize,
    pub free_edges: usize,
    pub max_depth: usize,
}

#[derive(Debug, Default)]
pub struct PatternTrie {
    nodes: Vec<TrieNode>,
    roots: HashMap<RelationId, Vec<usize>>,
    rules: usize,
    free_edges: usize,
    max_depth: usize,
}

impl PatternTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one path per LHS term of `rule`.
    pub fn insert(&mut self, rule: Arc<CompiledRule>) {
        for trigger in 0..rule.terms.len() {
            let order = join_order(&rule, trigger);
            let mut term_depth = vec![0; rule.terms.len()];
            let mut var_site: HashMap<usize, (usize, ArgPos)> = HashMap::new();
            let mut parent: Option<usize> = None;

            for (depth, &ti) in order.iter().enumerate() {
                term_depth[ti] = depth;
                let term = &rule.terms[ti];
                let mut lookups = Vec::new();
                let mut same = Vec::new();
                for &(pos, slot) in &term.args {
                    match slot {
                        Slot::Node(n) => lookups.push(Lookup {
                            pos,
                            source: Source::Const(n),
                        }),
                        Slot::Var(v) => match var_site.get(&v) {
                            Some(&(d, p)) if d == depth => same.push((p, pos)),
                            Some(&(d, p)) => lookups.push(Lookup {
                                pos,
                                source: Source::BackRef { depth: d, pos: p },
                            }),
                            None => {
                                var_site.insert(v, (depth, pos));
                            }
                        },
                    }
                }
                if depth > 0 && lookups.is_empty() {
                    self.free_edges += 1;
                    tracing::warn!(
                        rule = %rule.rule,
                        term = ti,
                        "free term: the join scans every fact of its relation"
                    );
                }
                let edge = Edge {
                    relation: term.relation,
                    lookups,
                    same,
                    skip_trigger: depth > 0 && ti < trigger && term.relation == rule.terms[trigger].relation,
                };
                parent = Some(self.child(parent, edge));
            }

            let leaf = parent.expect("rules have at least one term");
            self.max_depth = self.max_depth.max(order.len());
            self.nodes[leaf].accepts.push(Accept {
                rule: Arc::clone(&rule),
                term_depth,
                trigger_term: trigger,
            });
        }
        self.rules += 1;
        tracing::debug!(rule = %rule.rule, nodes = self.nodes.len(), "inserted rule into trie");
    }

    /// Find or create the child of `parent` (or root) reached through `edge`.
    fn child(&mut self, parent: Option<usize>, edge: Edge) -> usize {
        let siblings = match parent {
            Some(p) => self.nodes[p].children.as_slice(),
            None => self.roots.get(&edge.relation).map(Vec::as_slice).unwrap_or(&[]),
        };
        if let Some(&existing) = siblings.iter().find(|&&c| self.nodes[c].edge == edge) {
            return existing;
        }
        let id = self.nodes.len();
        let relation = edge.relation;
        self.nodes.push(TrieNode {
            edge,
            children: Vec::new(),
            accepts: Vec::new(),
        });
        match parent {
            Some(p) => self.nodes[p].children.push(id),
            None => self.roots.entry(relation).or_default().push(id),
        }
        id
    }

    /// Every rule match completed by `fact`, which must already be committed
    /// to `state`. Only facts committed up to `fact` take part.
    pub fn match_fact(&self, fact: &Fact, state: &State) -> Vec<Match> {
        let mut out = Vec::new();
        let Some(roots) = self.roots.get(&fact.relation()) else {
            return out;
        };
        let Some(max_seq) = state.seq_of(fact) else {
            tracing::trace!(%fact, "not committed; nothing to match");
            return out;
        };
        let mut bindings = Bindings::default();
        for &root in roots {
            if !self.nodes[root].edge.admits(fact) {
                continue;
            }
            bindings.push(fact.clone());
            self.walk(root, fact, max_seq, state, &mut bindings, &mut out);
            bindings.pop();
        }
        tracing::trace!(%fact, matches = out.len(), "matched");
        out
    }

    fn walk(
        &self,
        node: usize,
        trigger: &Fact,
        max_seq: Seq,
        state: &State,
        bindings: &mut Bindings,
        out: &mut Vec<Match>,
    ) {
        let n = &self.nodes[node];
        for acc in &n.accepts {
            let facts = acc
                .term_depth
                .iter()
                .map(|&d| bindings.facts[d].clone())
                .collect();
            out.push(Match {
                rule: Arc::clone(&acc.rule),
                facts,
                trigger_term: acc.trigger_term,
            });
        }
        for &c in &n.children {
            let edge = &self.nodes[c].edge;
            for seq in candidates(edge, bindings, state, max_seq) {
                let g = state.fact_at(seq);
                if edge.skip_trigger && g == trigger {
                    continue;
                }
                if !edge.same_ok(g) {
                    continue;
                }
                bindings.push(g.clone());
                self.walk(c, trigger, max_seq, state, bindings, out);
                bindings.pop();
            }
        }
    }

    pub fn stats(&self) -> TrieStats {
        TrieStats {
            rules: self.rules,
            nodes: self.nodes.len(),
            trigger_relations: self.roots.len(),
            accepting_paths: self.nodes.iter().map(|n| n.accepts.len()).sum(),
            free_edges: self.free_edges,
            max_depth: self.max_depth,
        }
    }

    /// Relations that can trigger at least one rule.
    pub fn trigger_relations(&self) -> BTreeSet<RelationId> {
        self.roots.keys().copied().collect()
    }
}

/// Candidate sequence numbers for `edge`, ascending, none beyond `max_seq`.
fn candidates(edge: &Edge, bindings: &Bindings, state: &State, max_seq: Seq) -> Vec<Seq> {
    let mut seqs = if edge.lookups.is_empty() {
        state.relation_seqs(edge.relation).to_vec()
    } else {
        let mut lists: Vec<&[Seq]> = Vec::with_capacity(edge.lookups.len());
        for l in &edge.lookups {
            let node = match l.source {
                Source::Const(n) => Some(n),
                Source::BackRef { depth, pos } => bindings.node(depth, pos),
            };
            let Some(node) = node else {
                return Vec::new();
            };
            let list = state.match_seqs(l.pos, edge.relation, node);
            if list.is_empty() {
                return Vec::new();
            }
            lists.push(list);
        }
        intersect_seqs(&lists)
    };
    let end = seqs.partition_point(|s| *s <= max_seq);
    seqs.truncate(end);
    seqs
}

/// Trigger first, then repeatedly the first remaining term sharing a bound
/// variable, else the first remaining term with a constant, else the first.
fn join_order(rule: &CompiledRule, trigger: usize) -> Vec<usize> {
    let vars_of = |ti: usize| -> Vec<usize> {
        rule.terms[ti]
            .args
            .iter()
            .filter_map(|(_, s)| match s {
                Slot::Var(v) => Some(*v),
                Slot::Node(_) => None,
            })
            .collect()
    };
    let has_const = |ti: usize| rule.terms[ti].args.iter().any(|(_, s)| matches!(s, Slot::Node(_)));

    let mut order = vec![trigger];
    let mut bound: BTreeSet<usize> = vars_of(trigger).into_iter().collect();
    while order.len() < rule.terms.len() {
        let remaining: Vec<usize> = (0..rule.terms.len()).filter(|t| !order.contains(t)).collect();
        let next = remaining
            .iter()
            .copied()
            .find(|&t| vars_of(t).iter().any(|v| bound.contains(v)))
            .or_else(|| remaining.iter().copied().find(|&t| has_const(t)))
            .unwrap_or(remaining[0]);
        bound.extend(vars_of(next));
        order.push(next);
    }
    order
}
