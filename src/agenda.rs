//! The agenda: an indexed max-heap of scored candidate facts.
//!
//! Besides the binary heap itself the agenda keeps a position index
//! (fact → heap slot) for O(log n) arbitrary removal, a node adjacency index,
//! and a fine index keyed like the state's `(position, relation, node)`.
//!
//! Scores are never updated in place. To change the score of a pending fact,
//! [`remove`](Agenda::remove) it and [`push`](Agenda::push) it again.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AgendaError, UbertsResult};
use crate::fact::{ArgPos, Fact, RelationId};
use crate::node::NodeId;
use crate::schema::{FactKey, Schema};
use crate::score::Adjoints;
use crate::state::ArgKey;

/// How the heap orders pending facts. The priority is computed once, at push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Highest score first.
    #[default]
    EasyFirst,
    /// Earliest push first.
    Bfs,
    /// Latest push first.
    Dfs,
}

#[derive(Debug, Clone)]
struct Item {
    fact: Fact,
    score: Adjoints,
    priority: f64,
    tie: FactKey,
}

impl Item {
    /// Whether `self` must sit above `other` in the heap. Equal priorities
    /// break by relation name, then argument values, ascending.
    fn outranks(&self, other: &Item) -> bool {
        match self.priority.total_cmp(&other.priority) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.tie < other.tie,
        }
    }
}

pub struct Agenda {
    schema: Arc<Schema>,
    priority: Priority,
    heap: Vec<Item>,
    positions: HashMap<Fact, usize>,
    by_node: HashMap<NodeId, BTreeSet<Fact>>,
    by_arg: HashMap<ArgKey, BTreeSet<Fact>>,
    pushes: u64,
}

impl Agenda {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_priority(schema, Priority::default())
    }

    pub fn with_priority(schema: Arc<Schema>, priority: Priority) -> Self {
        Self {
            schema,
            priority,
            heap: Vec::new(),
            positions: HashMap::new(),
            by_node: HashMap::new(),
            by_arg: HashMap::new(),
            pushes: 0,
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Add a fact with its score. Fails if the fact is already pending.
    pub fn push(&mut self, fact: Fact, score: Adjoints) -> UbertsResult<()> {
        if self.positions.contains_key(&fact) {
            return Err(AgendaError::AlreadyPresent {
                fact: self.schema.display_fact(&fact),
            }
            .into());
        }
        self.pushes += 1;
        let priority = match self.priority {
            Priority::EasyFirst => score.forward(),
            Priority::Bfs => -(self.pushes as f64),
            Priority::Dfs => self.pushes as f64,
        };
        for node in fact.nodes() {
            self.by_node.entry(node).or_default().insert(fact.clone());
        }
        for (pos, node) in fact.args() {
            self.by_arg
                .entry((pos, fact.relation(), node))
                .or_default()
                .insert(fact.clone());
        }
        let tie = self.schema.fact_key(&fact);
        let slot = self.heap.len();
        self.positions.insert(fact.clone(), slot);
        self.heap.push(Item {
            fact,
            score,
            priority,
            tie,
        });
        self.sift_up(slot);
        Ok(())
    }

    /// The highest-priority fact and its score.
    pub fn peek(&self) -> Option<(&Fact, &Adjoints)> {
        self.heap.first().map(|i| (&i.fact, &i.score))
    }

    /// Remove and return the highest-priority fact.
    pub fn pop(&mut self) -> UbertsResult<(Fact, Adjoints)> {
        if self.heap.is_empty() {
            return Err(AgendaError::Empty.into());
        }
        Ok(self.remove_at(0))
    }

    /// Remove a pending fact, returning its score so the caller can compose a
    /// new one and push it again.
    pub fn remove(&mut self, fact: &Fact) -> UbertsResult<Adjoints> {
        match self.positions.get(fact) {
            Some(&slot) => Ok(self.remove_at(slot).1),
            None => Err(AgendaError::NotPresent {
                fact: self.schema.display_fact(fact),
            }
            .into()),
        }
    }

    pub fn contains(&self, fact: &Fact) -> bool {
        self.positions.contains_key(fact)
    }

    pub fn score_of(&self, fact: &Fact) -> Option<&Adjoints> {
        self.positions.get(fact).map(|&i| &self.heap[i].score)
    }

    /// Pending facts touching `node`, in fact order.
    pub fn adjacent(&self, node: NodeId) -> impl Iterator<Item = &Fact> + '_ {
        self.by_node.get(&node).into_iter().flatten()
    }

    /// Pending facts of `relation` whose argument at `pos` is `node`.
    pub fn matching(&self, pos: ArgPos, relation: RelationId, node: NodeId) -> impl Iterator<Item = &Fact> + '_ {
        self.by_arg.get(&(pos, relation, node)).into_iter().flatten()
    }

    /// Pending items in heap order (not sorted).
    pub fn items(&self) -> impl Iterator<Item = (&Fact, &Adjoints)> + '_ {
        self.heap.iter().map(|i| (&i.fact, &i.score))
    }

    /// Pending items in the order they would pop.
    pub fn sorted_items(&self) -> Vec<(&Fact, &Adjoints)> {
        let mut items: Vec<&Item> = self.heap.iter().collect();
        items.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.tie.cmp(&b.tie))
        });
        items.into_iter().map(|i| (&i.fact, &i.score)).collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.positions.clear();
        self.by_node.clear();
        self.by_arg.clear();
        self.pushes = 0;
    }

    /// Every non-root slot ranks no higher than its parent.
    pub fn parent_invariant_holds(&self) -> bool {
        (1..self.heap.len()).all(|i| !self.heap[i].outranks(&self.heap[(i - 1) / 2]))
    }

    // -----------------------------------------------------------------------
    // Heap internals
    // -----------------------------------------------------------------------

    fn remove_at(&mut self, slot: usize) -> (Fact, Adjoints) {
        let last = self.heap.len() - 1;
        self.swap(slot, last);
        let item = self.heap.pop().expect("heap is non-empty");
        self.positions.remove(&item.fact);
        if slot < self.heap.len() {
            // The moved item may belong above or below its new slot.
            self.sift_down(slot);
            self.sift_up(slot);
        }
        for node in item.fact.nodes() {
            if let Some(set) = self.by_node.get_mut(&node) {
                set.remove(&item.fact);
                if set.is_empty() {
                    self.by_node.remove(&node);
                }
            }
        }
        for (pos, node) in item.fact.args() {
            let key = (pos, item.fact.relation(), node);
            if let Some(set) = self.by_arg.get_mut(&key) {
                set.remove(&item.fact);
                if set.is_empty() {
                    self.by_arg.remove(&key);
                }
            }
        }
        (item.fact, item.score)
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        self.positions.insert(self.heap[a].fact.clone(), a);
        self.positions.insert(self.heap[b].fact.clone(), b);
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if !self.heap[slot].outranks(&self.heap[parent]) {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut best = slot;
            if left < len && self.heap[left].outranks(&self.heap[best]) {
                best = left;
            }
            if right < len && self.heap[right].outranks(&self.heap[best]) {
                best = right;
            }
            if best == slot {
                break;
            }
            self.swap(slot, best);
            slot = best;
        }
    }
}

impl std::fmt::Debug for Agenda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agenda")
            .field("priority", &self.priority)
            .field("len", &self.heap.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UbertsError;
    use crate::node::Value;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn schema() -> Arc<Schema> {
        let s = Schema::new();
        s.define_relation_by_names("a", &["tok"]).unwrap();
        s.define_relation_by_names("b", &["tok", "tok"]).unwrap();
        Arc::new(s)
    }

    fn a(s: &Schema, i: i64) -> Fact {
        s.fact_from_values("a", &[Value::Int(i)]).unwrap()
    }

    fn b(s: &Schema, i: i64, j: i64) -> Fact {
        s.fact_from_values("b", &[Value::Int(i), Value::Int(j)]).unwrap()
    }

    #[test]
    fn pops_in_score_order() {
        let s = schema();
        let mut ag = Agenda::new(Arc::clone(&s));
        ag.push(a(&s, 1), Adjoints::constant(0.5)).unwrap();
        ag.push(a(&s, 2), Adjoints::constant(2.0)).unwrap();
        ag.push(a(&s, 3), Adjoints::constant(-1.0)).unwrap();
        let order: Vec<f64> = std::iter::from_fn(|| ag.pop().ok().map(|(_, sc)| sc.forward())).collect();
        assert_eq!(order, vec![2.0, 0.5, -1.0]);
    }

    #[test]
    fn ties_break_by_relation_then_values() {
        let s = schema();
        let mut ag = Agenda::new(Arc::clone(&s));
        ag.push(b(&s, 0, 1), Adjoints::constant(1.0)).unwrap();
        ag.push(a(&s, 5), Adjoints::constant(1.0)).unwrap();
        ag.push(a(&s, 2), Adjoints::constant(1.0)).unwrap();
        let order: Vec<String> =
            std::iter::from_fn(|| ag.pop().ok().map(|(f, _)| s.display_fact(&f))).collect();
        assert_eq!(order, vec!["a(2)", "a(5)", "b(0, 1)"]);
    }

    #[test]
    fn push_twice_is_an_error() {
        let s = schema();
        let mut ag = Agenda::new(Arc::clone(&s));
        ag.push(a(&s, 1), Adjoints::constant(0.0)).unwrap();
        let err = ag.push(a(&s, 1), Adjoints::constant(1.0)).unwrap_err();
        assert!(matches!(err, UbertsError::Agenda(AgendaError::AlreadyPresent { .. })));
    }

    #[test]
    fn remove_then_push_rescoring() {
        let s = schema();
        let mut ag = Agenda::new(Arc::clone(&s));
        ag.push(a(&s, 1), Adjoints::constant(1.0)).unwrap();
        ag.push(a(&s, 2), Adjoints::constant(2.0)).unwrap();
        let old = ag.remove(&a(&s, 1)).unwrap();
        ag.push(a(&s, 1), old.with_term("boost", Adjoints::constant(5.0)))
            .unwrap();
        assert_eq!(ag.peek().map(|(f, _)| f.clone()), Some(a(&s, 1)));
        let err = ag.remove(&a(&s, 9)).unwrap_err();
        assert!(matches!(err, UbertsError::Agenda(AgendaError::NotPresent { .. })));
    }

    #[test]
    fn pop_on_empty_is_an_error() {
        let s = schema();
        let mut ag = Agenda::new(s);
        assert!(matches!(ag.pop(), Err(UbertsError::Agenda(AgendaError::Empty))));
    }

    #[test]
    fn bfs_and_dfs_ignore_scores() {
        let s = schema();
        let mut bfs = Agenda::with_priority(Arc::clone(&s), Priority::Bfs);
        let mut dfs = Agenda::with_priority(Arc::clone(&s), Priority::Dfs);
        for (i, sc) in [(1, 0.1), (2, 9.0), (3, -4.0)] {
            bfs.push(a(&s, i), Adjoints::constant(sc)).unwrap();
            dfs.push(a(&s, i), Adjoints::constant(sc)).unwrap();
        }
        let first = |ag: &mut Agenda| s.display_fact(&ag.pop().unwrap().0);
        assert_eq!(first(&mut bfs), "a(1)");
        assert_eq!(first(&mut dfs), "a(3)");
    }

    #[test]
    fn adjacency_and_fine_view_track_membership() {
        let s = schema();
        let tok = s.node_type("tok").unwrap();
        let one = s.intern_node(tok, 1);
        let rel_b = s.relation_id("b").unwrap();
        let mut ag = Agenda::new(Arc::clone(&s));
        ag.push(a(&s, 1), Adjoints::constant(0.0)).unwrap();
        ag.push(b(&s, 1, 2), Adjoints::constant(0.0)).unwrap();
        ag.push(b(&s, 3, 1), Adjoints::constant(0.0)).unwrap();
        assert_eq!(ag.adjacent(one).count(), 3);
        assert_eq!(ag.matching(ArgPos::Tail(0), rel_b, one).count(), 1);

        ag.remove(&b(&s, 1, 2)).unwrap();
        assert_eq!(ag.adjacent(one).count(), 2);
        assert_eq!(ag.matching(ArgPos::Tail(0), rel_b, one).count(), 0);
        assert!(ag.parent_invariant_holds());
    }

    #[test]
    fn random_operations_match_sorted_reference() {
        let s = schema();
        let mut rng = StdRng::seed_from_u64(7);
        let mut ag = Agenda::new(Arc::clone(&s));
        // Reference: (score, key, fact), popped by max score then min key.
        let mut reference: Vec<(f64, FactKey, Fact)> = Vec::new();

        for _ in 0..2000 {
            match rng.gen_range(0..10) {
                0..=4 => {
                    let f = a(&s, rng.gen_range(0..200));
                    // Integer scores force frequent ties.
                    let score = rng.gen_range(-5..5) as f64;
                    if ag.contains(&f) {
                        assert!(ag.push(f, Adjoints::constant(score)).is_err());
                    } else {
                        ag.push(f.clone(), Adjoints::constant(score)).unwrap();
                        reference.push((score, s.fact_key(&f), f));
                    }
                }
                5..=7 => {
                    let got = ag.pop().ok();
                    reference.sort_by(|x, y| y.0.total_cmp(&x.0).then_with(|| x.1.cmp(&y.1)));
                    let want = if reference.is_empty() {
                        None
                    } else {
                        Some(reference.remove(0))
                    };
                    assert_eq!(got.map(|(f, _)| f), want.map(|w| w.2));
                }
                _ => {
                    let f = a(&s, rng.gen_range(0..200));
                    let in_ref = reference.iter().position(|r| r.2 == f);
                    match (ag.remove(&f), in_ref) {
                        (Ok(sc), Some(i)) => {
                            assert_eq!(sc.forward(), reference.remove(i).0);
                        }
                        (Err(_), None) => {}
                        (got, want) => panic!("remove mismatch: {got:?} vs {want:?}"),
                    }
                }
            }
            assert!(ag.parent_invariant_holds());
            assert_eq!(ag.len(), reference.len());
        }
    }
}
