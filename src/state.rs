//! The committed-fact state: an append-only, indexed fact set.
//!
//! Facts are numbered by commit order. Every index stores these sequence
//! numbers in ascending order, so every query yields facts chronologically and
//! two index lists can be intersected with a linear merge.

use std::collections::HashMap;

use crate::error::{StateError, UbertsResult};
use crate::fact::{ArgPos, Fact, RelationId};
use crate::node::NodeId;

/// Commit-order position of a fact in the [`State`].
pub type Seq = u32;

/// Key of the fine-grained index: "facts of `relation` whose `pos` is `node`".
pub type ArgKey = (ArgPos, RelationId, NodeId);

/// Committed facts with node and argument indices.
#[derive(Debug, Default)]
pub struct State {
    facts: Vec<Fact>,
    seq: HashMap<Fact, Seq>,
    by_node: HashMap<NodeId, Vec<Seq>>,
    by_arg: HashMap<ArgKey, Vec<Seq>>,
    by_relation: HashMap<RelationId, Vec<Seq>>,
    by_head: HashMap<NodeId, Seq>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a fact. Committing the same fact twice is an error: check
    /// [`contains`](Self::contains) first.
    pub fn commit(&mut self, fact: Fact) -> UbertsResult<Seq> {
        if self.seq.contains_key(&fact) {
            return Err(StateError::DuplicateFact {
                fact: fact.to_string(),
            }
            .into());
        }
        let seq = self.facts.len() as Seq;
        for node in fact.nodes() {
            self.by_node.entry(node).or_default().push(seq);
        }
        for (pos, node) in fact.args() {
            self.by_arg
                .entry((pos, fact.relation(), node))
                .or_default()
                .push(seq);
        }
        self.by_relation.entry(fact.relation()).or_default().push(seq);
        self.by_head.entry(fact.head()).or_insert(seq);
        self.seq.insert(fact.clone(), seq);
        self.facts.push(fact);
        Ok(seq)
    }

    pub fn contains(&self, fact: &Fact) -> bool {
        self.seq.contains_key(fact)
    }

    pub fn seq_of(&self, fact: &Fact) -> Option<Seq> {
        self.seq.get(fact).copied()
    }

    /// The fact committed at `seq`. Panics if `seq` was never handed out.
    pub fn fact_at(&self, seq: Seq) -> &Fact {
        &self.facts[seq as usize]
    }

    /// Facts of `relation` whose argument at `pos` is `node`, in commit order.
    pub fn matching(&self, pos: ArgPos, relation: RelationId, node: NodeId) -> impl Iterator<Item = &Fact> + '_ {
        self.seqs(self.match_seqs(pos, relation, node))
    }

    /// Sequence numbers behind [`matching`](Self::matching), ascending.
    pub fn match_seqs(&self, pos: ArgPos, relation: RelationId, node: NodeId) -> &[Seq] {
        self.by_arg
            .get(&(pos, relation, node))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of facts of `relation` with `node` at `pos`.
    pub fn count_matching(&self, pos: ArgPos, relation: RelationId, node: NodeId) -> usize {
        self.match_seqs(pos, relation, node).len()
    }

    /// Facts incident to `node` at any position, in commit order.
    pub fn adjacent(&self, node: NodeId) -> impl Iterator<Item = &Fact> + '_ {
        let seqs = self.by_node.get(&node).map(Vec::as_slice).unwrap_or(&[]);
        self.seqs(seqs)
    }

    /// All facts of `relation`, in commit order.
    pub fn relation_facts(&self, relation: RelationId) -> impl Iterator<Item = &Fact> + '_ {
        self.seqs(self.relation_seqs(relation))
    }

    pub fn relation_seqs(&self, relation: RelationId) -> &[Seq] {
        self.by_relation
            .get(&relation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The first committed fact whose head is `head`.
    pub fn fact_for_head(&self, head: NodeId) -> Option<&Fact> {
        self.by_head.get(&head).map(|s| self.fact_at(*s))
    }

    /// All facts in commit order.
    pub fn iter(&self) -> impl Iterator<Item = &Fact> + '_ {
        self.facts.iter()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn clear(&mut self) {
        self.facts.clear();
        self.seq.clear();
        self.by_node.clear();
        self.by_arg.clear();
        self.by_relation.clear();
        self.by_head.clear();
    }

    fn seqs<'a>(&'a self, seqs: &'a [Seq]) -> impl Iterator<Item = &'a Fact> + 'a {
        seqs.iter().map(move |s| &self.facts[*s as usize])
    }
}

/// Intersect ascending sequence lists by merging. Stops as soon as any list
/// is empty.
pub fn intersect_seqs(lists: &[&[Seq]]) -> Vec<Seq> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    let mut acc: Vec<Seq> = first.to_vec();
    for list in rest {
        if acc.is_empty() {
            break;
        }
        let mut out = Vec::with_capacity(acc.len().min(list.len()));
        let (mut i, mut j) = (0, 0);
        while i < acc.len() && j < list.len() {
            match acc[i].cmp(&list[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    out.push(acc[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        acc = out;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UbertsError;
    use crate::node::Value;
    use crate::schema::Schema;

    fn setup() -> (Schema, RelationId) {
        let s = Schema::new();
        let rel = s.define_relation_by_names("edge", &["v", "v"]).unwrap();
        (s, rel)
    }

    fn edge(s: &Schema, a: i64, b: i64) -> Fact {
        s.fact_from_values("edge", &[Value::Int(a), Value::Int(b)]).unwrap()
    }

    #[test]
    fn commit_rejects_duplicates() {
        let (s, _) = setup();
        let mut st = State::new();
        st.commit(edge(&s, 1, 2)).unwrap();
        let err = st.commit(edge(&s, 1, 2)).unwrap_err();
        assert!(matches!(err, UbertsError::State(StateError::DuplicateFact { .. })));
        assert_eq!(st.len(), 1);
    }

    #[test]
    fn match_is_chronological() {
        let (s, rel) = setup();
        let mut st = State::new();
        st.commit(edge(&s, 1, 3)).unwrap();
        st.commit(edge(&s, 2, 3)).unwrap();
        st.commit(edge(&s, 1, 4)).unwrap();
        st.commit(edge(&s, 0, 3)).unwrap();

        let v = s.node_type("v").unwrap();
        let three = s.lookup_node(v, &Value::Int(3)).unwrap();
        let got: Vec<String> = st
            .matching(ArgPos::Tail(1), rel, three)
            .map(|f| s.display_fact(f))
            .collect();
        assert_eq!(got, vec!["edge(1, 3)", "edge(2, 3)", "edge(0, 3)"]);
        assert_eq!(st.count_matching(ArgPos::Tail(0), rel, three), 0);
    }

    #[test]
    fn adjacency_covers_every_position() {
        let (s, _) = setup();
        let mut st = State::new();
        st.commit(edge(&s, 1, 2)).unwrap();
        st.commit(edge(&s, 2, 3)).unwrap();
        st.commit(edge(&s, 4, 5)).unwrap();
        let v = s.node_type("v").unwrap();
        let two = s.lookup_node(v, &Value::Int(2)).unwrap();
        assert_eq!(st.adjacent(two).count(), 2);
    }

    #[test]
    fn self_loop_is_adjacent_once() {
        let (s, _) = setup();
        let mut st = State::new();
        st.commit(edge(&s, 7, 7)).unwrap();
        let v = s.node_type("v").unwrap();
        let seven = s.lookup_node(v, &Value::Int(7)).unwrap();
        assert_eq!(st.adjacent(seven).count(), 1);
    }

    #[test]
    fn fact_for_head_recovers_witness() {
        let (s, _) = setup();
        let mut st = State::new();
        let f = edge(&s, 1, 2);
        st.commit(f.clone()).unwrap();
        assert_eq!(st.fact_for_head(f.head()), Some(&f));
    }

    #[test]
    fn intersect_merges_sorted_lists() {
        assert_eq!(intersect_seqs(&[&[1, 3, 5, 7], &[3, 4, 7], &[0, 7]]), vec![7]);
        assert!(intersect_seqs(&[&[1, 2], &[]]).is_empty());
        assert!(intersect_seqs(&[]).is_empty());
        assert_eq!(intersect_seqs(&[&[4, 9]]), vec![4, 9]);
    }

    #[test]
    fn clear_forgets_everything() {
        let (s, rel) = setup();
        let mut st = State::new();
        let f = edge(&s, 1, 2);
        st.commit(f.clone()).unwrap();
        st.clear();
        assert!(st.is_empty());
        assert!(!st.contains(&f));
        assert_eq!(st.relation_facts(rel).count(), 0);
        st.commit(f).unwrap();
    }
}
