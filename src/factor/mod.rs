//! Global factors: rescoring operators that look past a single candidate.
//!
//! A global factor is registered on the engine, optionally attached to a
//! rule. It sees:
//! - every match of its rule, through [`GlobalFactor::rescore`];
//! - every candidate about to enter the agenda, through
//!   [`GlobalFactor::on_push`], which may change its score or drop it;
//! - every fact leaving the agenda, through [`GlobalFactor::on_commit`] and
//!   [`GlobalFactor::on_retract`];
//! - every fact whose score was set or replaced by someone else, through
//!   [`GlobalFactor::on_rescored`].
//!
//! Factors change the score of a pending fact by removing it from the agenda
//! and pushing it again with [`FactorContext::push`], which records the fact
//! so the other factors hear about the new score. They layer their contribution as a named term of a
//! composite score; each `(relation, term)` pair may be owned by one factor
//! only, which the engine enforces at registration.

pub mod at_least_one;
pub mod at_most_one;
pub mod num_args;

use crate::agenda::Agenda;
use crate::error::{RuleError, UbertsResult};
use crate::fact::{ArgPos, Fact, RelationId};
use crate::node::NodeId;
use crate::rule::{Match, Term, TermArg};
use crate::schema::Schema;
use crate::score::Adjoints;
use crate::state::State;

pub use at_least_one::{AT_LEAST_ONE_TERM, AtLeastOne};
pub use at_most_one::AtMostOne;
pub use num_args::{NUM_ARGS_TERM, NumArgs};

/// What a factor may touch while it runs.
pub struct FactorContext<'a> {
    pub schema: &'a Schema,
    pub state: &'a State,
    pub agenda: &'a mut Agenda,
    retracted: Vec<Fact>,
    rescored: Vec<Fact>,
}

impl<'a> FactorContext<'a> {
    pub fn new(schema: &'a Schema, state: &'a State, agenda: &'a mut Agenda) -> Self {
        Self {
            schema,
            state,
            agenda,
            retracted: Vec::new(),
            rescored: Vec::new(),
        }
    }

    /// Drop a pending fact for good. Other factors hear about it through
    /// `on_retract` once the current call returns.
    pub fn retract(&mut self, fact: &Fact) -> UbertsResult<Adjoints> {
        let score = self.agenda.remove(fact)?;
        self.retracted.push(fact.clone());
        Ok(score)
    }

    pub fn take_retracted(&mut self) -> Vec<Fact> {
        std::mem::take(&mut self.retracted)
    }

    /// Push a fact back with a new score, after removing it. Other factors
    /// hear about it through `on_rescored` once the current call returns.
    pub fn push(&mut self, fact: Fact, score: Adjoints) -> UbertsResult<()> {
        self.agenda.push(fact.clone(), score)?;
        self.rescored.push(fact);
        Ok(())
    }

    pub fn take_rescored(&mut self) -> Vec<Fact> {
        std::mem::take(&mut self.rescored)
    }
}

pub trait GlobalFactor: Send {
    fn name(&self) -> &str;

    /// The named score term this factor writes, and the relation it writes
    /// it on.
    fn owned_term(&self) -> Option<(RelationId, &str)> {
        None
    }

    /// Called for every match of the rule this factor is attached to.
    fn rescore(&mut self, _m: &Match, _ctx: &mut FactorContext<'_>) -> UbertsResult<()> {
        Ok(())
    }

    /// Called before a candidate is pushed. `None` drops the candidate.
    fn on_push(&mut self, _fact: &Fact, score: Adjoints, _ctx: &mut FactorContext<'_>) -> UbertsResult<Option<Adjoints>> {
        Ok(Some(score))
    }

    /// Called after a popped fact has been committed.
    fn on_commit(&mut self, _fact: &Fact, _ctx: &mut FactorContext<'_>) -> UbertsResult<()> {
        Ok(())
    }

    /// Called after a fact left the agenda without being committed.
    fn on_retract(&mut self, _fact: &Fact, _ctx: &mut FactorContext<'_>) -> UbertsResult<()> {
        Ok(())
    }

    /// Called after a pending fact's score was set by the engine or replaced
    /// by another factor. The fact may have left the agenda since.
    fn on_rescored(&mut self, _fact: &Fact, _ctx: &mut FactorContext<'_>) -> UbertsResult<()> {
        Ok(())
    }

    /// Forget per-run state.
    fn reset(&mut self) {}
}

// ---------------------------------------------------------------------------
// Group keys
// ---------------------------------------------------------------------------

/// The facts of one relation grouped by the nodes at some tail positions,
/// e.g. all `argument(t, ·, ·, ·)` facts for one `t`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKey {
    pub relation: RelationId,
    pub positions: Vec<usize>,
}

impl GroupKey {
    pub fn new(relation: RelationId, positions: Vec<usize>) -> Self {
        Self {
            relation,
            positions,
        }
    }

    /// Parse `rel(a, b, c):a[:b...]`: the key is the listed variables.
    pub fn parse(description: &str, schema: &Schema) -> UbertsResult<Self> {
        let err = |message: String| RuleError::Parse {
            input: description.to_string(),
            message,
        };
        let mut parts = description.split(':');
        let term_text = parts.next().unwrap_or_default();
        let term = Term::parse(term_text)?;
        let relation = schema.relation_by_name(&term.relation)?;
        if term.args.len() != relation.arity() {
            return Err(RuleError::TermArity {
                term: term.to_string(),
                relation: term.relation.clone(),
                expected: relation.arity(),
                actual: term.args.len(),
            }
            .into());
        }
        let mut positions = Vec::new();
        for var in parts {
            let var = var.trim();
            let pos = term
                .args
                .iter()
                .position(|a| matches!(a, TermArg::Var(v) if v == var))
                .ok_or_else(|| err(format!("no argument named '{var}' in {term}")))?;
            if positions.contains(&pos) {
                return Err(err(format!("key variable '{var}' listed twice")).into());
            }
            positions.push(pos);
        }
        if positions.is_empty() {
            return Err(err("expected at least one ':var' key".to_string()).into());
        }
        Ok(Self::new(relation.id, positions))
    }

    /// The key of `fact`, or `None` for facts of other relations.
    pub fn key_of(&self, fact: &Fact) -> Option<Vec<NodeId>> {
        if fact.relation() != self.relation {
            return None;
        }
        self.positions
            .iter()
            .map(|p| fact.arg(ArgPos::Tail(*p)))
            .collect()
    }

    /// Pending facts with this key, in fact order.
    pub fn pending(&self, key: &[NodeId], agenda: &Agenda) -> Vec<Fact> {
        match (self.positions.first(), key.first()) {
            (Some(&p), Some(&n)) => agenda
                .matching(ArgPos::Tail(p), self.relation, n)
                .filter(|f| self.key_of(f).as_deref() == Some(key))
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Number of committed facts with this key.
    pub fn committed(&self, key: &[NodeId], state: &State) -> usize {
        match (self.positions.first(), key.first()) {
            (Some(&p), Some(&n)) => state
                .matching(ArgPos::Tail(p), self.relation, n)
                .filter(|f| self.key_of(f).as_deref() == Some(key))
                .count(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Value;
    use std::sync::Arc;

    #[test]
    fn parse_group_key() {
        let s = Schema::new();
        s.define_relation_by_names("argument", &["t", "f", "s", "k"]).unwrap();
        let g = GroupKey::parse("argument(t,f,s,k):t:k", &s).unwrap();
        assert_eq!(g.positions, vec![0, 3]);
        assert!(GroupKey::parse("argument(t,f,s,k)", &s).is_err());
        assert!(GroupKey::parse("argument(t,f,s,k):x", &s).is_err());
        assert!(GroupKey::parse("argument(t,f):t", &s).is_err());
    }

    #[test]
    fn pending_and_committed_filter_on_the_full_key() {
        let s = Arc::new(Schema::new());
        s.define_relation_by_names("pair", &["a", "b", "c"]).unwrap();
        let g = GroupKey::parse("pair(x, y, z):x:y", &s).unwrap();
        let f = |a: i64, b: i64, c: i64| {
            s.fact_from_values("pair", &[Value::Int(a), Value::Int(b), Value::Int(c)])
                .unwrap()
        };
        let mut agenda = Agenda::new(Arc::clone(&s));
        agenda.push(f(1, 1, 0), Adjoints::constant(0.0)).unwrap();
        agenda.push(f(1, 1, 1), Adjoints::constant(0.0)).unwrap();
        agenda.push(f(1, 2, 0), Adjoints::constant(0.0)).unwrap();
        let key = g.key_of(&f(1, 1, 9)).unwrap();
        assert_eq!(g.pending(&key, &agenda).len(), 2);

        let mut state = State::new();
        state.commit(f(1, 1, 5)).unwrap();
        state.commit(f(1, 2, 5)).unwrap();
        assert_eq!(g.committed(&key, &state), 1);
    }
}
