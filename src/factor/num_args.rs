//! Counting factor: score pending facts by how many siblings are committed.

use std::sync::Arc;

use super::{FactorContext, GlobalFactor, GroupKey};
use crate::error::UbertsResult;
use crate::fact::{ArgPos, Fact, RelationId};
use crate::node::NodeId;
use crate::rule::Match;
use crate::score::{Adjoints, Features, WeightTable};

pub const NUM_ARGS_TERM: &str = "num_args";

/// Adds a learned term `w · φ(min(cap, committed siblings))` to every pending
/// fact of a keyed relation, optionally conjoined with the value at a
/// refinement position (e.g. the role of an argument).
#[derive(Debug)]
pub struct NumArgs {
    key: GroupKey,
    refinement: Option<usize>,
    table: Arc<WeightTable>,
    cap: usize,
}

impl NumArgs {
    pub fn new(key: GroupKey, table: Arc<WeightTable>, cap: usize) -> Self {
        Self {
            key,
            refinement: None,
            table,
            cap,
        }
    }

    pub fn with_refinement(mut self, position: usize) -> Self {
        self.refinement = Some(position);
        self
    }

    fn count(&self, key: &[NodeId], ctx: &FactorContext<'_>) -> usize {
        self.key.committed(key, ctx.state).min(self.cap)
    }

    fn term(&self, fact: &Fact, count: usize, ctx: &FactorContext<'_>) -> Adjoints {
        let rel = ctx.schema.relation_name(fact.relation());
        let mut features = Features::new();
        features.push(&format!("{NUM_ARGS_TERM}/{rel}/{count}"));
        if let Some(node) = self.refinement.and_then(|p| fact.arg(ArgPos::Tail(p))) {
            let value = ctx.schema.node_value(node);
            features.push(&format!("{NUM_ARGS_TERM}/{rel}/{count}/{value}"));
        }
        Adjoints::linear(Arc::clone(&self.table), features)
    }
}

impl GlobalFactor for NumArgs {
    fn name(&self) -> &str {
        NUM_ARGS_TERM
    }

    fn owned_term(&self) -> Option<(RelationId, &str)> {
        Some((self.key.relation, NUM_ARGS_TERM))
    }

    fn rescore(&mut self, m: &Match, ctx: &mut FactorContext<'_>) -> UbertsResult<()> {
        for fact in m.facts() {
            let Some(key) = self.key.key_of(fact) else {
                continue;
            };
            let count = self.count(&key, ctx);
            for sibling in self.key.pending(&key, ctx.agenda) {
                let old = ctx.agenda.remove(&sibling)?;
                let term = self.term(&sibling, count, ctx);
                ctx.push(sibling, old.with_term(NUM_ARGS_TERM, term))?;
            }
        }
        Ok(())
    }

    fn on_push(&mut self, fact: &Fact, score: Adjoints, ctx: &mut FactorContext<'_>) -> UbertsResult<Option<Adjoints>> {
        let Some(key) = self.key.key_of(fact) else {
            return Ok(Some(score));
        };
        let count = self.count(&key, ctx);
        let term = self.term(fact, count, ctx);
        Ok(Some(score.with_term(NUM_ARGS_TERM, term)))
    }
}
