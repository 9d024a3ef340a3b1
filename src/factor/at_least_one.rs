//! At least one fact per group key.
//!
//! For each key not yet satisfied by a committed fact, the factor tracks the
//! pending fact with the best raw score (everything but its own term). When
//! that best score is not positive, the fact is boosted just above zero, so a
//! positive-score decision policy still commits the argmax.
//!
//! The holder is settled again whenever a fact of the key gets a new score,
//! from the engine or from another factor, and whenever the holder leaves the
//! agenda. Settling moves the boost to the current best fact and sizes it
//! from that fact's current raw score.

use std::collections::HashMap;

use super::{FactorContext, GlobalFactor, GroupKey};
use crate::error::UbertsResult;
use crate::fact::{Fact, RelationId};
use crate::node::NodeId;
use crate::score::Adjoints;

pub const AT_LEAST_ONE_TERM: &str = "at_least_one";

/// Margin by which a boosted score clears zero.
const MARGIN: f64 = 1e-8;

#[derive(Debug)]
pub struct AtLeastOne {
    key: GroupKey,
    holders: HashMap<Vec<NodeId>, Fact>,
}

impl AtLeastOne {
    pub fn new(key: GroupKey) -> Self {
        Self {
            key,
            holders: HashMap::new(),
        }
    }

    /// The fact currently holding the key's boost or best score.
    pub fn holder(&self, key: &[NodeId]) -> Option<&Fact> {
        self.holders.get(key)
    }

    fn boost_of(score: &Adjoints) -> Option<f64> {
        score.term(AT_LEAST_ONE_TERM).map(Adjoints::forward)
    }

    fn raw(score: &Adjoints) -> f64 {
        score.forward() - Self::boost_of(score).unwrap_or(0.0)
    }

    /// Give a pending fact the boost `boost`, or none. The agenda is only
    /// touched when the boost changes.
    fn set_boost(fact: &Fact, boost: Option<f64>, ctx: &mut FactorContext<'_>) -> UbertsResult<()> {
        let Some(score) = ctx.agenda.score_of(fact) else {
            return Ok(());
        };
        let unchanged = match (Self::boost_of(score), boost) {
            (None, None) => true,
            (Some(old), Some(new)) => old == new,
            _ => false,
        };
        if unchanged {
            return Ok(());
        }
        let score = ctx.agenda.remove(fact)?.without_term(AT_LEAST_ONE_TERM);
        let score = match boost {
            Some(b) => score.with_term(AT_LEAST_ONE_TERM, Adjoints::Constant(b)),
            None => score,
        };
        ctx.push(fact.clone(), score)
    }

    /// Hand the key to its best pending fact and size that fact's boost.
    fn settle(&mut self, key: Vec<NodeId>, ctx: &mut FactorContext<'_>) -> UbertsResult<()> {
        let current = self.holders.remove(&key);
        if self.key.committed(&key, ctx.state) > 0 {
            if let Some(old) = &current {
                Self::set_boost(old, None, ctx)?;
            }
            return Ok(());
        }

        // The current holder keeps the key on ties; otherwise ties go to the
        // smaller fact so replays agree.
        let mut best: Option<(Fact, f64)> = current
            .as_ref()
            .and_then(|f| ctx.agenda.score_of(f).map(|s| (f.clone(), Self::raw(s))));
        for fact in self.key.pending(&key, ctx.agenda) {
            let Some(score) = ctx.agenda.score_of(&fact) else {
                continue;
            };
            let raw = Self::raw(score);
            let better = match &best {
                None => true,
                Some((b, braw)) => {
                    raw > *braw
                        || (raw == *braw
                            && current.as_ref() != Some(b)
                            && ctx.schema.fact_key(&fact) < ctx.schema.fact_key(b))
                }
            };
            if better {
                best = Some((fact, raw));
            }
        }

        if let Some(old) = &current
            && best.as_ref().is_none_or(|(f, _)| f != old)
        {
            Self::set_boost(old, None, ctx)?;
        }
        let Some((fact, raw)) = best else {
            return Ok(());
        };
        let boost = (raw <= 0.0).then(|| -raw + MARGIN);
        if boost.is_some() {
            tracing::trace!(fact = %ctx.schema.display_fact(&fact), raw, "boosted above zero");
        }
        Self::set_boost(&fact, boost, ctx)?;
        self.holders.insert(key, fact);
        Ok(())
    }
}

impl GlobalFactor for AtLeastOne {
    fn name(&self) -> &str {
        "at_least_one"
    }

    fn owned_term(&self) -> Option<(RelationId, &str)> {
        Some((self.key.relation, AT_LEAST_ONE_TERM))
    }

    fn on_rescored(&mut self, fact: &Fact, ctx: &mut FactorContext<'_>) -> UbertsResult<()> {
        match self.key.key_of(fact) {
            Some(key) if ctx.agenda.contains(fact) => self.settle(key, ctx),
            _ => Ok(()),
        }
    }

    fn on_commit(&mut self, fact: &Fact, ctx: &mut FactorContext<'_>) -> UbertsResult<()> {
        match self.key.key_of(fact) {
            Some(key) => self.settle(key, ctx),
            None => Ok(()),
        }
    }

    fn on_retract(&mut self, fact: &Fact, ctx: &mut FactorContext<'_>) -> UbertsResult<()> {
        let Some(key) = self.key.key_of(fact) else {
            return Ok(());
        };
        if self.holders.get(&key) == Some(fact) {
            self.settle(key, ctx)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.holders.clear();
    }
}
