//! At most one fact per group key.

use super::{FactorContext, GlobalFactor, GroupKey};
use crate::error::UbertsResult;
use crate::fact::Fact;
use crate::score::Adjoints;

/// Once a fact with some key is committed, every other pending fact with
/// that key is retracted, and later candidates with that key are dropped.
///
/// Works the same whether it is registered on its own or attached to a rule.
#[derive(Debug)]
pub struct AtMostOne {
    name: String,
    key: GroupKey,
}

impl AtMostOne {
    pub fn new(key: GroupKey) -> Self {
        Self {
            name: "at_most_one".to_string(),
            key,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl GlobalFactor for AtMostOne {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_commit(&mut self, fact: &Fact, ctx: &mut FactorContext<'_>) -> UbertsResult<()> {
        let Some(key) = self.key.key_of(fact) else {
            return Ok(());
        };
        let losers = self.key.pending(&key, ctx.agenda);
        for loser in &losers {
            ctx.retract(loser)?;
        }
        if !losers.is_empty() {
            tracing::debug!(
                factor = %self.name,
                winner = %ctx.schema.display_fact(fact),
                retracted = losers.len(),
                "retracted competitors"
            );
        }
        Ok(())
    }

    fn on_push(&mut self, fact: &Fact, score: Adjoints, ctx: &mut FactorContext<'_>) -> UbertsResult<Option<Adjoints>> {
        match self.key.key_of(fact) {
            Some(key) if self.key.committed(&key, ctx.state) > 0 => Ok(None),
            _ => Ok(Some(score)),
        }
    }
}
