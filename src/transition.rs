//! Transition generators: turn a completed match into scored candidates.
//!
//! Generators only read the state. The driver pushes what they return,
//! silently dropping candidates already committed or already pending.

use std::fmt;
use std::sync::Arc;

use crate::error::UbertsResult;
use crate::fact::Fact;
use crate::rule::Match;
use crate::schema::Schema;
use crate::score::{Adjoints, ConstantFactor, LocalFactor};
use crate::state::State;

pub trait TransitionGenerator: Send + Sync {
    fn name(&self) -> &str {
        "generator"
    }

    fn generate(&self, m: &Match, state: &State, schema: &Schema) -> UbertsResult<Vec<(Fact, Adjoints)>>;
}

impl<F> TransitionGenerator for F
where
    F: Fn(&Match, &State, &Schema) -> UbertsResult<Vec<(Fact, Adjoints)>> + Send + Sync,
{
    fn generate(&self, m: &Match, state: &State, schema: &Schema) -> UbertsResult<Vec<(Fact, Adjoints)>> {
        self(m, state, schema)
    }
}

/// Instantiates the rule's right-hand side and scores it with a local factor.
pub struct RuleGenerator {
    name: String,
    factor: Arc<dyn LocalFactor>,
}

impl RuleGenerator {
    pub fn new(name: impl Into<String>, factor: Arc<dyn LocalFactor>) -> Self {
        Self {
            name: name.into(),
            factor,
        }
    }

    /// Every instantiation gets the same fixed score.
    pub fn constant(name: impl Into<String>, score: f64) -> Self {
        Self::new(name, Arc::new(ConstantFactor(score)))
    }
}

impl TransitionGenerator for RuleGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, m: &Match, state: &State, schema: &Schema) -> UbertsResult<Vec<(Fact, Adjoints)>> {
        let Some(fact) = m.rule().instantiate(m.facts(), schema)? else {
            return Ok(Vec::new());
        };
        match self.factor.score(&fact, state, schema)? {
            Some(score) => Ok(vec![(fact, score)]),
            None => Ok(Vec::new()),
        }
    }
}

impl fmt::Debug for RuleGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleGenerator").field("name", &self.name).finish()
    }
}
