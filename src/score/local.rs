//! Local factors: the score a transition assigns to a fresh candidate.

use std::fmt;
use std::sync::Arc;

use super::adjoints::Adjoints;
use super::features::FeatureExtractor;
use super::weights::WeightTable;
use crate::error::{RunError, UbertsResult};
use crate::fact::Fact;
use crate::schema::Schema;
use crate::state::State;

/// Scores a candidate fact. Returning `None` prunes the candidate before it
/// reaches the agenda.
pub trait LocalFactor: Send + Sync {
    fn score(&self, fact: &Fact, state: &State, schema: &Schema) -> UbertsResult<Option<Adjoints>>;
}

impl<F> LocalFactor for F
where
    F: Fn(&Fact, &State, &Schema) -> UbertsResult<Option<Adjoints>> + Send + Sync,
{
    fn score(&self, fact: &Fact, state: &State, schema: &Schema) -> UbertsResult<Option<Adjoints>> {
        self(fact, state, schema)
    }
}

/// The same score for every candidate.
#[derive(Debug, Clone, Copy)]
pub struct ConstantFactor(pub f64);

impl LocalFactor for ConstantFactor {
    fn score(&self, _fact: &Fact, _state: &State, _schema: &Schema) -> UbertsResult<Option<Adjoints>> {
        Ok(Some(Adjoints::Constant(self.0)))
    }
}

/// `features(fact) · weights`.
pub struct FeatureFactor {
    extractor: Arc<dyn FeatureExtractor>,
    table: Arc<WeightTable>,
}

impl FeatureFactor {
    pub fn new(extractor: Arc<dyn FeatureExtractor>, table: Arc<WeightTable>) -> Self {
        Self { extractor, table }
    }

    pub fn table(&self) -> &Arc<WeightTable> {
        &self.table
    }
}

impl LocalFactor for FeatureFactor {
    fn score(&self, fact: &Fact, state: &State, schema: &Schema) -> UbertsResult<Option<Adjoints>> {
        let features = self
            .extractor
            .features(fact, state, schema)
            .map_err(|e| RunError::Features {
                fact: schema.display_fact(fact),
                message: e.to_string(),
            })?;
        Ok(Some(Adjoints::linear(Arc::clone(&self.table), features)))
    }
}

impl fmt::Debug for FeatureFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureFactor")
            .field("table", &self.table)
            .finish()
    }
}
