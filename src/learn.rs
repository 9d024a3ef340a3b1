//! Perceptron updates from a labelled run.
//!
//! A run is compared against a gold set of facts. Committed facts outside
//! the gold set were scored too high, so their scores get `backward(+1)`;
//! gold facts the decision policy pruned were scored too low and get
//! `backward(-1)`. The result is a [`Gradient`] that the caller applies to
//! its weight tables, possibly after merging it with other documents'.

use std::collections::HashSet;

use crate::engine::RunResult;
use crate::fact::Fact;
use crate::score::Gradient;

/// Counts of one labelled run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub true_positives: usize,
    pub false_positives: usize,
    /// Gold facts that were not committed, pruned or never proposed.
    pub false_negatives: usize,
    /// Gold facts the decision policy pruned; these carry a gradient.
    pub pruned_gold: usize,
}

impl UpdateStats {
    pub fn merge(&mut self, other: UpdateStats) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
        self.pruned_gold += other.pruned_gold;
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Gradient of the perceptron loss for one run.
pub fn perceptron_update(result: &RunResult, gold: &HashSet<Fact>) -> (Gradient, UpdateStats) {
    let mut gradient = Gradient::new();
    let mut stats = UpdateStats::default();
    for (fact, score) in &result.committed {
        if gold.contains(fact) {
            stats.true_positives += 1;
        } else {
            stats.false_positives += 1;
            score.backward(1.0, &mut gradient);
        }
    }
    for (fact, score) in &result.pruned {
        if gold.contains(fact) {
            stats.pruned_gold += 1;
            score.backward(-1.0, &mut gradient);
        }
    }
    stats.false_negatives = gold.len().saturating_sub(stats.true_positives);
    tracing::debug!(
        tp = stats.true_positives,
        fp = stats.false_positives,
        fn_ = stats.false_negatives,
        entries = gradient.len(),
        "perceptron update"
    );
    (gradient, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UbertsConfig;
    use crate::decision::DecisionPolicy;
    use crate::engine::Uberts;
    use crate::node::Value;
    use crate::score::{Features, FeatureFactor, RelationArgFeatures, WeightTable};
    use crate::transition::RuleGenerator;
    use std::sync::Arc;

    /// `word(i, w) => tag(i, w)` scored by a learned table, committing
    /// positive scores only.
    fn tagger(table: &Arc<WeightTable>) -> Uberts {
        let mut u = Uberts::new(UbertsConfig {
            decision: DecisionPolicy::positive(),
            ..Default::default()
        });
        u.define_relation("word", &["i", "w"]).unwrap();
        u.define_relation("tag", &["i", "w"]).unwrap();
        let r = u.add_rule_text("word(i, w) => tag(i, w)").unwrap();
        let factor = FeatureFactor::new(Arc::new(RelationArgFeatures::new()), Arc::clone(table));
        u.add_generator(r, RuleGenerator::new("tag", Arc::new(factor))).unwrap();
        u
    }

    #[test]
    fn pruned_gold_moves_weights_up() {
        let table = Arc::new(WeightTable::new("tag", 1 << 16));
        let mut u = tagger(&table);
        let w = u.fact("word", &[Value::Int(0), Value::str("dog")]).unwrap();
        u.commit_initial_fact(w).unwrap();
        let gold: HashSet<Fact> = [u.fact("tag", &[Value::Int(0), Value::str("dog")]).unwrap()].into();

        let result = u.run().unwrap();
        assert!(result.committed.is_empty());
        let (gradient, stats) = perceptron_update(&result, &gold);
        assert_eq!(stats.pruned_gold, 1);
        assert_eq!(stats.false_negatives, 1);
        table.apply(&gradient, 1.0);
        assert_eq!(table.weight(Features::index_of("tag")), 1.0);

        u.reset();
        let w = u.fact("word", &[Value::Int(0), Value::str("dog")]).unwrap();
        u.commit_initial_fact(w).unwrap();
        let result = u.run().unwrap();
        let (gradient, stats) = perceptron_update(&result, &gold);
        assert_eq!(stats.true_positives, 1);
        assert!(gradient.is_empty());
        assert_eq!(stats.f1(), 1.0);
    }

    #[test]
    fn committed_non_gold_moves_weights_down() {
        let table = Arc::new(WeightTable::new("tag", 1 << 16));
        let mut g = Gradient::new();
        g.add(table.id(), Features::index_of("tag"), 1.0);
        table.apply(&g, 1.0);

        let mut u = tagger(&table);
        let w = u.fact("word", &[Value::Int(0), Value::str("dog")]).unwrap();
        u.commit_initial_fact(w).unwrap();
        let result = u.run().unwrap();
        assert_eq!(result.committed.len(), 1);

        let (gradient, stats) = perceptron_update(&result, &HashSet::new());
        assert_eq!(stats.false_positives, 1);
        assert_eq!(stats.precision(), 0.0);
        table.apply(&gradient, 1.0);
        assert_eq!(table.weight(Features::index_of("tag")), 0.0);
    }
}
