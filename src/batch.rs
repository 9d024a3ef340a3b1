//! Independent runs over many documents, in parallel.
//!
//! Each document is decoded by its own engine, built by a caller-supplied
//! factory. Engines share only what the factory gives them, typically an
//! `Arc<Schema>` and `Arc<WeightTable>`s, which are read-only while decoding.
//! Training keeps weight updates out of the parallel section: every worker
//! returns its own [`Gradient`], the gradients are merged, and the merged
//! delta is applied once.

use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;

use crate::engine::{RunResult, Uberts};
use crate::error::UbertsResult;
use crate::fact::Fact;
use crate::learn::{UpdateStats, perceptron_update};
use crate::score::{Gradient, WeightTable};

/// Input facts of one document and, for training, its gold facts.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub name: String,
    pub facts: Vec<Fact>,
    pub gold: HashSet<Fact>,
}

impl Document {
    pub fn new(name: impl Into<String>, facts: Vec<Fact>) -> Self {
        Self {
            name: name.into(),
            facts,
            gold: HashSet::new(),
        }
    }

    pub fn with_gold(mut self, gold: impl IntoIterator<Item = Fact>) -> Self {
        self.gold = gold.into_iter().collect();
        self
    }
}

#[derive(Debug, Clone)]
pub struct Decoded {
    pub name: String,
    pub result: RunResult,
    /// The final state, as [`Uberts::dump_state`] prints it.
    pub state: String,
}

/// Summary of one training epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochStats {
    pub documents: usize,
    pub stats: UpdateStats,
    /// Weight slots touched by the merged update, over all tables.
    pub touched: usize,
}

fn decode<F>(doc: &Document, factory: &F) -> UbertsResult<Uberts>
where
    F: Fn() -> UbertsResult<Uberts>,
{
    let mut engine = factory()?;
    for fact in &doc.facts {
        engine.commit_initial_fact(fact.clone())?;
    }
    Ok(engine)
}

/// Decode every document on its own engine. Results come back in input
/// order; the first error aborts the batch.
pub fn decode_all<F>(docs: &[Document], factory: F) -> UbertsResult<Vec<Decoded>>
where
    F: Fn() -> UbertsResult<Uberts> + Sync,
{
    tracing::info!(documents = docs.len(), "decoding batch");
    docs.par_iter()
        .map(|doc| {
            let mut engine = decode(doc, &factory)?;
            let result = engine.run()?;
            Ok(Decoded {
                name: doc.name.clone(),
                result,
                state: engine.dump_state(),
            })
        })
        .collect()
}

/// One perceptron epoch: decode all documents in parallel, merge their
/// gradients, then update every table once and record one averaging
/// observation.
pub fn train_epoch<F>(
    docs: &[Document],
    factory: F,
    tables: &[Arc<WeightTable>],
    learning_rate: f64,
) -> UbertsResult<EpochStats>
where
    F: Fn() -> UbertsResult<Uberts> + Sync,
{
    let updates: Vec<(Gradient, UpdateStats)> = docs
        .par_iter()
        .map(|doc| {
            let mut engine = decode(doc, &factory)?;
            let result = engine.run()?;
            Ok(perceptron_update(&result, &doc.gold))
        })
        .collect::<UbertsResult<_>>()?;

    let mut gradient = Gradient::new();
    let mut stats = UpdateStats::default();
    for (g, s) in updates {
        gradient.merge(g);
        stats.merge(s);
    }
    let touched = tables
        .iter()
        .map(|t| {
            let n = t.apply(&gradient, learning_rate);
            t.complete_observation();
            n
        })
        .sum();
    tracing::info!(
        documents = docs.len(),
        f1 = stats.f1(),
        touched,
        "epoch finished"
    );
    Ok(EpochStats {
        documents: docs.len(),
        stats,
        touched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UbertsConfig;
    use crate::decision::DecisionPolicy;
    use crate::node::Value;
    use crate::schema::Schema;
    use crate::score::{FeatureFactor, RelationArgFeatures};
    use crate::transition::RuleGenerator;

    fn schema() -> Arc<Schema> {
        let s = Arc::new(Schema::new());
        s.define_relation_by_names("word", &["i", "w"]).unwrap();
        s.define_relation_by_names("tag", &["i", "w"]).unwrap();
        s
    }

    fn factory(
        schema: &Arc<Schema>,
        table: &Arc<WeightTable>,
    ) -> impl Fn() -> UbertsResult<Uberts> + Sync {
        let schema = Arc::clone(schema);
        let table = Arc::clone(table);
        move || {
            let mut u = Uberts::with_schema(
                Arc::clone(&schema),
                UbertsConfig {
                    decision: DecisionPolicy::positive(),
                    ..Default::default()
                },
            );
            let r = u.add_rule_text("word(i, w) => tag(i, w)")?;
            let factor = FeatureFactor::new(Arc::new(RelationArgFeatures::new()), Arc::clone(&table));
            u.add_generator(r, RuleGenerator::new("tag", Arc::new(factor)))?;
            Ok(u)
        }
    }

    fn doc(s: &Schema, name: &str, words: &[(&str, bool)]) -> Document {
        let mut facts = Vec::new();
        let mut gold = Vec::new();
        for (i, (w, keep)) in words.iter().enumerate() {
            let args = [Value::Int(i as i64), Value::str(*w)];
            facts.push(s.fact_from_values("word", &args).unwrap());
            if *keep {
                gold.push(s.fact_from_values("tag", &args).unwrap());
            }
        }
        Document::new(name, facts).with_gold(gold)
    }

    #[test]
    fn decode_all_keeps_input_order() {
        let s = schema();
        let table = Arc::new(WeightTable::new("tag", 1 << 12));
        let docs: Vec<Document> = (0..8)
            .map(|n| doc(&s, &format!("d{n}"), &[("a", true), ("b", false)]))
            .collect();
        let decoded = decode_all(&docs, factory(&s, &table)).unwrap();
        assert_eq!(decoded.len(), 8);
        for (n, d) in decoded.iter().enumerate() {
            assert_eq!(d.name, format!("d{n}"));
            assert_eq!(d.result.pruned.len(), 2);
            assert!(d.state.contains("word(0, a)"));
        }
    }

    #[test]
    fn training_learns_to_keep_gold_words() {
        let s = schema();
        let table = Arc::new(WeightTable::new("tag", 1 << 16));
        let docs = vec![
            doc(&s, "d0", &[("dog", true), ("the", false)]),
            doc(&s, "d1", &[("the", false), ("cat", true)]),
            doc(&s, "d2", &[("cat", true), ("dog", true)]),
        ];
        let mut last = EpochStats::default();
        for _ in 0..10 {
            last = train_epoch(&docs, factory(&s, &table), &[Arc::clone(&table)], 1.0).unwrap();
        }
        assert_eq!(last.documents, 3);
        assert_eq!(last.stats.false_positives, 0);
        assert_eq!(last.stats.true_positives, 4);

        let decoded = decode_all(&docs, factory(&s, &table)).unwrap();
        assert!(decoded[0].state.contains("tag(0, dog)"));
        assert!(!decoded[0].state.contains("tag(1, the)"));
    }
}
