//! Sparse feature vectors and the feature extraction interface.

use std::hash::{DefaultHasher, Hash, Hasher};

use crate::error::UbertsResult;
use crate::fact::Fact;
use crate::schema::Schema;
use crate::state::State;

/// Sparse feature vector of `(hashed index, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Features {
    entries: Vec<(u64, f64)>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a feature name to its index.
    pub fn index_of(name: &str) -> u64 {
        let mut h = DefaultHasher::new();
        name.hash(&mut h);
        h.finish()
    }

    /// Add a binary feature by name.
    pub fn push(&mut self, name: &str) {
        self.entries.push((Self::index_of(name), 1.0));
    }

    pub fn push_value(&mut self, name: &str, value: f64) {
        self.entries.push((Self::index_of(name), value));
    }

    pub fn push_index(&mut self, index: u64, value: f64) {
        self.entries.push((index, value));
    }

    /// Product features: each of `names` joined with `suffix`.
    pub fn conjoin(names: &[String], suffix: &str) -> Features {
        let mut out = Features::new();
        for n in names {
            out.push(&format!("{n}/{suffix}"));
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(u64, f64)> for Features {
    fn from_iter<I: IntoIterator<Item = (u64, f64)>>(iter: I) -> Self {
        Features {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Computes features for a candidate fact given the committed state.
///
/// Implementations are external collaborators (linguistic feature templates
/// and the like); failures abort the run that requested them.
pub trait FeatureExtractor: Send + Sync {
    fn features(&self, fact: &Fact, state: &State, schema: &Schema) -> UbertsResult<Features>;
}

impl<F> FeatureExtractor for F
where
    F: Fn(&Fact, &State, &Schema) -> UbertsResult<Features> + Send + Sync,
{
    fn features(&self, fact: &Fact, state: &State, schema: &Schema) -> UbertsResult<Features> {
        self(fact, state, schema)
    }
}

/// Generic extractor: a per-relation bias plus one indicator per
/// `(relation, position, value)`, optionally with all argument pairs.
#[derive(Debug, Clone, Default)]
pub struct RelationArgFeatures {
    pub pairs: bool,
}

impl RelationArgFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pairs() -> Self {
        Self { pairs: true }
    }

    /// Feature names, before hashing.
    pub fn names(&self, fact: &Fact, schema: &Schema) -> Vec<String> {
        let rel = schema.relation_name(fact.relation());
        let values: Vec<String> = fact
            .tail()
            .iter()
            .map(|n| schema.node_value(*n).to_string())
            .collect();
        let mut names = Vec::with_capacity(1 + values.len());
        names.push(format!("{rel}"));
        for (i, v) in values.iter().enumerate() {
            names.push(format!("{rel}/{i}={v}"));
        }
        if self.pairs {
            for i in 0..values.len() {
                for j in (i + 1)..values.len() {
                    names.push(format!("{rel}/{i}={}/{j}={}", values[i], values[j]));
                }
            }
        }
        names
    }
}

impl FeatureExtractor for RelationArgFeatures {
    fn features(&self, fact: &Fact, _state: &State, schema: &Schema) -> UbertsResult<Features> {
        let mut f = Features::new();
        for name in self.names(fact, schema) {
            f.push(&name);
        }
        Ok(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Value;

    #[test]
    fn hashing_is_stable_within_a_process() {
        assert_eq!(Features::index_of("pos/0=3"), Features::index_of("pos/0=3"));
        assert_ne!(Features::index_of("pos/0=3"), Features::index_of("pos/0=4"));
    }

    #[test]
    fn relation_arg_features_names() {
        let s = Schema::new();
        s.define_relation_by_names("pos", &["tokenIndex", "tag"]).unwrap();
        let f = s.fact_from_values("pos", &[Value::Int(3), Value::str("NN")]).unwrap();
        let names = RelationArgFeatures::with_pairs().names(&f, &s);
        assert_eq!(names, vec!["pos", "pos/0=3", "pos/1=NN", "pos/0=3/1=NN"]);
        let feats = RelationArgFeatures::new().features(&f, &State::new(), &s).unwrap();
        assert_eq!(feats.len(), 3);
    }

    #[test]
    fn closures_are_extractors() {
        let s = Schema::new();
        s.define_relation_by_names("r", &["t"]).unwrap();
        let f = s.fact_from_values("r", &[Value::Int(1)]).unwrap();
        let ex = |_: &Fact, _: &State, _: &Schema| -> UbertsResult<Features> {
            let mut f = Features::new();
            f.push_value("bias", 2.0);
            Ok(f)
        };
        let feats = ex.features(&f, &State::new(), &s).unwrap();
        assert_eq!(feats.iter().next().map(|(_, v)| v), Some(2.0));
    }
}
