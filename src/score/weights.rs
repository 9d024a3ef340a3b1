//! Weight tables and sparse gradients.
//!
//! A [`WeightTable`] is an explicit context object: it is passed to the
//! scores that read it and to the trainer that writes it. Reads take a shared
//! lock, writes happen only through [`WeightTable::apply`], which takes the
//! exclusive lock once per gradient. Parallel training accumulates one
//! [`Gradient`] per worker and merges them before a single `apply`.
//!
//! Averaging (for the averaged perceptron) keeps, next to the weights `w`,
//! the sum `u` of every update scaled by the observation count at the time
//! it happened. The average is `w - u / c`, produced on demand by
//! [`WeightTable::average_snapshot`] as a new, frozen table.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use super::features::Features;

static NEXT_TABLE_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identity of a weight table, used to key gradients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeightTableId(u32);

impl WeightTableId {
    fn next() -> Self {
        WeightTableId(NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
struct Weights {
    w: Vec<f64>,
    u: Vec<f64>,
    /// Number of completed observations.
    c: u64,
}

/// Dense, feature-hashed weights with perceptron averaging.
pub struct WeightTable {
    id: WeightTableId,
    name: String,
    dimension: usize,
    inner: RwLock<Weights>,
}

impl WeightTable {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            id: WeightTableId::next(),
            name: name.into(),
            dimension,
            inner: RwLock::new(Weights {
                w: vec![0.0; dimension],
                u: vec![0.0; dimension],
                c: 1,
            }),
        }
    }

    pub fn id(&self) -> WeightTableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Slot a (possibly unbounded) feature index lands in.
    pub fn slot(&self, index: u64) -> usize {
        (index % self.dimension as u64) as usize
    }

    pub fn weight(&self, index: u64) -> f64 {
        let inner = self.inner.read().expect("weight table lock poisoned");
        inner.w[self.slot(index)]
    }

    /// Inner product of `features` with the current weights.
    pub fn dot(&self, features: &Features) -> f64 {
        let inner = self.inner.read().expect("weight table lock poisoned");
        features
            .iter()
            .map(|(i, v)| inner.w[self.slot(i)] * v)
            .sum()
    }

    /// Add `learning_rate * delta` for every entry of `gradient` that belongs
    /// to this table. Entries for other tables are ignored.
    pub fn apply(&self, gradient: &Gradient, learning_rate: f64) -> usize {
        let mut inner = self.inner.write().expect("weight table lock poisoned");
        let c = inner.c as f64;
        let mut touched = 0;
        for ((table, index), delta) in gradient.iter() {
            if table != self.id {
                continue;
            }
            let slot = self.slot(index);
            let step = learning_rate * delta;
            inner.w[slot] += step;
            inner.u[slot] += c * step;
            touched += 1;
        }
        tracing::trace!(table = %self.name, touched, "applied gradient");
        touched
    }

    /// Mark the end of one training observation (one document or batch).
    pub fn complete_observation(&self) {
        let mut inner = self.inner.write().expect("weight table lock poisoned");
        inner.c += 1;
    }

    /// A new, independent table holding the averaged weights.
    pub fn average_snapshot(&self) -> WeightTable {
        let inner = self.inner.read().expect("weight table lock poisoned");
        let c = inner.c as f64;
        let w: Vec<f64> = inner
            .w
            .iter()
            .zip(&inner.u)
            .map(|(w, u)| w - u / c)
            .collect();
        WeightTable {
            id: WeightTableId::next(),
            name: format!("{}-avg", self.name),
            dimension: self.dimension,
            inner: RwLock::new(Weights {
                u: vec![0.0; self.dimension],
                w,
                c: 1,
            }),
        }
    }

    /// Copy of the raw weights.
    pub fn to_vec(&self) -> Vec<f64> {
        self.inner
            .read()
            .expect("weight table lock poisoned")
            .w
            .clone()
    }

    /// L2 norm of the raw weights.
    pub fn l2(&self) -> f64 {
        let inner = self.inner.read().expect("weight table lock poisoned");
        inner.w.iter().map(|w| w * w).sum::<f64>().sqrt()
    }
}

impl fmt::Debug for WeightTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightTable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Gradient
// ---------------------------------------------------------------------------

/// Sparse additive accumulator of weight deltas, keyed by (table, index).
#[derive(Debug, Clone, Default)]
pub struct Gradient {
    deltas: HashMap<(WeightTableId, u64), f64>,
}

impl Gradient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, table: WeightTableId, index: u64, delta: f64) {
        *self.deltas.entry((table, index)).or_insert(0.0) += delta;
    }

    pub fn get(&self, table: WeightTableId, index: u64) -> f64 {
        self.deltas.get(&(table, index)).copied().unwrap_or(0.0)
    }

    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: Gradient) {
        for (key, delta) in other.deltas {
            *self.deltas.entry(key).or_insert(0.0) += delta;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ((WeightTableId, u64), f64)> + '_ {
        self.deltas.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}
