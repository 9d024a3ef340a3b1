//! Composable scores with forward evaluation and backward accumulation.
//!
//! An [`Adjoints`] is a small expression tree. `forward()` evaluates it
//! against the current weights; `backward(d_err, grad)` pushes the error
//! signal down to every linear leaf, recording `-d_err * x_i` per feature in
//! a [`Gradient`]. Applying that gradient with a positive learning rate moves
//! the score against the error.
//!
//! Global factors layer their contributions with [`Adjoints::with_term`],
//! which keeps scores in the form `local + Σ named terms` so a factor can
//! later replace its own term instead of adding it twice.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::features::Features;
use super::weights::{Gradient, WeightTable};

#[derive(Clone)]
pub enum Adjoints {
    /// A fixed score; carries no gradient.
    Constant(f64),
    /// `features · weights`.
    Linear {
        table: Arc<WeightTable>,
        features: Arc<Features>,
    },
    Sum(Vec<Adjoints>),
    /// A local score plus named global terms.
    Composite {
        local: Box<Adjoints>,
        terms: BTreeMap<String, Adjoints>,
    },
}

impl Adjoints {
    pub fn constant(value: f64) -> Self {
        Adjoints::Constant(value)
    }

    pub fn linear(table: Arc<WeightTable>, features: Features) -> Self {
        Adjoints::Linear {
            table,
            features: Arc::new(features),
        }
    }

    pub fn forward(&self) -> f64 {
        match self {
            Adjoints::Constant(v) => *v,
            Adjoints::Linear { table, features } => table.dot(features),
            Adjoints::Sum(parts) => parts.iter().map(Adjoints::forward).sum(),
            Adjoints::Composite { local, terms } => {
                local.forward() + terms.values().map(Adjoints::forward).sum::<f64>()
            }
        }
    }

    pub fn backward(&self, d_err: f64, grad: &mut Gradient) {
        match self {
            Adjoints::Constant(_) => {}
            Adjoints::Linear { table, features } => {
                for (i, x) in features.iter() {
                    grad.add(table.id(), i, -d_err * x);
                }
            }
            Adjoints::Sum(parts) => {
                for p in parts {
                    p.backward(d_err, grad);
                }
            }
            Adjoints::Composite { local, terms } => {
                local.backward(d_err, grad);
                for t in terms.values() {
                    t.backward(d_err, grad);
                }
            }
        }
    }

    /// Set the named global term, replacing any earlier value of it.
    pub fn with_term(self, name: &str, term: Adjoints) -> Adjoints {
        match self {
            Adjoints::Composite { local, mut terms } => {
                terms.insert(name.to_string(), term);
                Adjoints::Composite { local, terms }
            }
            other => {
                let mut terms = BTreeMap::new();
                terms.insert(name.to_string(), term);
                Adjoints::Composite {
                    local: Box::new(other),
                    terms,
                }
            }
        }
    }

    /// Drop the named global term if present.
    pub fn without_term(self, name: &str) -> Adjoints {
        match self {
            Adjoints::Composite { local, mut terms } => {
                terms.remove(name);
                if terms.is_empty() {
                    *local
                } else {
                    Adjoints::Composite { local, terms }
                }
            }
            other => other,
        }
    }

    pub fn term(&self, name: &str) -> Option<&Adjoints> {
        match self {
            Adjoints::Composite { terms, .. } => terms.get(name),
            _ => None,
        }
    }

    /// The score without any global terms.
    pub fn local(&self) -> &Adjoints {
        match self {
            Adjoints::Composite { local, .. } => local,
            other => other,
        }
    }

    /// Names of the global terms layered onto this score.
    pub fn term_names(&self) -> Vec<&str> {
        match self {
            Adjoints::Composite { terms, .. } => terms.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<f64> for Adjoints {
    fn from(v: f64) -> Self {
        Adjoints::Constant(v)
    }
}

impl fmt::Debug for Adjoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adjoints::Constant(v) => write!(f, "Constant({v})"),
            Adjoints::Linear { table, features } => {
                write!(f, "Linear({}, {} features)", table.name(), features.len())
            }
            Adjoints::Sum(parts) => f.debug_tuple("Sum").field(parts).finish(),
            Adjoints::Composite { local, terms } => f
                .debug_struct("Composite")
                .field("local", local)
                .field("terms", terms)
                .finish(),
        }
    }
}
