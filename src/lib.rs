// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # uberts
//!
//! An incremental, score-driven forward-chaining engine over typed
//! hyperedges ("facts").
//!
//! Candidate facts wait on a scored agenda. The driver repeatedly pops the
//! best one, decides whether to commit it, and matches every newly committed
//! fact against a trie of join rules. Each complete match feeds transition
//! generators, which propose new scored candidates, and global factors,
//! which rescore candidates already waiting.
//!
//! ## Architecture
//!
//! - **Facts** (`node`, `fact`, `schema`): interned typed nodes, relations
//!   and immutable hyperedges
//! - **State** (`state`): committed facts with positional indices
//! - **Agenda** (`agenda`): indexed max-heap with adjacency lookups
//! - **Rules** (`rule`): rule syntax, compilation and the pattern trie
//! - **Scoring** (`score`, `learn`, `batch`): adjoints, weight tables and
//!   perceptron training
//! - **Global factors** (`factor`): at-most-one, at-least-one, counting
//! - **Driver** (`engine`): the `Uberts` run loop
//!
//! ## Library usage
//!
//! ```no_run
//! use uberts::config::UbertsConfig;
//! use uberts::engine::Uberts;
//! use uberts::node::Value;
//! use uberts::transition::RuleGenerator;
//!
//! let mut u = Uberts::new(UbertsConfig::default());
//! u.define_relation("edge", &["v", "v"]).unwrap();
//! u.define_relation("path", &["v", "v"]).unwrap();
//! let r = u.add_rule_text("edge(x, y) => path(x, y)").unwrap();
//! u.add_generator(r, RuleGenerator::constant("base", 1.0)).unwrap();
//! let e = u.fact("edge", &[Value::Int(1), Value::Int(2)]).unwrap();
//! u.commit_initial_fact(e).unwrap();
//! let result = u.run().unwrap();
//! assert_eq!(result.committed.len(), 1);
//! ```

pub mod agenda;
pub mod batch;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod fact;
pub mod factor;
pub mod learn;
pub mod node;
pub mod program;
pub mod rule;
pub mod schema;
pub mod score;
pub mod state;
pub mod transition;
