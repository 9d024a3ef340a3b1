//! Scoring: adjoints, weight tables, features and local factors.

pub mod adjoints;
pub mod features;
pub mod local;
pub mod weights;

pub use adjoints::Adjoints;
pub use features::{FeatureExtractor, Features, RelationArgFeatures};
pub use local::{ConstantFactor, FeatureFactor, LocalFactor};
pub use weights::{Gradient, WeightTable, WeightTableId};
