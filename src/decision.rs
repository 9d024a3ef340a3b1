//! Commit-or-prune decision for popped agenda items.

use serde::{Deserialize, Serialize};

/// What the driver does with a popped fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Commit,
    /// Discard the fact; a generator may propose it again later.
    Prune,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DecisionPolicy {
    /// Commit everything that is popped.
    #[default]
    CommitAll,
    /// Commit iff the score is strictly above `min_score`.
    Threshold { min_score: f64 },
}

impl DecisionPolicy {
    /// The usual inference policy: commit positive scores only.
    pub fn positive() -> Self {
        DecisionPolicy::Threshold { min_score: 0.0 }
    }

    pub fn decide(&self, score: f64) -> Decision {
        match self {
            DecisionPolicy::CommitAll => Decision::Commit,
            DecisionPolicy::Threshold { min_score } if score > *min_score => Decision::Commit,
            DecisionPolicy::Threshold { .. } => Decision::Prune,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_strict() {
        let p = DecisionPolicy::positive();
        assert_eq!(p.decide(0.5), Decision::Commit);
        assert_eq!(p.decide(0.0), Decision::Prune);
        assert_eq!(p.decide(-3.0), Decision::Prune);
        assert_eq!(DecisionPolicy::CommitAll.decide(-3.0), Decision::Commit);
    }
}
