//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! priority = "easy_first"
//! max_steps = 10000
//! learning_rate = 0.1
//!
//! [decision]
//! policy = "threshold"
//! min_score = 0.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agenda::Priority;
use crate::decision::DecisionPolicy;
use crate::error::{ConfigError, UbertsResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UbertsConfig {
    pub priority: Priority,
    /// Hard cap on pops per run; `None` runs until the agenda is empty.
    pub max_steps: Option<usize>,
    pub learning_rate: f64,
    /// Number of hashed feature slots per weight table.
    pub weight_dimension: usize,
    /// Largest committed-sibling count the counting factor distinguishes.
    pub num_args_cap: usize,
    pub decision: DecisionPolicy,
}

impl Default for UbertsConfig {
    fn default() -> Self {
        Self {
            priority: Priority::default(),
            max_steps: None,
            learning_rate: 1.0,
            weight_dimension: 1 << 18,
            num_args_cap: 6,
            decision: DecisionPolicy::default(),
        }
    }
}

impl UbertsConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> UbertsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn from_toml_str(content: &str) -> UbertsResult<Self> {
        Self::parse(content, "<string>")
    }

    fn parse(content: &str, origin: &str) -> UbertsResult<Self> {
        toml::from_str(content).map_err(|e| {
            ConfigError::Parse {
                path: origin.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> UbertsResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| {
            ConfigError::Write {
                path: path.display().to_string(),
                source: e,
            }
            .into()
        })
    }
}
