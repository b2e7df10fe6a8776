//! Engine configuration, loaded from TOML.
//!
//! Every section is optional; missing fields take their defaults:
//!
//! ```toml
//! data_dir = "/var/lib/twenty-q"
//!
//! [policy]
//! min_questions = 5
//! max_questions = 30
//! guess_margin = 8.0
//!
//! [filter]
//! tolerance = 10
//! min_keep = 5
//!
//! [learning]
//! ema_decay = 0.9
//! learn_from_failures = true
//!
//! [sessions]
//! idle_timeout_secs = 1800
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::convergence::ConvergencePolicy;
use crate::error::ConfigError;
use crate::learning::LearningConfig;
use crate::scoring::FilterPolicy;
use crate::session::SessionConfig;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Full engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Durable store location. `None` keeps everything in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub policy: ConvergencePolicy,
    pub filter: FilterPolicy,
    pub learning: LearningConfig,
    pub sessions: SessionConfig,
}

impl EngineConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Write the config as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = to_toml(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if self.policy.max_questions == 0 {
            return invalid("policy.max_questions must be at least 1".into());
        }
        if self.policy.max_questions < self.policy.min_questions {
            return invalid(format!(
                "policy.max_questions ({}) is below policy.min_questions ({})",
                self.policy.max_questions, self.policy.min_questions
            ));
        }
        if !self.policy.guess_margin.is_finite() || self.policy.guess_margin < 0.0 {
            return invalid("policy.guess_margin must be a non-negative number".into());
        }
        if self.filter.tolerance < 0 {
            return invalid("filter.tolerance must not be negative".into());
        }
        if self.filter.min_keep == 0 {
            return invalid("filter.min_keep must be at least 1".into());
        }
        for (name, value) in [
            ("learning.ema_decay", self.learning.ema_decay),
            ("learning.reinforce_weight", self.learning.reinforce_weight),
            ("learning.confidence_step", self.learning.confidence_step),
            ("learning.new_confidence", self.learning.new_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if !self.learning.failure_boost.is_finite() || self.learning.failure_boost < 0.0 {
            return invalid("learning.failure_boost must be a non-negative number".into());
        }
        Ok(())
    }
}

fn to_toml<T: Serialize>(value: &T) -> ConfigResult<String> {
    toml::to_string_pretty(value).map_err(|e| ConfigError::Serialize {
        message: e.to_string(),
    })
}
