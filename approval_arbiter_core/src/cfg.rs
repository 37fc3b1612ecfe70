use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::weights::WeightProfile;

/// Thresholds of the verdict rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCfg {
    /// Packages above this many average daily users always go to a human.
    pub max_daily_users: u64,
    /// Packages with fewer approved updates always go to a human.
    pub min_approved_updates: u32,
    /// Verdict fails when the computed weight is strictly above this.
    #[serde(default = "default_weight_ceiling")]
    pub weight_ceiling: u32,
}

fn default_weight_ceiling() -> u32 {
    100
}

impl Default for PolicyCfg {
    fn default() -> Self {
        Self {
            max_daily_users: 10_000,
            min_approved_updates: 1,
            weight_ceiling: default_weight_ceiling(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockCfg {
    /// TTL of the whole-run lock.
    pub run_ttl_secs: u64,
    /// TTL of a per-package review lock held while evaluating.
    pub review_ttl_secs: u64,
}

impl Default for LockCfg {
    fn default() -> Self {
        Self {
            run_ttl_secs: 3_600,
            review_ttl_secs: 600,
        }
    }
}

impl LockCfg {
    pub fn run_ttl(&self) -> Duration {
        Duration::from_secs(self.run_ttl_secs)
    }

    pub fn review_ttl(&self) -> Duration {
        Duration::from_secs(self.review_ttl_secs)
    }
}

/// Engine configuration as read from the `[policy]`, `[weights]` and
/// `[locks]` tables plus the top-level `actor` key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCfg {
    /// Identity recorded on automated approvals and used as lock owner prefix.
    #[serde(default = "default_actor")]
    pub actor: String,
    pub policy: PolicyCfg,
    #[serde(default)]
    pub weights: WeightProfile,
    #[serde(default)]
    pub locks: LockCfg,
}

fn default_actor() -> String {
    "auto-approval-bot".to_string()
}

impl Default for ApprovalCfg {
    fn default() -> Self {
        Self {
            actor: default_actor(),
            policy: PolicyCfg::default(),
            weights: WeightProfile::default(),
            locks: LockCfg::default(),
        }
    }
}

impl ApprovalCfg {
    /// Load and validate from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Misconfiguration guard. Zero thresholds would silently approve or
    /// block everything, so they are rejected outright.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.policy.max_daily_users == 0 {
            return Err(ConfigError::Validation(
                "policy.max_daily_users must be strictly positive".to_string(),
            ));
        }
        if self.policy.min_approved_updates == 0 {
            return Err(ConfigError::Validation(
                "policy.min_approved_updates must be strictly positive".to_string(),
            ));
        }
        if self.policy.weight_ceiling == 0 {
            return Err(ConfigError::Validation(
                "policy.weight_ceiling must be strictly positive".to_string(),
            ));
        }
        if self.locks.run_ttl_secs == 0 || self.locks.review_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "lock TTLs must be strictly positive".to_string(),
            ));
        }
        if self.actor.trim().is_empty() {
            return Err(ConfigError::Validation("actor must not be empty".to_string()));
        }
        Ok(())
    }
}
