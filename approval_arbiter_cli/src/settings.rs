//! Process settings: the engine config plus where things live.
//!
//! ```toml
//! actor = "auto-approval-bot"
//!
//! [policy]
//! max_daily_users = 10000
//! min_approved_updates = 1
//!
//! [store]
//! database = "/var/lib/amo/review.db"
//!
//! [signing]
//! key_hex = "…64 hex chars…"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use approval_arbiter_core::{ApprovalCfg, ConfigError};
use approval_arbiter_supervisor::Ed25519Signer;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub approval: ApprovalCfg,
    #[serde(default)]
    pub store: StoreSettings,
    pub signing: SigningSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub database: PathBuf,
    /// Separate database for the lock table. Defaults to `database`.
    pub lock_database: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("approval-arbiter.db"),
            lock_database: None,
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreSettings {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn lock_database(&self) -> &Path {
        self.lock_database.as_deref().unwrap_or(&self.database)
    }
}

#[derive(Clone, Deserialize)]
pub struct SigningSettings {
    /// Hex-encoded 32-byte Ed25519 seed.
    pub key_hex: String,
}

impl std::fmt::Debug for SigningSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningSettings").field("key_hex", &"<redacted>").finish()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Append notifications to this JSON-lines file instead of only logging them.
    pub spool: Option<PathBuf>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.approval.validate()?;
        if self.store.busy_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "store.busy_timeout_ms must be strictly positive".to_string(),
            ));
        }
        self.signer()?;
        Ok(())
    }

    pub fn signer(&self) -> Result<Ed25519Signer, ConfigError> {
        Ed25519Signer::from_hex(&self.signing.key_hex)
            .map_err(|e| ConfigError::Validation(format!("signing.key_hex: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0707070707070707070707070707070707070707070707070707070707070707";

    #[test]
    fn minimal_settings_fill_defaults() {
        let s = Settings::from_toml(&format!(
            "[policy]\nmax_daily_users = 500\nmin_approved_updates = 2\n\n[signing]\nkey_hex = \"{KEY}\"\n"
        ))
        .unwrap();

        assert_eq!(s.approval.actor, "auto-approval-bot");
        assert_eq!(s.approval.policy.max_daily_users, 500);
        assert_eq!(s.approval.policy.weight_ceiling, 100);
        assert_eq!(s.store.database, PathBuf::from("approval-arbiter.db"));
        assert_eq!(s.store.lock_database(), Path::new("approval-arbiter.db"));
        assert!(s.notifications.spool.is_none());
    }

    #[test]
    fn example_file_parses() {
        let s = Settings::from_toml(include_str!("../approval-arbiter.example.toml")).unwrap();
        assert_eq!(s.approval.locks.review_ttl_secs, 600);
        assert!(s.notifications.spool.is_some());
    }

    #[test]
    fn bad_key_is_a_validation_error() {
        let err = Settings::from_toml(
            "[policy]\nmax_daily_users = 500\nmin_approved_updates = 2\n\n[signing]\nkey_hex = \"abcd\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn missing_signing_table_is_a_parse_error() {
        let err = Settings::from_toml("[policy]\nmax_daily_users = 500\nmin_approved_updates = 2\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn key_is_not_debug_printed() {
        let s = SigningSettings {
            key_hex: KEY.to_string(),
        };
        assert!(!format!("{s:?}").contains(KEY));
    }
}
