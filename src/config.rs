//! Bot configuration loaded from `data/bot_config.yaml`

use crate::moderation::{CallPolicy, PolicyConfig, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const CONFIG_FILE: &str = "data/bot_config.yaml";
pub const POLICIES_FILE: &str = "policies.yaml";
pub const ACTOR_STATES_FILE: &str = "actor_states.yaml";

/// Runtime settings; every field falls back to its default when absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Seconds between mute expiry sweeps
    pub sweep_interval_secs: u64,
    /// Upper bound on a single platform call
    pub action_timeout_ms: u64,
    /// Retry a transient platform failure once
    pub retry_transient: bool,
    pub retry_backoff_ms: u64,
    /// Seconds between snapshot saves
    pub autosave_interval_secs: u64,
    /// Directory holding the policy and actor state snapshots
    pub data_dir: PathBuf,
    /// Policy given to groups seen for the first time
    pub default_policy: PolicyConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            action_timeout_ms: 5000,
            retry_transient: true,
            retry_backoff_ms: 250,
            autosave_interval_secs: 60,
            data_dir: PathBuf::from("data"),
            default_policy: PolicyConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load the config file, using defaults if it does not exist
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// the default policy is invalid.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let path = path.as_ref();
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_yaml::from_str::<Self>(&content).map_err(StoreError::from)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(StoreError::from(e).into()),
        };
        config.default_policy.normalize();
        config.default_policy.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(self.action_timeout_ms),
            retry_transient: self.retry_transient,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    #[must_use]
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }

    #[must_use]
    pub fn policies_path(&self) -> PathBuf {
        self.data_dir.join(POLICIES_FILE)
    }

    #[must_use]
    pub fn actor_states_path(&self) -> PathBuf {
        self.data_dir.join(ACTOR_STATES_FILE)
    }
}
