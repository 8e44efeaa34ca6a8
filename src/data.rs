use std::{ops::Deref, sync::Arc};

use crate::BotConfig;
use crate::discord::DiscordModeration;
use crate::moderation::{
    ActorTracker, EnforcementExecutor, MemoryActorStore, MemoryAuditLog, MemoryPolicyStore,
    ModerationService, MuteSweeper, SweeperHandle,
};
use poise::serenity_prelude as serenity;
use serenity::prelude::TypeMapKey;
use tracing::info;

/// Shared state for commands and event handlers
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Lets the event handler find the same Data in serenity's type map
impl TypeMapKey for Data {
    type Value = Data;
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &self.config)
            .field("policies", &self.policies.len())
            .field("actor_states", &self.actors.len())
            .field("audit_records", &self.audit.len())
            .finish()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct DataInner {
    pub config: BotConfig,
    pub policies: Arc<MemoryPolicyStore>,
    pub actors: Arc<MemoryActorStore>,
    pub audit: Arc<MemoryAuditLog>,
    pub discord: Arc<DiscordModeration>,
    pub service: ModerationService,
}

impl Data {
    /// Wire the engine to Discord with empty stores
    #[must_use]
    pub fn new(config: BotConfig, http: Arc<serenity::Http>) -> Self {
        let policies = Arc::new(MemoryPolicyStore::new(config.default_policy.clone()));
        let actors = Arc::new(MemoryActorStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let discord = Arc::new(DiscordModeration::new(http));

        let tracker = Arc::new(ActorTracker::new(actors.clone()));
        let executor = Arc::new(EnforcementExecutor::new(
            discord.clone(),
            audit.clone(),
            config.call_policy(),
        ));
        let service = ModerationService::new(policies.clone(), tracker, executor);

        Self(Arc::new(DataInner {
            config,
            policies,
            actors,
            audit,
            discord,
            service,
        }))
    }

    /// Create the data and restore the policy and actor state snapshots
    ///
    /// # Errors
    /// Returns an error if a snapshot exists but cannot be read or parsed.
    pub async fn load(config: BotConfig, http: Arc<serenity::Http>) -> Result<Self, crate::Error> {
        let data = Self::new(config, http);
        let policies = data.policies.load_snapshot(data.config.policies_path()).await?;
        let actors = data.actors.load_snapshot(data.config.actor_states_path()).await?;
        info!(policies, actors, "Loaded moderation snapshots");
        Ok(data)
    }

    /// Write the policy and actor state snapshots
    ///
    /// # Errors
    /// Returns an error if serialization or a file write fails.
    pub async fn save(&self) -> Result<(), crate::Error> {
        self.policies.save_snapshot(self.config.policies_path()).await?;
        self.actors.save_snapshot(self.config.actor_states_path()).await?;
        Ok(())
    }

    /// Start the mute expiry sweeper on the configured interval
    #[must_use]
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        MuteSweeper::new(
            Arc::clone(self.service.tracker()),
            Arc::clone(self.service.executor()),
            self.config.sweep_interval(),
        )
        .spawn()
    }
}
