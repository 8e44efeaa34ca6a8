//! Policy and actor state stores
//!
//! The engine only sees the [`PolicyStore`] and [`ActorStateStore`] traits. The
//! in-memory implementations here keep everything in `DashMap`s and can snapshot
//! themselves to YAML files between runs.

use crate::moderation::{
    ActorKey, ActorState, GroupId, ModerationResult, PolicyConfig, PolicyPatch, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Read-mostly mapping from group to policy
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Get a group's policy, provisioning defaults for unknown groups
    async fn get_policy(&self, group: GroupId) -> Result<PolicyConfig, StoreError>;

    /// Apply a patch atomically, returning the stored result
    async fn update_policy(&self, group: GroupId, patch: &PolicyPatch)
    -> ModerationResult<PolicyConfig>;
}

/// Repository for per-actor moderation state
#[async_trait]
pub trait ActorStateStore: Send + Sync {
    async fn get(&self, key: ActorKey) -> Result<Option<ActorState>, StoreError>;

    async fn get_or_create(&self, key: ActorKey) -> Result<ActorState, StoreError>;

    async fn save(&self, state: &ActorState) -> Result<(), StoreError>;

    /// Drop an actor's state entirely
    async fn remove(&self, key: ActorKey) -> Result<(), StoreError>;

    /// States that are muted with a deadline before `now`
    async fn list_expired_mutes(&self, now: DateTime<Utc>) -> Result<Vec<ActorState>, StoreError>;
}

/// In-memory policy store
#[derive(Clone, Default)]
pub struct MemoryPolicyStore {
    policies: Arc<DashMap<GroupId, PolicyConfig>>,
    defaults: PolicyConfig,
}

impl MemoryPolicyStore {
    #[must_use]
    pub fn new(mut defaults: PolicyConfig) -> Self {
        defaults.normalize();
        Self {
            policies: Arc::new(DashMap::new()),
            defaults,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Load policies from a YAML snapshot, ignoring a missing file
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_snapshot(&self, path: impl AsRef<Path>) -> Result<usize, StoreError> {
        let Some(content) = read_optional(path.as_ref()).await? else {
            return Ok(0);
        };
        let policies: BTreeMap<GroupId, PolicyConfig> = serde_yaml::from_str(&content)?;
        let count = policies.len();
        for (group, mut policy) in policies {
            policy.normalize();
            self.policies.insert(group, policy);
        }
        Ok(count)
    }

    /// Write all policies to a YAML snapshot
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let policies: BTreeMap<GroupId, PolicyConfig> = self
            .policies
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        write_snapshot(path.as_ref(), &serde_yaml::to_string(&policies)?).await
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn get_policy(&self, group: GroupId) -> Result<PolicyConfig, StoreError> {
        if let Some(policy) = self.policies.get(&group) {
            return Ok(policy.value().clone());
        }
        let policy = self
            .policies
            .entry(group)
            .or_insert_with(|| {
                info!(group_id = %group, "Provisioning default policy for new group");
                self.defaults.clone()
            })
            .value()
            .clone();
        Ok(policy)
    }

    async fn update_policy(
        &self,
        group: GroupId,
        patch: &PolicyPatch,
    ) -> ModerationResult<PolicyConfig> {
        let mut entry = self
            .policies
            .entry(group)
            .or_insert_with(|| self.defaults.clone());
        let next = entry.value().patched(patch)?;
        *entry.value_mut() = next.clone();
        info!(group_id = %group, settings = ?patch.0, "Policy updated");
        Ok(next)
    }
}

/// In-memory actor state store
#[derive(Clone, Default)]
pub struct MemoryActorStore {
    states: Arc<DashMap<ActorKey, ActorState>>,
}

impl MemoryActorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Overwrite a state directly, bypassing the tracker (seeding and tests)
    pub fn insert(&self, state: ActorState) {
        self.states.insert(state.key(), state);
    }

    /// Load states from a YAML snapshot, ignoring a missing file
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_snapshot(&self, path: impl AsRef<Path>) -> Result<usize, StoreError> {
        let Some(content) = read_optional(path.as_ref()).await? else {
            return Ok(0);
        };
        let states: Vec<ActorState> = serde_yaml::from_str(&content)?;
        let count = states.len();
        for state in states {
            self.insert(state);
        }
        Ok(count)
    }

    /// Write all states to a YAML snapshot
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let mut states: Vec<ActorState> =
            self.states.iter().map(|entry| entry.value().clone()).collect();
        states.sort_by_key(ActorState::key);
        write_snapshot(path.as_ref(), &serde_yaml::to_string(&states)?).await
    }
}

#[async_trait]
impl ActorStateStore for MemoryActorStore {
    async fn get(&self, key: ActorKey) -> Result<Option<ActorState>, StoreError> {
        Ok(self.states.get(&key).map(|entry| entry.value().clone()))
    }

    async fn get_or_create(&self, key: ActorKey) -> Result<ActorState, StoreError> {
        Ok(self
            .states
            .entry(key)
            .or_insert_with(|| ActorState::new(key))
            .value()
            .clone())
    }

    async fn save(&self, state: &ActorState) -> Result<(), StoreError> {
        self.states.insert(state.key(), state.clone());
        Ok(())
    }

    async fn remove(&self, key: ActorKey) -> Result<(), StoreError> {
        self.states.remove(&key);
        Ok(())
    }

    async fn list_expired_mutes(&self, now: DateTime<Utc>) -> Result<Vec<ActorState>, StoreError> {
        Ok(self
            .states
            .iter()
            .filter(|entry| entry.value().mute_expired(now))
            .map(|entry| entry.value().clone())
            .collect())
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_snapshot(path: &Path, yaml: &str) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await?;
        }
    }
    tokio::fs::write(path, yaml).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{ActorId, ContentKind, PolicyError, PolicySetting};
    use chrono::Duration;

    fn key(actor: u64) -> ActorKey {
        ActorKey::new(GroupId(67890), ActorId(actor))
    }

    #[tokio::test]
    async fn test_unknown_group_gets_defaults() {
        let store = MemoryPolicyStore::new(PolicyConfig::default());
        let policy = store.get_policy(GroupId(1)).await.unwrap();
        assert_eq!(policy, PolicyConfig::default());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_policy_rejects_invalid_patch() {
        let store = MemoryPolicyStore::new(PolicyConfig::default());
        let result = store
            .update_policy(GroupId(1), &PolicySetting::BanThreshold(2).into())
            .await;
        assert!(matches!(
            result,
            Err(crate::moderation::ModerationError::Policy(
                PolicyError::ThresholdOrder { mute: 3, ban: 2 }
            ))
        ));
        assert_eq!(store.get_policy(GroupId(1)).await.unwrap().ban_threshold, 5);

        let updated = store
            .update_policy(GroupId(1), &PolicySetting::Lock(ContentKind::Poll).into())
            .await
            .unwrap();
        assert!(updated.media_locks.contains(&ContentKind::Poll));
    }

    #[tokio::test]
    async fn test_snapshot_words_match_regardless_of_case() {
        let dir = std::env::temp_dir().join(format!("group-warden-{}", uuid::Uuid::new_v4()));
        let path = dir.join("policies.yaml");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(&path, "67890:\n  forbidden_words: [SPAM]\n")
            .await
            .unwrap();

        let store = MemoryPolicyStore::new(PolicyConfig::default());
        assert_eq!(store.load_snapshot(&path).await.unwrap(), 1);
        let policy = store.get_policy(GroupId(67890)).await.unwrap();
        assert!(policy.forbidden_words.contains("spam"));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_get_or_create_and_remove() {
        let store = MemoryActorStore::new();
        let state = store.get_or_create(key(1)).await.unwrap();
        assert_eq!(state.warn_count, 0);

        let mut state = state;
        state.warn_count = 4;
        store.save(&state).await.unwrap();
        assert_eq!(store.get(key(1)).await.unwrap().unwrap().warn_count, 4);

        store.remove(key(1)).await.unwrap();
        assert!(store.get(key(1)).await.unwrap().is_none());
        assert_eq!(store.get_or_create(key(1)).await.unwrap().warn_count, 0);
    }

    #[tokio::test]
    async fn test_list_expired_mutes() {
        let store = MemoryActorStore::new();
        let now = Utc::now();

        let mut expired = ActorState::new(key(1));
        expired.mark_muted(now - Duration::minutes(1));
        let mut running = ActorState::new(key(2));
        running.mark_muted(now + Duration::minutes(1));
        let clean = ActorState::new(key(3));

        store.insert(expired);
        store.insert(running);
        store.insert(clean);

        let listed = store.list_expired_mutes(now).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].actor, ActorId(1));
    }

    #[tokio::test]
    async fn test_missing_snapshot_loads_nothing() {
        let store = MemoryActorStore::new();
        let loaded = store
            .load_snapshot("this/path/does/not/exist/actor_states.yaml")
            .await
            .unwrap();
        assert_eq!(loaded, 0);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = std::env::temp_dir().join(format!("group-warden-{}", uuid::Uuid::new_v4()));
        let path = dir.join("actor_states.yaml");

        let store = MemoryActorStore::new();
        let mut state = ActorState::new(key(7));
        state.warn_count = 2;
        store.insert(state.clone());
        store.save_snapshot(&path).await.unwrap();

        let restored = MemoryActorStore::new();
        assert_eq!(restored.load_snapshot(&path).await.unwrap(), 1);
        assert_eq!(restored.get(key(7)).await.unwrap(), Some(state));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
