//! Test doubles shared by the engine's unit tests

use crate::moderation::{
    ActionError, ActorId, ActorKey, ActorState, ActorStateStore, GroupId, MessageRef,
    ModerationApi, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

/// A platform call as seen by [`RecordingApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Delete(GroupId, MessageRef),
    Restrict(GroupId, ActorId, Option<DateTime<Utc>>),
    Unrestrict(GroupId, ActorId),
    Ban(GroupId, ActorId),
    Notify(GroupId, String),
}

/// Platform fake that records every call and can deny chosen operations
#[derive(Default)]
pub struct RecordingApi {
    calls: Mutex<Vec<ApiCall>>,
    denied: Mutex<HashSet<&'static str>>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an operation ("delete", "restrict", "unrestrict", "ban", "notify") fail
    pub fn deny(&self, operation: &'static str) {
        self.denied.lock().unwrap().insert(operation);
    }

    pub fn allow(&self, operation: &'static str) {
        self.denied.lock().unwrap().remove(operation);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub fn notices(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Notify(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, operation: &'static str, call: ApiCall) -> Result<(), ActionError> {
        self.calls.lock().unwrap().push(call);
        tokio::task::yield_now().await;
        if self.denied.lock().unwrap().contains(operation) {
            Err(ActionError::PermissionDenied(operation.to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ModerationApi for RecordingApi {
    async fn delete_message(&self, group: GroupId, message: MessageRef) -> Result<(), ActionError> {
        self.record("delete", ApiCall::Delete(group, message)).await
    }

    async fn restrict(
        &self,
        group: GroupId,
        actor: ActorId,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), ActionError> {
        self.record("restrict", ApiCall::Restrict(group, actor, until))
            .await
    }

    async fn unrestrict(&self, group: GroupId, actor: ActorId) -> Result<(), ActionError> {
        self.record("unrestrict", ApiCall::Unrestrict(group, actor))
            .await
    }

    async fn ban(&self, group: GroupId, actor: ActorId) -> Result<(), ActionError> {
        self.record("ban", ApiCall::Ban(group, actor)).await
    }

    async fn notify_group(&self, group: GroupId, text: String) -> Result<(), ActionError> {
        self.record("notify", ApiCall::Notify(group, text)).await
    }
}

/// Actor store whose every operation fails
pub struct FailingActorStore;

#[async_trait]
impl ActorStateStore for FailingActorStore {
    async fn get(&self, _key: ActorKey) -> Result<Option<ActorState>, StoreError> {
        Err(StoreError::Unavailable("store offline".into()))
    }

    async fn get_or_create(&self, _key: ActorKey) -> Result<ActorState, StoreError> {
        Err(StoreError::Unavailable("store offline".into()))
    }

    async fn save(&self, _state: &ActorState) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store offline".into()))
    }

    async fn remove(&self, _key: ActorKey) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store offline".into()))
    }

    async fn list_expired_mutes(&self, _now: DateTime<Utc>) -> Result<Vec<ActorState>, StoreError> {
        Err(StoreError::Unavailable("store offline".into()))
    }
}
