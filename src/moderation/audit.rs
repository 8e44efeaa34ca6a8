//! Append-only audit trail of enforcement attempts

use crate::AUDIT_TARGET;
use crate::moderation::{ActionKind, ActorId, GroupId, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Who triggered an enforcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Issuer {
    /// Automatic rule enforcement
    Engine,
    /// Mute expiry reconciliation
    Sweeper,
    /// A moderator command
    Moderator(ActorId),
}

impl fmt::Display for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine => write!(f, "engine"),
            Self::Sweeper => write!(f, "sweeper"),
            Self::Moderator(id) => write!(f, "moderator:{id}"),
        }
    }
}

/// One enforcement attempt, written exactly once whatever the outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementRecord {
    pub id: String,
    pub group: GroupId,
    pub actor: ActorId,
    pub action: ActionKind,
    pub reason: String,
    pub issuer: Issuer,
    pub timestamp: DateTime<Utc>,
    pub succeeded: bool,
    /// Failure description when `succeeded` is false
    pub error: Option<String>,
}

impl EnforcementRecord {
    #[must_use]
    pub fn new(
        group: GroupId,
        actor: ActorId,
        action: ActionKind,
        reason: impl Into<String>,
        issuer: Issuer,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            group,
            actor,
            action,
            reason: reason.into(),
            issuer,
            timestamp: Utc::now(),
            succeeded: true,
            error: None,
        }
    }

    /// Mark the record failed with the given error text
    #[must_use]
    pub fn failed(mut self, error: impl fmt::Display) -> Self {
        self.succeeded = false;
        self.error = Some(error.to_string());
        self
    }
}

/// Destination for enforcement records; must accept concurrent appends
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: EnforcementRecord) -> Result<(), StoreError>;
}

/// In-memory audit log that also emits every record on the audit log target
#[derive(Clone, Default)]
pub struct MemoryAuditLog {
    records: Arc<DashMap<String, EnforcementRecord>>,
}

impl MemoryAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, oldest first
    #[must_use]
    pub fn get_all(&self) -> Vec<EnforcementRecord> {
        let mut records: Vec<_> = self.records.iter().map(|e| e.value().clone()).collect();
        records.sort_by_key(|r| r.timestamp);
        records
    }

    /// Records for one actor in one group, oldest first
    #[must_use]
    pub fn get_for_actor(&self, group: GroupId, actor: ActorId) -> Vec<EnforcementRecord> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|entry| entry.group == group && entry.actor == actor)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.timestamp);
        records
    }

    /// Number of records of one action kind
    #[must_use]
    pub fn count(&self, action: ActionKind) -> usize {
        self.records
            .iter()
            .filter(|entry| entry.action == action)
            .count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn record(&self, record: EnforcementRecord) -> Result<(), StoreError> {
        info!(
            target: AUDIT_TARGET,
            enforcement_id = %record.id,
            group_id = %record.group,
            user_id = %record.actor,
            action = %record.action,
            issuer = %record.issuer,
            reason = %record.reason,
            succeeded = record.succeeded,
            error = record.error.as_deref().unwrap_or(""),
            "Enforcement recorded"
        );
        self.records.insert(record.id.clone(), record);
        Ok(())
    }
}
