//! Moderation actions and the platform interface used to carry them out

use crate::moderation::{ActionError, ActorId, GroupId, MessageRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Kind of enforcement recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Message deletion plus a warning notice
    Warn,
    /// Timed restriction
    Mute,
    /// Lifting a restriction
    Unmute,
    /// Permanent removal
    Ban,
    /// Deletion without a warn (locked-out sender)
    Delete,
}

impl ActionKind {
    /// Platform right the action depends on
    #[must_use]
    pub fn required_capability(self) -> &'static str {
        match self {
            Self::Warn | Self::Delete => "Manage Messages",
            Self::Mute | Self::Unmute => "Moderate Members",
            Self::Ban => "Ban Members",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warn => write!(f, "Warn"),
            Self::Mute => write!(f, "Mute"),
            Self::Unmute => write!(f, "Unmute"),
            Self::Ban => write!(f, "Ban"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

/// Calls into the chat platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModerationApi: Send + Sync {
    async fn delete_message(&self, group: GroupId, message: MessageRef) -> Result<(), ActionError>;

    /// Restrict until a deadline, or indefinitely when `until` is `None`
    async fn restrict(
        &self,
        group: GroupId,
        actor: ActorId,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), ActionError>;

    /// Lift a restriction; must be a no-op for unrestricted actors
    async fn unrestrict(&self, group: GroupId, actor: ActorId) -> Result<(), ActionError>;

    async fn ban(&self, group: GroupId, actor: ActorId) -> Result<(), ActionError>;

    async fn notify_group(&self, group: GroupId, text: String) -> Result<(), ActionError>;
}

/// Timeout and retry rules for external calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    /// Retry once after a transient failure
    pub retry_transient: bool,
    /// Base delay before the retry, jittered up to double
    pub retry_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry_transient: true,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl CallPolicy {
    /// Run a call with the timeout, retrying at most once on transient errors
    ///
    /// # Errors
    /// Returns the last error once the attempts are exhausted.
    pub async fn run<F, Fut>(&self, operation: &'static str, mut call: F) -> Result<(), ActionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), ActionError>>,
    {
        let first = self.attempt(&mut call).await;
        match first {
            Err(e) if e.is_transient() && self.retry_transient => {
                let delay = self.jittered_backoff(&e);
                warn!(operation, error = %e, retry_in_ms = delay.as_millis() as u64, "Retrying external call");
                tokio::time::sleep(delay).await;
                self.attempt(&mut call).await
            }
            other => other,
        }
    }

    async fn attempt<F, Fut>(&self, call: &mut F) -> Result<(), ActionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), ActionError>>,
    {
        match tokio::time::timeout(self.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout(self.timeout)),
        }
    }

    fn jittered_backoff(&self, error: &ActionError) -> Duration {
        if let ActionError::RateLimited {
            retry_after: Some(after),
        } = error
        {
            return (*after).min(self.timeout);
        }
        let base = self.retry_backoff.as_millis() as u64;
        let jitter = if base == 0 {
            0
        } else {
            rand::rng().random_range(0..=base)
        };
        Duration::from_millis(base + jitter)
    }
}
