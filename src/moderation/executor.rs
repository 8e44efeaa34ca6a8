//! Enforcement executor
//!
//! Carries out one escalation decision against the platform. The external call
//! always runs before any punishment field is staged on the actor state:
//!
//! - success stages the mute deadline (or asks the caller to clear the actor
//!   after a ban) and posts a notice
//! - a permanent failure posts a notice naming the missing capability
//! - a transient failure is only logged; the next violation or sweep retries
//!
//! Either way the warn increment already on the state is kept, and the caller
//! commits the state before writing the outcome's single audit record.

use crate::moderation::{
    ActionError, ActionKind, ActorId, ActorState, AuditSink, CallPolicy, Decision,
    EnforcementRecord, FailureClass, GroupId, Issuer, MessageRef, ModerationApi, PolicyConfig,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One decision to carry out
#[derive(Debug, Clone)]
pub struct EnforcementRequest {
    pub decision: Decision,
    /// Offending message, deleted before the action runs
    pub message: Option<MessageRef>,
    pub reason: String,
    pub issuer: Issuer,
}

/// What happened, plus the audit record to write after the state is committed
#[derive(Debug, Clone)]
pub struct EnforcementOutcome {
    pub record: EnforcementRecord,
    /// The actor was banned and its state must be deleted
    pub clear_actor: bool,
}

impl EnforcementOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.record.succeeded
    }
}

/// Runs platform calls for the engine and the sweeper
pub struct EnforcementExecutor {
    api: Arc<dyn ModerationApi>,
    audit: Arc<dyn AuditSink>,
    calls: CallPolicy,
}

impl EnforcementExecutor {
    #[must_use]
    pub fn new(api: Arc<dyn ModerationApi>, audit: Arc<dyn AuditSink>, calls: CallPolicy) -> Self {
        Self { api, audit, calls }
    }

    /// Carry out a decision against `state`, staging punishment fields on success
    pub async fn enforce(
        &self,
        state: &mut ActorState,
        policy: &PolicyConfig,
        request: EnforcementRequest,
    ) -> EnforcementOutcome {
        let (group, actor) = (state.group, state.actor);

        if let Some(message) = request.message {
            self.delete_message(group, message).await;
        }

        let (action, result) = match request.decision {
            Decision::Warn => (ActionKind::Warn, Ok(())),
            Decision::Mute { until } => (
                ActionKind::Mute,
                self.calls
                    .run("restrict", || self.api.restrict(group, actor, Some(until)))
                    .await,
            ),
            Decision::Ban => (
                ActionKind::Ban,
                self.calls.run("ban", || self.api.ban(group, actor)).await,
            ),
        };

        let record = EnforcementRecord::new(group, actor, action, request.reason, request.issuer);
        match result {
            Ok(()) => {
                let clear_actor = match request.decision {
                    Decision::Mute { until } => {
                        state.mark_muted(until);
                        false
                    }
                    Decision::Ban => true,
                    Decision::Warn => false,
                };
                info!(
                    group_id = %group,
                    user_id = %actor,
                    action = %action,
                    warn_count = state.warn_count,
                    reason = %record.reason,
                    "Enforcement applied"
                );
                let notice = enforcement_notice(action, state, policy, &record.reason);
                self.notify(group, notice).await;
                EnforcementOutcome {
                    record,
                    clear_actor,
                }
            }
            Err(e) => {
                self.report_failure(group, actor, action, &e).await;
                EnforcementOutcome {
                    record: record.failed(&e),
                    clear_actor: false,
                }
            }
        }
    }

    /// Lift a mute, clearing the mute fields only if the platform accepted it
    pub async fn lift_mute(
        &self,
        state: &mut ActorState,
        reason: &str,
        issuer: Issuer,
    ) -> EnforcementOutcome {
        let (group, actor) = (state.group, state.actor);
        let result = self
            .calls
            .run("unrestrict", || self.api.unrestrict(group, actor))
            .await;

        let record = EnforcementRecord::new(group, actor, ActionKind::Unmute, reason, issuer);
        match result {
            Ok(()) => {
                state.clear_mute();
                info!(group_id = %group, user_id = %actor, issuer = %issuer, "Mute lifted");
                if matches!(issuer, Issuer::Moderator(_)) {
                    self.notify(group, format!("🔊 <@{actor}> can speak again."))
                        .await;
                }
                EnforcementOutcome {
                    record,
                    clear_actor: false,
                }
            }
            Err(e) => {
                self.report_failure(group, actor, ActionKind::Unmute, &e).await;
                EnforcementOutcome {
                    record: record.failed(&e),
                    clear_actor: false,
                }
            }
        }
    }

    /// Delete a message from a sender whose mute is still running
    pub async fn suppress(
        &self,
        state: &ActorState,
        message: Option<MessageRef>,
        mute_until: DateTime<Utc>,
    ) -> EnforcementRecord {
        let reason = format!("message while muted until {mute_until}");
        let record = EnforcementRecord::new(
            state.group,
            state.actor,
            ActionKind::Delete,
            reason,
            Issuer::Engine,
        );
        match message {
            Some(message) if !self.delete_message(state.group, message).await => {
                record.failed("message could not be deleted")
            }
            _ => record,
        }
    }

    /// Write an audit record; failures are logged and never surface to users
    pub async fn audit(&self, record: EnforcementRecord) {
        let id = record.id.clone();
        if let Err(e) = self.audit.record(record).await {
            error!(enforcement_id = %id, error = %e, "Failed to write audit record");
        }
    }

    /// Delete a message, treating an already deleted message as done
    async fn delete_message(&self, group: GroupId, message: MessageRef) -> bool {
        match self
            .calls
            .run("delete_message", || self.api.delete_message(group, message))
            .await
        {
            Ok(()) => true,
            Err(ActionError::NotFound(_)) => {
                debug!(group_id = %group, message_id = message.message_id, "Message already gone");
                true
            }
            Err(e) => {
                warn!(
                    group_id = %group,
                    message_id = message.message_id,
                    error = %e,
                    "Failed to delete message"
                );
                false
            }
        }
    }

    async fn report_failure(
        &self,
        group: GroupId,
        actor: ActorId,
        action: ActionKind,
        error: &ActionError,
    ) {
        match error.failure_class() {
            FailureClass::Transient => {
                warn!(group_id = %group, user_id = %actor, action = %action, error = %error, "Enforcement failed, will retry on next trigger");
            }
            FailureClass::Permanent => {
                error!(group_id = %group, user_id = %actor, action = %action, error = %error, "Enforcement failed");
                if matches!(error, ActionError::PermissionDenied(_)) {
                    let notice = format!(
                        "❗ I need the '{}' permission to {} <@{actor}>. Please check my role.",
                        action.required_capability(),
                        action.to_string().to_lowercase(),
                    );
                    self.notify(group, notice).await;
                }
            }
        }
    }

    async fn notify(&self, group: GroupId, text: String) {
        let result = self
            .calls
            .run("notify_group", || self.api.notify_group(group, text.clone()))
            .await;
        if let Err(e) = result {
            warn!(group_id = %group, error = %e, "Failed to post group notice");
        }
    }
}

fn enforcement_notice(
    action: ActionKind,
    state: &ActorState,
    policy: &PolicyConfig,
    reason: &str,
) -> String {
    let actor = state.actor;
    match action {
        ActionKind::Warn => format!(
            "⚠️ <@{actor}> has been warned for {reason}. Warnings: {}/{} (mute at {}).",
            state.warn_count, policy.ban_threshold, policy.mute_threshold
        ),
        ActionKind::Mute => {
            let until = state
                .mute_until
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_default();
            format!(
                "🔇 <@{actor}> has been muted until {until} for {reason}. Warnings: {}/{}.",
                state.warn_count, policy.ban_threshold
            )
        }
        ActionKind::Ban => format!(
            "🚨 <@{actor}> has been banned for {reason} after {} warnings.",
            state.warn_count
        ),
        ActionKind::Unmute | ActionKind::Delete => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{ActorKey, MemoryAuditLog, MockModerationApi};
    use chrono::Duration as ChronoDuration;
    use mockall::predicate::eq;
    use std::time::Duration;

    fn calls() -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(1),
            retry_transient: true,
            retry_backoff: Duration::ZERO,
        }
    }

    fn state(warns: u32) -> ActorState {
        let mut state = ActorState::new(ActorKey::new(GroupId(67890), ActorId(12345)));
        state.warn_count = warns;
        state
    }

    fn message() -> MessageRef {
        MessageRef {
            channel_id: 1,
            message_id: 2,
        }
    }

    fn request(decision: Decision) -> EnforcementRequest {
        EnforcementRequest {
            decision,
            message: Some(message()),
            reason: "flooding".to_string(),
            issuer: Issuer::Engine,
        }
    }

    fn executor(api: MockModerationApi) -> EnforcementExecutor {
        EnforcementExecutor::new(Arc::new(api), Arc::new(MemoryAuditLog::new()), calls())
    }

    #[tokio::test]
    async fn test_warn_deletes_and_notifies() {
        let mut api = MockModerationApi::new();
        api.expect_delete_message()
            .with(eq(GroupId(67890)), eq(message()))
            .times(1)
            .returning(|_, _| Ok(()));
        api.expect_notify_group()
            .withf(|_, text| text.contains("warned for flooding") && text.contains("1/5"))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut state = state(1);
        let outcome = executor(api)
            .enforce(&mut state, &PolicyConfig::default(), request(Decision::Warn))
            .await;

        assert!(outcome.succeeded());
        assert!(!outcome.clear_actor);
        assert_eq!(outcome.record.action, ActionKind::Warn);
        assert!(!state.is_muted);
    }

    #[tokio::test]
    async fn test_successful_mute_stages_deadline() {
        let until = Utc::now() + ChronoDuration::minutes(60);
        let mut api = MockModerationApi::new();
        api.expect_delete_message().returning(|_, _| Ok(()));
        api.expect_restrict()
            .with(eq(GroupId(67890)), eq(ActorId(12345)), eq(Some(until)))
            .times(1)
            .returning(|_, _, _| Ok(()));
        api.expect_notify_group().times(1).returning(|_, _| Ok(()));

        let mut state = state(3);
        let outcome = executor(api)
            .enforce(&mut state, &PolicyConfig::default(), request(Decision::Mute { until }))
            .await;

        assert!(outcome.succeeded());
        assert!(state.is_muted);
        assert_eq!(state.mute_until, Some(until));
    }

    #[tokio::test]
    async fn test_ban_without_permission_keeps_state_and_names_capability() {
        let mut api = MockModerationApi::new();
        api.expect_delete_message().returning(|_, _| Ok(()));
        api.expect_ban()
            .times(1)
            .returning(|_, _| Err(ActionError::PermissionDenied("ban".into())));
        api.expect_notify_group()
            .withf(|_, text| text.contains("'Ban Members'"))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut state = state(5);
        let outcome = executor(api)
            .enforce(&mut state, &PolicyConfig::default(), request(Decision::Ban))
            .await;

        assert!(!outcome.succeeded());
        assert!(!outcome.clear_actor);
        assert_eq!(state.warn_count, 5);
        assert!(outcome.record.error.is_some());
    }

    #[tokio::test]
    async fn test_transient_mute_failure_is_retried_once_and_stays_silent() {
        let mut api = MockModerationApi::new();
        api.expect_delete_message().returning(|_, _| Ok(()));
        api.expect_restrict()
            .times(2)
            .returning(|_, _, _| Err(ActionError::RateLimited { retry_after: None }));
        api.expect_notify_group().never();

        let mut state = state(3);
        let until = Utc::now() + ChronoDuration::minutes(60);
        let outcome = executor(api)
            .enforce(&mut state, &PolicyConfig::default(), request(Decision::Mute { until }))
            .await;

        assert!(!outcome.succeeded());
        assert!(!state.is_muted);
        assert!(state.mute_until.is_none());
        assert_eq!(state.warn_count, 3);
    }

    #[tokio::test]
    async fn test_delete_failure_does_not_block_action() {
        let mut api = MockModerationApi::new();
        api.expect_delete_message()
            .times(1)
            .returning(|_, _| Err(ActionError::PermissionDenied("delete".into())));
        api.expect_ban().times(1).returning(|_, _| Ok(()));
        api.expect_notify_group().returning(|_, _| Ok(()));

        let mut state = state(5);
        let outcome = executor(api)
            .enforce(&mut state, &PolicyConfig::default(), request(Decision::Ban))
            .await;

        assert!(outcome.succeeded());
        assert!(outcome.clear_actor);
    }

    #[tokio::test]
    async fn test_failed_unmute_leaves_actor_muted() {
        let mut api = MockModerationApi::new();
        api.expect_unrestrict()
            .times(1)
            .returning(|_, _| Err(ActionError::PermissionDenied("moderate".into())));
        api.expect_notify_group().returning(|_, _| Ok(()));

        let mut state = state(3);
        state.mark_muted(Utc::now() - ChronoDuration::minutes(1));
        let outcome = executor(api)
            .lift_mute(&mut state, "mute expired", Issuer::Sweeper)
            .await;

        assert!(!outcome.succeeded());
        assert!(state.is_muted);
    }

    #[tokio::test]
    async fn test_suppress_treats_missing_message_as_deleted() {
        let mut api = MockModerationApi::new();
        api.expect_delete_message()
            .times(1)
            .returning(|_, _| Err(ActionError::NotFound("message".into())));

        let state = state(3);
        let record = executor(api)
            .suppress(&state, Some(message()), Utc::now())
            .await;
        assert!(record.succeeded);
        assert_eq!(record.action, ActionKind::Delete);
    }
}
