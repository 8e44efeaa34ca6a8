//! Moderation service
//!
//! Entry point for inbound events and moderator operations. Every operation
//! takes the actor's session from the tracker, so the rule verdict, the warn
//! increment and the enforcement outcome for one actor are committed together.

use crate::moderation::{
    ActionKind, ActorId, ActorKey, ActorTracker, Classification, EnforcementExecutor,
    EnforcementRecord, EnforcementRequest, GroupId, InboundEvent, Issuer, ModerationResult,
    PolicyConfig, PolicyPatch, PolicyStore, escalation, rules,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// What the engine did with one inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Sent by an admin or the owner; not evaluated
    Skipped,
    /// Sender is still muted; the message was deleted without a warn
    Suppressed,
    /// No rule matched
    Clean,
    /// A rule matched and one action was attempted
    Enforced {
        classification: Classification,
        action: ActionKind,
        succeeded: bool,
    },
}

/// Result of a moderator operation
#[derive(Debug, Clone)]
pub struct ActionReport {
    pub record: EnforcementRecord,
    /// Warn count after the operation (zero after a ban)
    pub warn_count: u32,
}

/// The moderation engine
#[derive(Clone)]
pub struct ModerationService {
    policies: Arc<dyn PolicyStore>,
    tracker: Arc<ActorTracker>,
    executor: Arc<EnforcementExecutor>,
}

impl ModerationService {
    #[must_use]
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        tracker: Arc<ActorTracker>,
        executor: Arc<EnforcementExecutor>,
    ) -> Self {
        Self {
            policies,
            tracker,
            executor,
        }
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<ActorTracker> {
        &self.tracker
    }

    #[must_use]
    pub fn executor(&self) -> &Arc<EnforcementExecutor> {
        &self.executor
    }

    /// Evaluate one inbound event and enforce the outcome
    ///
    /// # Errors
    /// Returns an error if the policy or actor state cannot be loaded or saved.
    /// Only this event is affected.
    pub async fn handle_event(&self, event: &InboundEvent) -> ModerationResult<EventOutcome> {
        if event.is_from_admin_or_owner {
            return Ok(EventOutcome::Skipped);
        }

        let policy = self.policies.get_policy(event.group).await?;
        let mut session = self
            .tracker
            .acquire(ActorKey::new(event.group, event.actor))
            .await?;
        let now = event.timestamp;
        let mut records = Vec::new();

        if session.state().mute_expired(now) {
            let lifted = self
                .executor
                .lift_mute(session.state_mut(), "mute expired", Issuer::Engine)
                .await;
            records.push(lifted.record);
        }

        let outcome = if let Some(until) = session
            .state()
            .mute_until
            .filter(|_| session.state().mute_active(now))
        {
            records.push(
                self.executor
                    .suppress(session.state(), event.message, until)
                    .await,
            );
            EventOutcome::Suppressed
        } else {
            let evaluation = rules::evaluate(event, &policy, session.state());
            if let Some(stage) = evaluation.flood {
                stage.commit(session.state_mut());
            }

            if evaluation.classification.is_violation() {
                let decision =
                    escalation::register_violation(session.state_mut(), &policy, now);
                let enforced = self
                    .executor
                    .enforce(
                        session.state_mut(),
                        &policy,
                        EnforcementRequest {
                            decision,
                            message: event.message,
                            reason: evaluation.classification.to_string(),
                            issuer: Issuer::Engine,
                        },
                    )
                    .await;
                if enforced.clear_actor {
                    session.clear();
                }
                let outcome = EventOutcome::Enforced {
                    classification: evaluation.classification,
                    action: enforced.record.action,
                    succeeded: enforced.succeeded(),
                };
                records.push(enforced.record);
                outcome
            } else {
                debug!(group_id = %event.group, user_id = %event.actor, "Message passed all rules");
                EventOutcome::Clean
            }
        };

        let committed = session.commit().await;
        for record in records {
            self.executor.audit(record).await;
        }
        committed?;
        Ok(outcome)
    }

    /// Warn an actor by hand, escalating exactly like an automatic violation
    ///
    /// # Errors
    /// Returns an error if the policy or actor state cannot be loaded or saved.
    pub async fn warn_actor(
        &self,
        group: GroupId,
        actor: ActorId,
        moderator: ActorId,
        reason: &str,
    ) -> ModerationResult<ActionReport> {
        let policy = self.policies.get_policy(group).await?;
        let mut session = self.tracker.acquire(ActorKey::new(group, actor)).await?;

        let decision = escalation::register_violation(session.state_mut(), &policy, Utc::now());
        let enforced = self
            .executor
            .enforce(
                session.state_mut(),
                &policy,
                EnforcementRequest {
                    decision,
                    message: None,
                    reason: reason.to_string(),
                    issuer: Issuer::Moderator(moderator),
                },
            )
            .await;
        if enforced.clear_actor {
            session.clear();
        }
        let warn_count = session.state().warn_count;

        let committed = session.commit().await;
        self.executor.audit(enforced.record.clone()).await;
        committed?;
        Ok(ActionReport {
            record: enforced.record,
            warn_count,
        })
    }

    /// Remove one warn, never going below zero
    ///
    /// # Errors
    /// Returns an error if the actor state cannot be loaded or saved.
    pub async fn unwarn_actor(
        &self,
        group: GroupId,
        actor: ActorId,
        moderator: ActorId,
    ) -> ModerationResult<u32> {
        let count = self
            .tracker
            .with_actor(ActorKey::new(group, actor), |state| {
                state.warn_count = state.warn_count.saturating_sub(1);
                state.warn_count
            })
            .await?;
        info!(group_id = %group, user_id = %actor, moderator_id = %moderator, warn_count = count, "Warn removed");
        Ok(count)
    }

    /// Reset an actor's warns to zero
    ///
    /// # Errors
    /// Returns an error if the actor state cannot be loaded or saved.
    pub async fn reset_warns(
        &self,
        group: GroupId,
        actor: ActorId,
        moderator: ActorId,
    ) -> ModerationResult<()> {
        self.tracker
            .with_actor(ActorKey::new(group, actor), |state| state.warn_count = 0)
            .await?;
        info!(group_id = %group, user_id = %actor, moderator_id = %moderator, "Warns reset");
        Ok(())
    }

    /// Mute an actor for `minutes`, or the group's default when `None`
    ///
    /// # Errors
    /// Returns an error if the policy or actor state cannot be loaded or saved.
    pub async fn mute_actor(
        &self,
        group: GroupId,
        actor: ActorId,
        minutes: Option<u32>,
        moderator: ActorId,
    ) -> ModerationResult<ActionReport> {
        let policy = self.policies.get_policy(group).await?;
        let mut session = self.tracker.acquire(ActorKey::new(group, actor)).await?;

        let until = escalation::mute_deadline(&policy, minutes, Utc::now());
        let enforced = self
            .executor
            .enforce(
                session.state_mut(),
                &policy,
                EnforcementRequest {
                    decision: escalation::Decision::Mute { until },
                    message: None,
                    reason: "muted by a moderator".to_string(),
                    issuer: Issuer::Moderator(moderator),
                },
            )
            .await;
        let warn_count = session.state().warn_count;

        let committed = session.commit().await;
        self.executor.audit(enforced.record.clone()).await;
        committed?;
        Ok(ActionReport {
            record: enforced.record,
            warn_count,
        })
    }

    /// Lift an actor's mute now
    ///
    /// # Errors
    /// Returns an error if the actor state cannot be loaded or saved.
    pub async fn unmute_actor(
        &self,
        group: GroupId,
        actor: ActorId,
        moderator: ActorId,
    ) -> ModerationResult<ActionReport> {
        let mut session = self.tracker.acquire(ActorKey::new(group, actor)).await?;
        let lifted = self
            .executor
            .lift_mute(
                session.state_mut(),
                "unmuted by a moderator",
                Issuer::Moderator(moderator),
            )
            .await;
        let warn_count = session.state().warn_count;

        let committed = session.commit().await;
        self.executor.audit(lifted.record.clone()).await;
        committed?;
        Ok(ActionReport {
            record: lifted.record,
            warn_count,
        })
    }

    /// Ban an actor outright; the stored state is deleted once the ban succeeds
    ///
    /// # Errors
    /// Returns an error if the policy or actor state cannot be loaded or saved.
    pub async fn ban_actor(
        &self,
        group: GroupId,
        actor: ActorId,
        moderator: ActorId,
        reason: &str,
    ) -> ModerationResult<ActionReport> {
        let policy = self.policies.get_policy(group).await?;
        let mut session = self.tracker.acquire(ActorKey::new(group, actor)).await?;

        let enforced = self
            .executor
            .enforce(
                session.state_mut(),
                &policy,
                EnforcementRequest {
                    decision: escalation::Decision::Ban,
                    message: None,
                    reason: reason.to_string(),
                    issuer: Issuer::Moderator(moderator),
                },
            )
            .await;
        if enforced.clear_actor {
            session.clear();
        }
        let warn_count = session.state().warn_count;

        let committed = session.commit().await;
        self.executor.audit(enforced.record.clone()).await;
        committed?;
        Ok(ActionReport {
            record: enforced.record,
            warn_count,
        })
    }

    /// Current warn count; unknown actors have none
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn warn_count(&self, group: GroupId, actor: ActorId) -> ModerationResult<u32> {
        let state = self
            .tracker
            .store()
            .get(ActorKey::new(group, actor))
            .await?;
        Ok(state.map_or(0, |s| s.warn_count))
    }

    /// A group's policy, provisioned with defaults on first use
    ///
    /// # Errors
    /// Returns an error if the policy store fails.
    pub async fn policy(&self, group: GroupId) -> ModerationResult<PolicyConfig> {
        Ok(self.policies.get_policy(group).await?)
    }

    /// Validate and store a policy patch
    ///
    /// # Errors
    /// Returns a policy error if the patched policy is invalid; nothing is stored then.
    pub async fn update_policy(
        &self,
        group: GroupId,
        patch: &PolicyPatch,
    ) -> ModerationResult<PolicyConfig> {
        self.policies.update_policy(group, patch).await
    }
}
