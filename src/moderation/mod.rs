//! Moderation engine
//!
//! Rule evaluation, per-actor state tracking, warn/mute/ban escalation,
//! enforcement against the chat platform and mute expiry sweeping. Nothing in
//! this module knows about Discord; the platform is reached through
//! [`ModerationApi`].

pub mod action;
pub mod audit;
pub mod error;
pub mod escalation;
pub mod executor;
pub mod ids;
pub mod policy;
pub mod rules;
pub mod service;
pub mod state;
pub mod store;
pub mod sweeper;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
pub use action::MockModerationApi;
pub use action::{ActionKind, CallPolicy, ModerationApi};
pub use audit::{AuditSink, EnforcementRecord, Issuer, MemoryAuditLog};
pub use error::{
    ActionError, FailureClass, ModerationError, ModerationResult, PolicyError, StoreError,
};
pub use escalation::Decision;
pub use executor::{EnforcementExecutor, EnforcementOutcome, EnforcementRequest};
pub use ids::{ActorId, ActorKey, GroupId, MessageRef};
pub use policy::{
    ContentKind, MAX_MUTE_MINUTES, PolicyConfig, PolicyKey, PolicyPatch, PolicySetting,
};
pub use rules::{Classification, Evaluation, FloodStage, InboundEvent};
pub use service::{ActionReport, EventOutcome, ModerationService};
pub use state::{ActorState, InvariantViolation, Standing};
pub use store::{ActorStateStore, MemoryActorStore, MemoryPolicyStore, PolicyStore};
pub use sweeper::{MuteSweeper, SweepReport, SweepRequest, SweeperHandle};
pub use tracker::{ActorSession, ActorTracker};
