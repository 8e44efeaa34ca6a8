//! Warn, mute, ban escalation
//!
//! Each violation adds one warn and maps the new count to exactly one action.
//! The ban threshold is checked first, so a policy whose thresholds collapse
//! still produces a single ban instead of a mute and a ban.

use crate::moderation::{ActorState, MAX_MUTE_MINUTES, PolicyConfig};
use chrono::{DateTime, Duration, Utc};

/// The single action a violation escalates to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Warn,
    /// Mute with the deadline to apply once the restriction succeeds
    Mute { until: DateTime<Utc> },
    Ban,
}

/// Count one violation against the actor and decide the action
///
/// Only `warn_count` is changed here; mute fields and ban clearing are applied
/// by the executor after the platform call succeeds.
pub fn register_violation(
    state: &mut ActorState,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> Decision {
    state.warn_count = state.warn_count.saturating_add(1);
    decide(state.warn_count, policy, now)
}

/// Map a warn count to its action without changing anything
#[must_use]
pub fn decide(warn_count: u32, policy: &PolicyConfig, now: DateTime<Utc>) -> Decision {
    if warn_count >= policy.ban_threshold {
        Decision::Ban
    } else if warn_count >= policy.mute_threshold {
        Decision::Mute {
            until: now + policy.default_mute_duration(),
        }
    } else {
        Decision::Warn
    }
}

/// Deadline for a manual mute of `minutes`, falling back to the policy default
///
/// Longer requests are cut to [`MAX_MUTE_MINUTES`].
#[must_use]
pub fn mute_deadline(
    policy: &PolicyConfig,
    minutes: Option<u32>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match minutes {
        Some(m) if m > 0 => now + Duration::minutes(i64::from(m.min(MAX_MUTE_MINUTES))),
        _ => now + policy.default_mute_duration(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{ActorId, ActorKey, GroupId};

    fn state() -> ActorState {
        ActorState::new(ActorKey::new(GroupId(67890), ActorId(12345)))
    }

    #[test]
    fn test_warns_below_threshold_only_count() {
        let policy = PolicyConfig::default();
        let mut state = state();
        let now = Utc::now();
        for n in 1..=2 {
            assert_eq!(register_violation(&mut state, &policy, now), Decision::Warn);
            assert_eq!(state.warn_count, n);
        }
        assert!(!state.is_muted);
    }

    #[test]
    fn test_full_escalation_ladder() {
        let policy = PolicyConfig::default();
        let mut state = state();
        let now = Utc::now();

        let decisions: Vec<_> = (0..5)
            .map(|_| register_violation(&mut state, &policy, now))
            .collect();
        let until = now + Duration::minutes(60);
        assert_eq!(
            decisions,
            vec![
                Decision::Warn,
                Decision::Warn,
                Decision::Mute { until },
                Decision::Mute { until },
                Decision::Ban,
            ]
        );
        assert!(!state.is_muted, "mute fields are left to the executor");
    }

    #[test]
    fn test_ban_wins_when_thresholds_coincide() {
        let policy = PolicyConfig {
            mute_threshold: 2,
            ban_threshold: 2,
            ..PolicyConfig::default()
        };
        let mut state = state();
        state.warn_count = 1;
        assert_eq!(register_violation(&mut state, &policy, Utc::now()), Decision::Ban);
    }

    #[test]
    fn test_warn_count_saturates() {
        let mut state = state();
        state.warn_count = u32::MAX;
        let decision = register_violation(&mut state, &PolicyConfig::default(), Utc::now());
        assert_eq!(state.warn_count, u32::MAX);
        assert_eq!(decision, Decision::Ban);
    }

    #[test]
    fn test_mute_deadline() {
        let policy = PolicyConfig::default();
        let now = Utc::now();
        assert_eq!(mute_deadline(&policy, Some(15), now), now + Duration::minutes(15));
        assert_eq!(mute_deadline(&policy, None, now), now + Duration::minutes(60));
        assert_eq!(mute_deadline(&policy, Some(0), now), now + Duration::minutes(60));
        assert_eq!(
            mute_deadline(&policy, Some(90 * 24 * 60), now),
            now + Duration::days(28)
        );
    }
}
