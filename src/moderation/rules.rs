//! Rule evaluators
//!
//! Pure classifiers for one inbound event. Rules run in a fixed priority order
//! (flood, forbidden word, locked media) and the first match wins. The flood
//! rule also stages the counter update, which the caller commits together with
//! the verdict so a retried event is never counted twice.
//!
//! The flood counter is a fixed window, not a sliding log: a burst straddling a
//! window boundary can briefly exceed the nominal rate.

use crate::moderation::{ActorId, ActorState, ContentKind, GroupId, MessageRef, PolicyConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A chat event as delivered by the platform adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub group: GroupId,
    pub actor: ActorId,
    pub timestamp: DateTime<Utc>,
    pub content_kind: ContentKind,
    pub text: Option<String>,
    pub has_link_entity: bool,
    pub is_from_admin_or_owner: bool,
    /// Where to delete the message from, when the platform allows it
    pub message: Option<MessageRef>,
}

/// Verdict for one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    None,
    Flood,
    ForbiddenWord(String),
    LockedMedia(ContentKind),
}

impl Classification {
    #[must_use]
    pub fn is_violation(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Flood => write!(f, "flooding"),
            Self::ForbiddenWord(word) => write!(f, "forbidden word '{word}'"),
            Self::LockedMedia(kind) => write!(f, "locked content ({kind})"),
        }
    }
}

/// Flood counter values to commit alongside the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloodStage {
    pub window_start: DateTime<Utc>,
    pub count: u32,
    pub exceeded: bool,
}

impl FloodStage {
    pub fn commit(self, state: &mut ActorState) {
        state.flood_window_start = Some(self.window_start);
        state.flood_count = self.count;
    }
}

/// Result of running every rule against one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub classification: Classification,
    pub flood: Option<FloodStage>,
}

/// Classify an event without touching the actor state
#[must_use]
pub fn evaluate(event: &InboundEvent, policy: &PolicyConfig, state: &ActorState) -> Evaluation {
    let flood = policy
        .flood_enabled
        .then(|| stage_flood(event.timestamp, policy, state));

    let classification = if flood.is_some_and(|stage| stage.exceeded) {
        Classification::Flood
    } else if let Some(word) = forbidden_word(event, policy) {
        Classification::ForbiddenWord(word)
    } else if let Some(kind) = locked_media(event, policy) {
        Classification::LockedMedia(kind)
    } else {
        Classification::None
    };

    Evaluation {
        classification,
        flood,
    }
}

/// Compute the next flood window values for a message sent at `now`
#[must_use]
pub fn stage_flood(now: DateTime<Utc>, policy: &PolicyConfig, state: &ActorState) -> FloodStage {
    let (window_start, count) = match state.flood_window_start {
        Some(start) if now - start < policy.flood_window() => {
            (start, state.flood_count.saturating_add(1))
        }
        _ => (now, 1),
    };
    FloodStage {
        window_start,
        count,
        exceeded: count > policy.flood_limit,
    }
}

/// First forbidden word contained in the message text, ignoring case
#[must_use]
pub fn forbidden_word(event: &InboundEvent, policy: &PolicyConfig) -> Option<String> {
    let text = event.text.as_deref()?.to_lowercase();
    policy
        .forbidden_words
        .iter()
        .filter(|word| !word.is_empty())
        .find(|word| text.contains(word.as_str()))
        .cloned()
}

/// First locked content kind the event exhibits
#[must_use]
pub fn locked_media(event: &InboundEvent, policy: &PolicyConfig) -> Option<ContentKind> {
    if policy.media_locks.is_empty() {
        return None;
    }
    ContentKind::LOCKABLE.into_iter().find(|kind| {
        policy.media_locks.contains(kind)
            && match kind {
                ContentKind::Link => event.has_link_entity,
                other => event.content_kind == *other,
            }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::ActorKey;
    use chrono::Duration;

    fn event_at(timestamp: DateTime<Utc>, text: &str) -> InboundEvent {
        InboundEvent {
            group: GroupId(67890),
            actor: ActorId(12345),
            timestamp,
            content_kind: ContentKind::Text,
            text: Some(text.to_string()),
            has_link_entity: false,
            is_from_admin_or_owner: false,
            message: None,
        }
    }

    fn fresh_state() -> ActorState {
        ActorState::new(ActorKey::new(GroupId(67890), ActorId(12345)))
    }

    #[test]
    fn test_sixth_message_in_window_is_flood() {
        let policy = PolicyConfig::default();
        let mut state = fresh_state();
        let start = Utc::now();

        for i in 0..5 {
            let event = event_at(start + Duration::seconds(i), "hello");
            let evaluation = evaluate(&event, &policy, &state);
            assert_eq!(evaluation.classification, Classification::None);
            evaluation.flood.unwrap().commit(&mut state);
        }
        assert_eq!(state.flood_count, 5);

        let event = event_at(start + Duration::seconds(9), "hello");
        let evaluation = evaluate(&event, &policy, &state);
        assert_eq!(evaluation.classification, Classification::Flood);
        assert_eq!(evaluation.flood.unwrap().count, 6);
    }

    #[test]
    fn test_spaced_messages_never_accumulate() {
        let policy = PolicyConfig::default();
        let mut state = fresh_state();
        let start = Utc::now();

        for i in 0..20 {
            let event = event_at(start + Duration::seconds(11 * i), "hello");
            let evaluation = evaluate(&event, &policy, &state);
            let stage = evaluation.flood.unwrap();
            assert_eq!(stage.count, 1);
            stage.commit(&mut state);
        }
        assert_eq!(state.flood_count, 1);
    }

    #[test]
    fn test_window_resets_exactly_at_boundary() {
        let policy = PolicyConfig::default();
        let mut state = fresh_state();
        let start = Utc::now();
        state.flood_window_start = Some(start);
        state.flood_count = 5;

        let stage = stage_flood(start + Duration::seconds(10), &policy, &state);
        assert_eq!(stage.count, 1);
        assert_eq!(stage.window_start, start + Duration::seconds(10));
    }

    #[test]
    fn test_evaluation_does_not_mutate_state() {
        let policy = PolicyConfig::default();
        let state = fresh_state();
        let before = state.clone();
        let _ = evaluate(&event_at(Utc::now(), "hello"), &policy, &state);
        assert_eq!(state, before);
    }

    #[test]
    fn test_flood_disabled_stages_nothing() {
        let policy = PolicyConfig {
            flood_enabled: false,
            ..PolicyConfig::default()
        };
        let evaluation = evaluate(&event_at(Utc::now(), "hello"), &policy, &fresh_state());
        assert!(evaluation.flood.is_none());
        assert_eq!(evaluation.classification, Classification::None);
    }

    #[test]
    fn test_forbidden_word_ignores_case() {
        let mut policy = PolicyConfig::default();
        policy.forbidden_words.insert("spam".to_string());
        let evaluation = evaluate(&event_at(Utc::now(), "this is SPAM"), &policy, &fresh_state());
        assert_eq!(
            evaluation.classification,
            Classification::ForbiddenWord("spam".to_string())
        );
    }

    #[test]
    fn test_flood_takes_priority_over_forbidden_word() {
        let mut policy = PolicyConfig::default();
        policy.forbidden_words.insert("spam".to_string());
        let mut state = fresh_state();
        let now = Utc::now();
        state.flood_window_start = Some(now);
        state.flood_count = 5;

        let evaluation = evaluate(&event_at(now, "spam"), &policy, &state);
        assert_eq!(evaluation.classification, Classification::Flood);
    }

    #[test]
    fn test_locked_media() {
        let mut policy = PolicyConfig::default();
        policy.media_locks.insert(ContentKind::Sticker);
        policy.media_locks.insert(ContentKind::Link);

        let mut event = event_at(Utc::now(), "");
        event.content_kind = ContentKind::Sticker;
        assert_eq!(locked_media(&event, &policy), Some(ContentKind::Sticker));

        let mut event = event_at(Utc::now(), "see https://example.com");
        event.has_link_entity = true;
        assert_eq!(locked_media(&event, &policy), Some(ContentKind::Link));

        let mut event = event_at(Utc::now(), "");
        event.content_kind = ContentKind::Photo;
        assert_eq!(locked_media(&event, &policy), None);
    }

    #[test]
    fn test_lock_priority_follows_kind_order() {
        let mut policy = PolicyConfig::default();
        policy.media_locks.insert(ContentKind::Photo);
        policy.media_locks.insert(ContentKind::Link);

        let mut event = event_at(Utc::now(), "caption https://example.com");
        event.content_kind = ContentKind::Photo;
        event.has_link_entity = true;
        assert_eq!(locked_media(&event, &policy), Some(ContentKind::Photo));
    }
}
