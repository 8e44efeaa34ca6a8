//! Per-actor moderation state and its invariants

use crate::moderation::{ActorId, ActorKey, GroupId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Durable moderation state for one actor in one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorState {
    pub group: GroupId,
    pub actor: ActorId,
    pub warn_count: u32,
    pub is_muted: bool,
    /// Present iff `is_muted`
    pub mute_until: Option<DateTime<Utc>>,
    pub flood_window_start: Option<DateTime<Utc>>,
    pub flood_count: u32,
}

/// Coarse escalation standing derived from an `ActorState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    Clean,
    Warned(u32),
    Muted(DateTime<Utc>),
}

/// An inconsistency found in a loaded state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    MutedWithoutDeadline,
    DeadlineWithoutMute,
    FloodCountWithoutWindow,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MutedWithoutDeadline => write!(f, "muted with no mute_until"),
            Self::DeadlineWithoutMute => write!(f, "mute_until set on an unmuted actor"),
            Self::FloodCountWithoutWindow => write!(f, "flood_count set with no window start"),
        }
    }
}

impl ActorState {
    /// A clean state for a newly observed actor
    #[must_use]
    pub fn new(key: ActorKey) -> Self {
        Self {
            group: key.group,
            actor: key.actor,
            warn_count: 0,
            is_muted: false,
            mute_until: None,
            flood_window_start: None,
            flood_count: 0,
        }
    }

    #[must_use]
    pub fn key(&self) -> ActorKey {
        ActorKey::new(self.group, self.actor)
    }

    #[must_use]
    pub fn standing(&self) -> Standing {
        match (self.is_muted, self.mute_until) {
            (true, Some(until)) => Standing::Muted(until),
            _ if self.warn_count > 0 => Standing::Warned(self.warn_count),
            _ => Standing::Clean,
        }
    }

    /// Whether a mute is recorded and its deadline has passed
    #[must_use]
    pub fn mute_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_muted && self.mute_until.is_some_and(|until| until <= now)
    }

    /// Whether a mute is recorded and still running
    #[must_use]
    pub fn mute_active(&self, now: DateTime<Utc>) -> bool {
        self.is_muted && self.mute_until.is_some_and(|until| until > now)
    }

    pub fn mark_muted(&mut self, until: DateTime<Utc>) {
        self.is_muted = true;
        self.mute_until = Some(until);
    }

    pub fn clear_mute(&mut self) {
        self.is_muted = false;
        self.mute_until = None;
    }

    /// Clamp inconsistent fields to safe defaults, returning what was fixed
    pub fn sanitize(&mut self) -> Vec<InvariantViolation> {
        let mut fixed = Vec::new();
        if self.is_muted && self.mute_until.is_none() {
            self.is_muted = false;
            fixed.push(InvariantViolation::MutedWithoutDeadline);
        }
        if !self.is_muted && self.mute_until.is_some() {
            self.mute_until = None;
            fixed.push(InvariantViolation::DeadlineWithoutMute);
        }
        if self.flood_window_start.is_none() && self.flood_count > 0 {
            self.flood_count = 0;
            fixed.push(InvariantViolation::FloodCountWithoutWindow);
        }
        fixed
    }
}
