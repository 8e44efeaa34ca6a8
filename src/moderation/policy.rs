//! Per-group moderation policy
//!
//! Policies are plain structs with a fixed set of fields. Changes arrive as
//! [`PolicySetting`] values, parsed from `(key, value)` strings at the command
//! boundary so unknown keys never reach the engine.

use crate::moderation::PolicyError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Kind of content carried by a message, in lock priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentKind {
    /// Plain text, never lockable
    Text,
    Photo,
    Video,
    /// Text carrying a link entity
    Link,
    Forward,
    Sticker,
    Animation,
    Voice,
    Document,
    VideoNote,
    Poll,
    Game,
}

impl ContentKind {
    /// Every lockable kind, in the order locks are checked
    pub const LOCKABLE: [Self; 11] = [
        Self::Photo,
        Self::Video,
        Self::Link,
        Self::Forward,
        Self::Sticker,
        Self::Animation,
        Self::Voice,
        Self::Document,
        Self::VideoNote,
        Self::Poll,
        Self::Game,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Link => "link",
            Self::Forward => "forward",
            Self::Sticker => "sticker",
            Self::Animation => "animation",
            Self::Voice => "voice",
            Self::Document => "document",
            Self::VideoNote => "videonote",
            Self::Poll => "poll",
            Self::Game => "game",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        match lowered.as_str() {
            "gif" => return Ok(Self::Animation),
            "video_note" => return Ok(Self::VideoNote),
            _ => {}
        }
        Self::LOCKABLE
            .into_iter()
            .find(|kind| kind.as_str() == lowered)
            .ok_or_else(|| PolicyError::UnknownContentKind(s.to_string()))
    }
}

/// Longest mute the engine will record, matching the platform's timeout limit
pub const MAX_MUTE_MINUTES: u32 = 28 * 24 * 60;

/// Moderation policy for one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub flood_enabled: bool,
    /// Messages allowed per flood window
    pub flood_limit: u32,
    pub flood_window_seconds: u32,
    pub mute_threshold: u32,
    pub ban_threshold: u32,
    pub default_mute_minutes: u32,
    pub media_locks: BTreeSet<ContentKind>,
    /// Stored lowercase
    pub forbidden_words: BTreeSet<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            flood_enabled: true,
            flood_limit: 5,
            flood_window_seconds: 10,
            mute_threshold: 3,
            ban_threshold: 5,
            default_mute_minutes: 60,
            media_locks: BTreeSet::new(),
            forbidden_words: BTreeSet::new(),
        }
    }
}

impl PolicyConfig {
    #[must_use]
    pub fn flood_window(&self) -> Duration {
        Duration::seconds(i64::from(self.flood_window_seconds))
    }

    #[must_use]
    pub fn default_mute_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.default_mute_minutes))
    }

    /// Validate the relationships the engine expects but does not require
    ///
    /// # Errors
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.flood_limit == 0 {
            return Err(PolicyError::Zero("flood_limit"));
        }
        if self.flood_window_seconds == 0 {
            return Err(PolicyError::Zero("flood_window_seconds"));
        }
        if self.mute_threshold == 0 {
            return Err(PolicyError::Zero("mute_threshold"));
        }
        if self.ban_threshold == 0 {
            return Err(PolicyError::Zero("ban_threshold"));
        }
        if self.default_mute_minutes == 0 {
            return Err(PolicyError::Zero("default_mute_minutes"));
        }
        if self.default_mute_minutes > MAX_MUTE_MINUTES {
            return Err(PolicyError::TooLarge(
                "default_mute_minutes",
                MAX_MUTE_MINUTES,
            ));
        }
        if self.mute_threshold > self.ban_threshold {
            return Err(PolicyError::ThresholdOrder {
                mute: self.mute_threshold,
                ban: self.ban_threshold,
            });
        }
        if self.forbidden_words.iter().any(String::is_empty) {
            return Err(PolicyError::EmptyWord);
        }
        Ok(())
    }

    /// Case-fold and trim forbidden words, dropping empty ones
    pub fn normalize(&mut self) {
        self.forbidden_words = std::mem::take(&mut self.forbidden_words)
            .into_iter()
            .map(|word| word.trim().to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
    }

    /// Apply a single setting without validating the result
    pub fn apply(&mut self, setting: PolicySetting) {
        match setting {
            PolicySetting::FloodEnabled(enabled) => self.flood_enabled = enabled,
            PolicySetting::FloodLimit(limit) => self.flood_limit = limit,
            PolicySetting::FloodWindowSeconds(seconds) => self.flood_window_seconds = seconds,
            PolicySetting::MuteThreshold(count) => self.mute_threshold = count,
            PolicySetting::BanThreshold(count) => self.ban_threshold = count,
            PolicySetting::DefaultMuteMinutes(minutes) => self.default_mute_minutes = minutes,
            PolicySetting::Lock(kind) => {
                self.media_locks.insert(kind);
            }
            PolicySetting::Unlock(kind) => {
                self.media_locks.remove(&kind);
            }
            PolicySetting::AddForbiddenWord(word) => {
                self.forbidden_words.insert(word.to_lowercase());
            }
            PolicySetting::RemoveForbiddenWord(word) => {
                self.forbidden_words.remove(&word.to_lowercase());
            }
        }
    }

    /// Apply a patch and validate the outcome, leaving `self` untouched on error
    ///
    /// # Errors
    /// Returns a `PolicyError` if the patched policy is invalid.
    pub fn patched(&self, patch: &PolicyPatch) -> Result<Self, PolicyError> {
        let mut next = self.clone();
        for setting in &patch.0 {
            next.apply(setting.clone());
        }
        next.validate()?;
        Ok(next)
    }
}

/// Policy keys accepted at the command boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKey {
    Flood,
    FloodLimit,
    FloodWindow,
    MuteThreshold,
    BanThreshold,
    MuteMinutes,
    Lock,
    Unlock,
    AddWord,
    RemoveWord,
}

impl FromStr for PolicyKey {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "flood" => Ok(Self::Flood),
            "flood_limit" => Ok(Self::FloodLimit),
            "flood_window" => Ok(Self::FloodWindow),
            "mute_threshold" => Ok(Self::MuteThreshold),
            "ban_threshold" => Ok(Self::BanThreshold),
            "mute_minutes" => Ok(Self::MuteMinutes),
            "lock" => Ok(Self::Lock),
            "unlock" => Ok(Self::Unlock),
            "add_word" => Ok(Self::AddWord),
            "remove_word" => Ok(Self::RemoveWord),
            _ => Err(PolicyError::UnknownKey(s.to_string())),
        }
    }
}

/// One typed change to a policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySetting {
    FloodEnabled(bool),
    FloodLimit(u32),
    FloodWindowSeconds(u32),
    MuteThreshold(u32),
    BanThreshold(u32),
    DefaultMuteMinutes(u32),
    Lock(ContentKind),
    Unlock(ContentKind),
    AddForbiddenWord(String),
    RemoveForbiddenWord(String),
}

impl PolicySetting {
    /// Decode a `(key, value)` pair into a setting
    ///
    /// # Errors
    /// Returns a `PolicyError` for unknown keys or malformed values.
    pub fn parse(key: &str, value: &str) -> Result<Self, PolicyError> {
        let invalid = || PolicyError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let number = || value.trim().parse::<u32>().map_err(|_| invalid());

        let setting = match key.parse::<PolicyKey>()? {
            PolicyKey::Flood => match value.trim().to_lowercase().as_str() {
                "on" | "true" | "yes" => Self::FloodEnabled(true),
                "off" | "false" | "no" => Self::FloodEnabled(false),
                _ => return Err(invalid()),
            },
            PolicyKey::FloodLimit => Self::FloodLimit(number()?),
            PolicyKey::FloodWindow => Self::FloodWindowSeconds(number()?),
            PolicyKey::MuteThreshold => Self::MuteThreshold(number()?),
            PolicyKey::BanThreshold => Self::BanThreshold(number()?),
            PolicyKey::MuteMinutes => Self::DefaultMuteMinutes(number()?),
            PolicyKey::Lock => Self::Lock(lockable(value)?),
            PolicyKey::Unlock => Self::Unlock(lockable(value)?),
            word_key @ (PolicyKey::AddWord | PolicyKey::RemoveWord) => {
                let word = value.trim().to_lowercase();
                if word.is_empty() {
                    return Err(PolicyError::EmptyWord);
                }
                if word_key == PolicyKey::AddWord {
                    Self::AddForbiddenWord(word)
                } else {
                    Self::RemoveForbiddenWord(word)
                }
            }
        };
        Ok(setting)
    }
}

fn lockable(value: &str) -> Result<ContentKind, PolicyError> {
    let kind = value.parse::<ContentKind>()?;
    if kind == ContentKind::Text {
        return Err(PolicyError::UnknownContentKind(value.to_string()));
    }
    Ok(kind)
}

/// A validated batch of settings applied atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyPatch(pub Vec<PolicySetting>);

impl From<PolicySetting> for PolicyPatch {
    fn from(setting: PolicySetting) -> Self {
        Self(vec![setting])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let policy = PolicyConfig::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.flood_limit, 5);
        assert_eq!(policy.flood_window_seconds, 10);
        assert_eq!(policy.mute_threshold, 3);
        assert_eq!(policy.ban_threshold, 5);
        assert_eq!(policy.default_mute_duration(), Duration::minutes(60));
    }

    #[test]
    fn test_parse_settings() {
        assert_eq!(
            PolicySetting::parse("flood", "off").unwrap(),
            PolicySetting::FloodEnabled(false)
        );
        assert_eq!(
            PolicySetting::parse("Mute-Threshold", "4").unwrap(),
            PolicySetting::MuteThreshold(4)
        );
        assert_eq!(
            PolicySetting::parse("lock", "gif").unwrap(),
            PolicySetting::Lock(ContentKind::Animation)
        );
        assert_eq!(
            PolicySetting::parse("add_word", "  SPAM ").unwrap(),
            PolicySetting::AddForbiddenWord("spam".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_unknown_keys_and_values() {
        assert_eq!(
            PolicySetting::parse("welcome", "hi"),
            Err(PolicyError::UnknownKey("welcome".to_string()))
        );
        assert!(matches!(
            PolicySetting::parse("flood_limit", "many"),
            Err(PolicyError::InvalidValue { .. })
        ));
        assert!(matches!(
            PolicySetting::parse("lock", "text"),
            Err(PolicyError::UnknownContentKind(_))
        ));
        assert_eq!(
            PolicySetting::parse("add_word", "   "),
            Err(PolicyError::EmptyWord)
        );
    }

    #[test]
    fn test_patch_validates_threshold_order() {
        let policy = PolicyConfig::default();
        let patch = PolicyPatch::from(PolicySetting::MuteThreshold(6));
        assert_eq!(
            policy.patched(&patch),
            Err(PolicyError::ThresholdOrder { mute: 6, ban: 5 })
        );

        let patch = PolicyPatch(vec![
            PolicySetting::BanThreshold(8),
            PolicySetting::MuteThreshold(6),
        ]);
        let next = policy.patched(&patch).unwrap();
        assert_eq!(next.mute_threshold, 6);
        assert_eq!(next.ban_threshold, 8);
    }

    #[test]
    fn test_lock_and_word_settings() {
        let mut policy = PolicyConfig::default();
        policy.apply(PolicySetting::Lock(ContentKind::Sticker));
        policy.apply(PolicySetting::AddForbiddenWord("Casino".to_string()));
        assert!(policy.media_locks.contains(&ContentKind::Sticker));
        assert!(policy.forbidden_words.contains("casino"));

        policy.apply(PolicySetting::Unlock(ContentKind::Sticker));
        policy.apply(PolicySetting::RemoveForbiddenWord("CASINO".to_string()));
        assert!(policy.media_locks.is_empty());
        assert!(policy.forbidden_words.is_empty());
    }

    #[test]
    fn test_yaml_words_are_case_folded() {
        let mut policy: PolicyConfig =
            serde_yaml::from_str("forbidden_words: [SPAM, ' Casino ', '']").unwrap();
        policy.normalize();
        assert!(policy.validate().is_ok());
        assert_eq!(
            policy.forbidden_words.iter().collect::<Vec<_>>(),
            ["casino", "spam"]
        );
    }

    #[test]
    fn test_mute_length_is_bounded() {
        let policy = PolicyConfig::default();
        let patch = PolicyPatch::from(PolicySetting::DefaultMuteMinutes(MAX_MUTE_MINUTES + 1));
        assert_eq!(
            policy.patched(&patch),
            Err(PolicyError::TooLarge("default_mute_minutes", MAX_MUTE_MINUTES))
        );
        let patch = PolicyPatch::from(PolicySetting::DefaultMuteMinutes(MAX_MUTE_MINUTES));
        assert!(policy.patched(&patch).is_ok());
    }

    #[test]
    fn test_policy_serialization() {
        let mut policy = PolicyConfig::default();
        policy.media_locks.insert(ContentKind::Photo);
        let serialized = serde_yaml::to_string(&policy).expect("Failed to serialize");
        assert!(serialized.contains("flood_limit: 5"));
        assert!(serialized.contains("Photo"));

        let partial: PolicyConfig =
            serde_yaml::from_str("ban_threshold: 7").expect("Failed to deserialize");
        assert_eq!(partial.ban_threshold, 7);
        assert_eq!(partial.mute_threshold, 3);
    }
}
