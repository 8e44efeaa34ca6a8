//! Error types for the moderation engine
//!
//! External action failures are split into permanent and transient classes,
//! which decide how much of a staged state change survives a failed call.

use std::time::Duration;
use thiserror::Error;

/// How a failed external call should be treated by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retrying will not help (missing rights, target gone)
    Permanent,
    /// Network trouble, rate limiting or a timeout
    Transient,
}

/// Errors returned by calls into the chat platform
#[derive(Debug, Error)]
pub enum ActionError {
    /// The bot lacks the rights needed for the call
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The message, member or group no longer exists
    #[error("Target not found: {0}")]
    NotFound(String),

    /// The platform asked us to slow down
    #[error("Rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// The call did not complete within the configured bound
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Any other transport or server error
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ActionError {
    #[must_use]
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::PermissionDenied(_) | Self::NotFound(_) => FailureClass::Permanent,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Transport(_) => {
                FailureClass::Transient
            }
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.failure_class() == FailureClass::Transient
    }
}

/// Errors raised by policy, actor state and audit stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while validating or patching a policy
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Unknown policy key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Unknown content kind: {0}")]
    UnknownContentKind(String),

    #[error("Mute threshold {mute} is above ban threshold {ban}")]
    ThresholdOrder { mute: u32, ban: u32 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{0} must be at most {1}")]
    TooLarge(&'static str, u32),

    #[error("Forbidden word must not be empty")]
    EmptyWord,
}

/// Engine-level errors; these abort the current event only
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Result type for engine operations
pub type ModerationResult<T> = Result<T, ModerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classes() {
        assert_eq!(
            ActionError::PermissionDenied("ban members".into()).failure_class(),
            FailureClass::Permanent
        );
        assert_eq!(
            ActionError::NotFound("message".into()).failure_class(),
            FailureClass::Permanent
        );
        assert!(ActionError::RateLimited { retry_after: None }.is_transient());
        assert!(ActionError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(ActionError::Transport("reset by peer".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let error = PolicyError::ThresholdOrder { mute: 6, ban: 5 };
        assert_eq!(error.to_string(), "Mute threshold 6 is above ban threshold 5");

        let error = ModerationError::from(StoreError::Unavailable("down".to_string()));
        assert_eq!(error.to_string(), "Store unavailable: down");
    }
}
