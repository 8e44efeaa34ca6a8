//! Identifier newtypes shared across the engine

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// A group chat (a Discord guild)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct GroupId(pub u64);

/// A participant whose events are evaluated within a group
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct ActorId(pub u64);

/// Key of one actor's moderation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[display("{actor}@{group}")]
pub struct ActorKey {
    pub group: GroupId,
    pub actor: ActorId,
}

impl ActorKey {
    #[must_use]
    pub fn new(group: GroupId, actor: ActorId) -> Self {
        Self { group, actor }
    }
}

/// Location of a message on the platform, needed to delete it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_key_display() {
        let key = ActorKey::new(GroupId(67890), ActorId(12345));
        assert_eq!(key.to_string(), "12345@67890");
        assert_eq!(key.group, GroupId(67890));
        assert_eq!(key.actor, ActorId(12345));
    }
}
