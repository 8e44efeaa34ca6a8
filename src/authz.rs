//! Permission gating for moderator commands
//!
//! A pure check composed in front of every command before the engine is
//! called. The engine itself never looks at permissions.

use poise::serenity_prelude::{Permissions, UserId};
use std::fmt;

/// A right needed to run a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageMessages,
    ModerateMembers,
    BanMembers,
    ManageGuild,
}

impl Capability {
    #[must_use]
    pub fn permission(self) -> Permissions {
        match self {
            Self::ManageMessages => Permissions::MANAGE_MESSAGES,
            Self::ModerateMembers => Permissions::MODERATE_MEMBERS,
            Self::BanMembers => Permissions::BAN_MEMBERS,
            Self::ManageGuild => Permissions::MANAGE_GUILD,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManageMessages => write!(f, "Manage Messages"),
            Self::ModerateMembers => write!(f, "Moderate Members"),
            Self::BanMembers => write!(f, "Ban Members"),
            Self::ManageGuild => write!(f, "Manage Server"),
        }
    }
}

/// The member invoking a command
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub is_owner: bool,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(String),
}

fn holds(permissions: Permissions, required: Capability) -> bool {
    permissions.administrator() || permissions.contains(required.permission())
}

/// Decide whether a command may run
///
/// The bot's own rights are checked first when they are known, so a caller
/// is told about a misconfigured bot role before being told they lack rights.
#[must_use]
pub fn check_capability(caller: &Caller, bot: Option<Permissions>, required: Capability) -> Access {
    if let Some(bot) = bot {
        if !holds(bot, required) {
            return Access::Deny(format!(
                "I need the '{required}' permission for this. Please check my role."
            ));
        }
    }
    if caller.is_owner || holds(caller.permissions, required) {
        Access::Allow
    } else {
        Access::Deny(format!(
            "You need the '{required}' permission to use this command."
        ))
    }
}

/// The member a moderator command acts on
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub id: UserId,
    /// Server owner or administrator
    pub is_privileged: bool,
}

/// Refuse to act on the caller themselves, the bot, or a privileged member
#[must_use]
pub fn check_target(caller: UserId, bot: UserId, target: &Target, verb: &str) -> Access {
    if target.id == caller {
        Access::Deny(format!("You cannot {verb} yourself."))
    } else if target.id == bot {
        Access::Deny(format!("I cannot {verb} myself."))
    } else if target.is_privileged {
        Access::Deny(format!("I cannot {verb} the server owner or an administrator."))
    } else {
        Access::Allow
    }
}
