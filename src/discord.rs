//! Discord binding for the moderation engine
//!
//! Restrictions are member timeouts. Discord caps a timeout at 28 days, so an
//! indefinite restriction is a maximal timeout that the sweeper never lifts.

use crate::moderation::{
    ActionError, ActorId, ContentKind, GroupId, InboundEvent, MessageRef, ModerationApi,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serenity::all::{
    ChannelId, EditMember, GuildId, Http, Message, MessageId, Timestamp, UserId,
};
use std::sync::Arc;
use tracing::debug;

/// Longest timeout Discord accepts
pub const MAX_TIMEOUT_DAYS: i64 = 28;

const VOICE_MESSAGE_FLAG: u64 = 1 << 13;
const HAS_SNAPSHOT_FLAG: u64 = 1 << 14;

impl From<serenity::Error> for ActionError {
    fn from(error: serenity::Error) -> Self {
        let status = match &error {
            serenity::Error::Http(http_error) => http_error.status_code().map(|s| s.as_u16()),
            _ => None,
        };
        match status {
            Some(403) => Self::PermissionDenied(error.to_string()),
            Some(404) => Self::NotFound(error.to_string()),
            Some(429) => Self::RateLimited { retry_after: None },
            _ => Self::Transport(error.to_string()),
        }
    }
}

fn guild(group: GroupId) -> GuildId {
    GuildId::new(group.0)
}

fn user(actor: ActorId) -> UserId {
    UserId::new(actor.0)
}

/// [`ModerationApi`] over the Discord HTTP API
pub struct DiscordModeration {
    http: Arc<Http>,
    /// Last channel each guild was active in, used for notices
    notice_channels: DashMap<GroupId, ChannelId>,
}

impl DiscordModeration {
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            notice_channels: DashMap::new(),
        }
    }

    /// Remember where a guild was last active
    pub fn remember_channel(&self, group: GroupId, channel: ChannelId) {
        self.notice_channels.insert(group, channel);
    }

    async fn notice_channel(&self, group: GroupId) -> Result<ChannelId, ActionError> {
        if let Some(channel) = self.notice_channels.get(&group) {
            return Ok(*channel);
        }
        let partial = guild(group).to_partial_guild(&*self.http).await?;
        partial
            .system_channel_id
            .ok_or_else(|| ActionError::NotFound(format!("no notice channel for guild {group}")))
    }
}

#[async_trait]
impl ModerationApi for DiscordModeration {
    async fn delete_message(&self, group: GroupId, message: MessageRef) -> Result<(), ActionError> {
        debug!(group_id = %group, message_id = message.message_id, "Deleting message");
        ChannelId::new(message.channel_id)
            .delete_message(&*self.http, MessageId::new(message.message_id))
            .await?;
        Ok(())
    }

    async fn restrict(
        &self,
        group: GroupId,
        actor: ActorId,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), ActionError> {
        let until = timeout_deadline(until, Utc::now());
        guild(group)
            .edit_member(
                &*self.http,
                user(actor),
                EditMember::new().disable_communication_until_datetime(until.into()),
            )
            .await?;
        Ok(())
    }

    async fn unrestrict(&self, group: GroupId, actor: ActorId) -> Result<(), ActionError> {
        guild(group)
            .edit_member(&*self.http, user(actor), EditMember::new().enable_communication())
            .await?;
        Ok(())
    }

    async fn ban(&self, group: GroupId, actor: ActorId) -> Result<(), ActionError> {
        guild(group)
            .ban_with_reason(&*self.http, user(actor), 0, "Reached the warning ban threshold")
            .await?;
        Ok(())
    }

    async fn notify_group(&self, group: GroupId, text: String) -> Result<(), ActionError> {
        let channel = self.notice_channel(group).await?;
        channel.say(&*self.http, text).await?;
        Ok(())
    }
}

/// Clamp a requested deadline to what a Discord timeout allows
#[must_use]
pub fn timeout_deadline(until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let max = now + Duration::days(MAX_TIMEOUT_DAYS);
    until.map_or(max, |until| until.min(max))
}

/// The parts of a Discord message that decide its content kind
#[derive(Debug, Clone, Default)]
pub struct MessageTraits<'a> {
    pub text: &'a str,
    /// MIME type of each attachment, when Discord reported one
    pub attachment_types: Vec<Option<&'a str>>,
    pub has_sticker: bool,
    pub is_voice_message: bool,
    pub is_forward: bool,
    pub is_game_invite: bool,
}

impl<'a> MessageTraits<'a> {
    #[must_use]
    pub fn of(msg: &'a Message) -> Self {
        let flags = msg.flags.map_or(0, |f| f.bits());
        Self {
            text: &msg.content,
            attachment_types: msg
                .attachments
                .iter()
                .map(|a| a.content_type.as_deref())
                .collect(),
            has_sticker: !msg.sticker_items.is_empty(),
            is_voice_message: flags & VOICE_MESSAGE_FLAG != 0,
            is_forward: flags & HAS_SNAPSHOT_FLAG != 0,
            is_game_invite: msg.activity.is_some(),
        }
    }

    /// Primary content kind, most specific first
    #[must_use]
    pub fn content_kind(&self) -> ContentKind {
        if self.is_forward {
            return ContentKind::Forward;
        }
        if self.is_voice_message {
            return ContentKind::Voice;
        }
        if self.has_sticker {
            return ContentKind::Sticker;
        }
        if self.is_game_invite {
            return ContentKind::Game;
        }
        if let Some(mime) = self.attachment_types.first() {
            return match mime.unwrap_or_default() {
                "image/gif" => ContentKind::Animation,
                m if m.starts_with("image/") => ContentKind::Photo,
                m if m.starts_with("video/") => ContentKind::Video,
                m if m.starts_with("audio/") => ContentKind::Voice,
                _ => ContentKind::Document,
            };
        }
        ContentKind::Text
    }

    #[must_use]
    pub fn has_link(&self) -> bool {
        self.text.split_whitespace().any(|word| {
            let word = word.trim_start_matches(['<', '(']);
            word.starts_with("http://")
                || word.starts_with("https://")
                || word.starts_with("www.")
                || word.starts_with("discord.gg/")
        })
    }
}

/// Message send time, keeping sub-second precision
#[must_use]
pub fn event_time(timestamp: Timestamp) -> DateTime<Utc> {
    *timestamp
}

/// Build the engine's view of a guild message
#[must_use]
pub fn inbound_event(msg: &Message, group: GroupId, is_from_admin_or_owner: bool) -> InboundEvent {
    let traits = MessageTraits::of(msg);
    let timestamp = event_time(msg.timestamp);
    InboundEvent {
        group,
        actor: ActorId(msg.author.id.get()),
        timestamp,
        content_kind: traits.content_kind(),
        text: (!msg.content.is_empty()).then(|| msg.content.clone()),
        has_link_entity: traits.has_link(),
        is_from_admin_or_owner,
        message: Some(MessageRef {
            channel_id: msg.channel_id.get(),
            message_id: msg.id.get(),
        }),
    }
}
