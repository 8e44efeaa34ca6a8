use crate::discord::inbound_event;
use crate::moderation::{EventOutcome, GroupId};
use crate::{Data, EVENT_TARGET};
use poise::serenity_prelude::{
    self as serenity, Context, EventHandler, GuildId, Message, Ready, UserId,
};
use tracing::{error, info, warn};

pub struct Handler;

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    /// Every guild message from a human goes through the moderation engine.
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(data) = ctx.data.read().await.get::<Data>().cloned() else {
            warn!(target: EVENT_TARGET, "Message received before data was registered");
            return;
        };

        let group = GroupId(guild_id.get());
        data.discord.remember_channel(group, msg.channel_id);
        let privileged = is_admin_or_owner(&ctx, guild_id, msg.author.id);
        let event = inbound_event(&msg, group, privileged);

        match data.service.handle_event(&event).await {
            Ok(EventOutcome::Enforced {
                classification,
                action,
                succeeded,
            }) => info!(
                target: EVENT_TARGET,
                guild_id = %guild_id,
                user_id = %msg.author.id,
                violation = %classification,
                action = %action,
                succeeded,
                "Violation handled"
            ),
            Ok(_) => {}
            Err(e) => error!(
                target: EVENT_TARGET,
                guild_id = %guild_id,
                user_id = %msg.author.id,
                error = %e,
                "Failed to moderate message"
            ),
        }
    }
}

/// Owners and administrators are never moderated
fn is_admin_or_owner(ctx: &Context, guild_id: GuildId, user_id: UserId) -> bool {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return false;
    };
    if guild.owner_id == user_id {
        return true;
    }
    guild
        .members
        .get(&user_id)
        .is_some_and(|member| guild.member_permissions(member).administrator())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_implements_event_handler() {
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }
}
