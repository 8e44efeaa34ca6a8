use crate::authz::{Access, Caller, Capability, Target, check_capability, check_target};
use crate::moderation::{ActionReport, ActorId, GroupId, PolicyConfig, PolicySetting};
use crate::{Context, Error};
use poise::command;
use poise::serenity_prelude::{Permissions, User, UserId};

/// Caller and bot permissions from the guild cache
///
/// Slash interactions carry the caller's resolved permissions, which are
/// preferred over the cached member.
fn cached_permissions(
    ctx: Context<'_>,
    interaction: Option<Permissions>,
) -> Option<(Caller, Option<Permissions>)> {
    let guild = ctx.guild()?;
    let author = ctx.author().id;
    let bot_id = ctx.cache().current_user().id;

    let permissions = interaction
        .or_else(|| {
            guild
                .members
                .get(&author)
                .map(|member| guild.member_permissions(member))
        })
        .unwrap_or_else(Permissions::empty);
    let caller = Caller {
        is_owner: guild.owner_id == author,
        permissions,
    };
    let bot = guild
        .members
        .get(&bot_id)
        .map(|member| guild.member_permissions(member));
    Some((caller, bot))
}

/// Gate a command on a capability, replying with the reason when denied
async fn authorize(ctx: Context<'_>, required: Capability, bot_acts: bool) -> Result<bool, Error> {
    let interaction = ctx.author_member().await.and_then(|m| m.permissions);
    let Some((caller, bot)) = cached_permissions(ctx, interaction) else {
        ctx.say("I can't see this server yet, try again in a moment.")
            .await?;
        return Ok(false);
    };
    match check_capability(&caller, bot.filter(|_| bot_acts), required) {
        Access::Allow => Ok(true),
        Access::Deny(reason) => {
            ctx.say(reason).await?;
            Ok(false)
        }
    }
}

fn target_is_privileged(ctx: Context<'_>, target: UserId) -> bool {
    let Some(guild) = ctx.guild() else {
        return false;
    };
    guild.owner_id == target
        || guild
            .members
            .get(&target)
            .is_some_and(|member| guild.member_permissions(member).administrator())
}

/// Refuse to act on the caller, the bot or a privileged member
async fn guard_target(ctx: Context<'_>, user: &User, verb: &str) -> Result<bool, Error> {
    let target = Target {
        id: user.id,
        is_privileged: target_is_privileged(ctx, user.id),
    };
    let bot = ctx.cache().current_user().id;
    match check_target(ctx.author().id, bot, &target, verb) {
        Access::Allow => Ok(true),
        Access::Deny(reason) => {
            ctx.say(reason).await?;
            Ok(false)
        }
    }
}

fn ids(ctx: Context<'_>, user: &User) -> Result<(GroupId, ActorId, ActorId), Error> {
    let guild_id = ctx.guild_id().ok_or("This command only works in a server")?;
    Ok((
        GroupId(guild_id.get()),
        ActorId(user.id.get()),
        ActorId(ctx.author().id.get()),
    ))
}

fn describe_report(user: UserId, report: &ActionReport) -> String {
    let record = &report.record;
    if record.succeeded {
        format!(
            "{} applied to <@{}>. Warnings: {}.",
            record.action, user, report.warn_count
        )
    } else {
        format!(
            "{} on <@{}> failed: {}",
            record.action,
            user,
            record.error.as_deref().unwrap_or("unknown error")
        )
    }
}

fn describe_policy(policy: &PolicyConfig) -> String {
    let join = |items: Vec<String>| {
        if items.is_empty() {
            "none".to_string()
        } else {
            items.join(", ")
        }
    };
    let locks = join(policy.media_locks.iter().map(ToString::to_string).collect());
    let words = join(policy.forbidden_words.iter().cloned().collect());
    format!(
        "**Moderation policy**\n\
         Flood: {} ({} messages per {}s)\n\
         Mute at {} warnings, ban at {}\n\
         Default mute: {} minutes\n\
         Locked: {locks}\n\
         Forbidden words: {words}",
        if policy.flood_enabled { "on" } else { "off" },
        policy.flood_limit,
        policy.flood_window_seconds,
        policy.mute_threshold,
        policy.ban_threshold,
        policy.default_mute_minutes,
    )
}

/// Show how many warnings a member has
#[command(prefix_command, slash_command, guild_only)]
pub async fn warns(
    ctx: Context<'_>,
    #[description = "Member to look up"] user: User,
) -> Result<(), Error> {
    if !authorize(ctx, Capability::ModerateMembers, false).await? {
        return Ok(());
    }
    let (group, actor, _) = ids(ctx, &user)?;
    let count = ctx.data().service.warn_count(group, actor).await?;
    let policy = ctx.data().service.policy(group).await?;
    ctx.say(format!(
        "<@{}> has {count} warning(s). Mute at {}, ban at {}.",
        user.id, policy.mute_threshold, policy.ban_threshold
    ))
    .await?;
    Ok(())
}

/// Warn a member, escalating to a mute or ban at the configured thresholds
#[command(prefix_command, slash_command, guild_only)]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] user: User,
    #[description = "Reason shown in the notice"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    if !authorize(ctx, Capability::ModerateMembers, true).await?
        || !guard_target(ctx, &user, "warn").await?
    {
        return Ok(());
    }
    let (group, actor, moderator) = ids(ctx, &user)?;
    let reason = reason.unwrap_or_else(|| "moderator warning".to_string());
    let report = ctx
        .data()
        .service
        .warn_actor(group, actor, moderator, &reason)
        .await?;
    ctx.say(describe_report(user.id, &report)).await?;
    Ok(())
}

/// Remove one warning from a member
#[command(prefix_command, slash_command, guild_only)]
pub async fn unwarn(
    ctx: Context<'_>,
    #[description = "Member to pardon"] user: User,
) -> Result<(), Error> {
    if !authorize(ctx, Capability::ModerateMembers, false).await? {
        return Ok(());
    }
    let (group, actor, moderator) = ids(ctx, &user)?;
    let count = ctx
        .data()
        .service
        .unwarn_actor(group, actor, moderator)
        .await?;
    ctx.say(format!("<@{}> now has {count} warning(s).", user.id))
        .await?;
    Ok(())
}

/// Clear all warnings for a member
#[command(prefix_command, slash_command, guild_only)]
pub async fn resetwarns(
    ctx: Context<'_>,
    #[description = "Member to reset"] user: User,
) -> Result<(), Error> {
    if !authorize(ctx, Capability::ModerateMembers, false).await? {
        return Ok(());
    }
    let (group, actor, moderator) = ids(ctx, &user)?;
    ctx.data()
        .service
        .reset_warns(group, actor, moderator)
        .await?;
    ctx.say(format!("Warnings for <@{}> have been reset.", user.id))
        .await?;
    Ok(())
}

/// Mute a member for a number of minutes
#[command(prefix_command, slash_command, guild_only)]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "Member to mute"] user: User,
    #[description = "Minutes, defaults to the server setting"] minutes: Option<u32>,
) -> Result<(), Error> {
    if !authorize(ctx, Capability::ModerateMembers, true).await?
        || !guard_target(ctx, &user, "mute").await?
    {
        return Ok(());
    }
    let (group, actor, moderator) = ids(ctx, &user)?;
    let report = ctx
        .data()
        .service
        .mute_actor(group, actor, minutes, moderator)
        .await?;
    ctx.say(describe_report(user.id, &report)).await?;
    Ok(())
}

/// Lift a member's mute
#[command(prefix_command, slash_command, guild_only)]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "Member to unmute"] user: User,
) -> Result<(), Error> {
    if !authorize(ctx, Capability::ModerateMembers, true).await? {
        return Ok(());
    }
    let (group, actor, moderator) = ids(ctx, &user)?;
    let report = ctx
        .data()
        .service
        .unmute_actor(group, actor, moderator)
        .await?;
    ctx.say(describe_report(user.id, &report)).await?;
    Ok(())
}

/// Ban a member and forget their warnings
#[command(prefix_command, slash_command, guild_only)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "Member to ban"] user: User,
    #[description = "Reason shown in the notice"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    if !authorize(ctx, Capability::BanMembers, true).await?
        || !guard_target(ctx, &user, "ban").await?
    {
        return Ok(());
    }
    let (group, actor, moderator) = ids(ctx, &user)?;
    let reason = reason.unwrap_or_else(|| "moderator ban".to_string());
    let report = ctx
        .data()
        .service
        .ban_actor(group, actor, moderator, &reason)
        .await?;
    ctx.say(describe_report(user.id, &report)).await?;
    Ok(())
}

/// Change one moderation setting for this server
///
/// Keys: flood, flood_limit, flood_window, mute_threshold, ban_threshold,
/// mute_minutes, lock, unlock, add_word, remove_word
#[command(prefix_command, slash_command, guild_only)]
pub async fn policy(
    ctx: Context<'_>,
    #[description = "Setting to change"] key: String,
    #[description = "New value"] value: String,
) -> Result<(), Error> {
    if !authorize(ctx, Capability::ManageGuild, false).await? {
        return Ok(());
    }
    let guild_id = ctx.guild_id().ok_or("This command only works in a server")?;
    let setting = match PolicySetting::parse(&key, &value) {
        Ok(setting) => setting,
        Err(e) => {
            ctx.say(format!("Invalid setting: {e}")).await?;
            return Ok(());
        }
    };
    match ctx
        .data()
        .service
        .update_policy(GroupId(guild_id.get()), &setting.into())
        .await
    {
        Ok(updated) => {
            ctx.say(describe_policy(&updated)).await?;
        }
        Err(e) => {
            ctx.say(format!("Policy not changed: {e}")).await?;
        }
    }
    Ok(())
}

/// Show this server's moderation settings
#[command(prefix_command, slash_command, guild_only)]
pub async fn showpolicy(ctx: Context<'_>) -> Result<(), Error> {
    if !authorize(ctx, Capability::ModerateMembers, false).await? {
        return Ok(());
    }
    let guild_id = ctx.guild_id().ok_or("This command only works in a server")?;
    let policy = ctx.data().service.policy(GroupId(guild_id.get())).await?;
    ctx.say(describe_policy(&policy)).await?;
    Ok(())
}

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<crate::Data, Error>> {
    vec![
        warns(),
        warn(),
        unwarn(),
        resetwarns(),
        mute(),
        unmute(),
        ban(),
        policy(),
        showpolicy(),
    ]
}
