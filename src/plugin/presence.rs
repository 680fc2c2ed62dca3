use crate::helper::MessageHelper;
use crate::ledger::{Progression, RoleDelta, RoleLadder};
use crate::{event::*, log_event, log_internal, plugin::*};
use anyhow::{anyhow, Result};
use chrono::Utc;
use serenity::all::{CreateMessage, GuildId, Member, Mentionable, Message, VoiceState};

const NOT_TRACKED_MSG: &str =
    "You are not in my records yet; you will be after you next join a voice channel here.";
const NO_PERMISSION_MSG: &str = "You don't have the right permissions to use this command!";

/// Voice presence tracking and role progression.
///
/// Watches voice-state transitions to accumulate per-member connected time,
/// and hands out the next role on the guild's ladder once a member's total
/// crosses the next threshold.  Also provides the query and admin commands
/// over the ledger.
pub struct Presence;

#[serenity::async_trait]
impl Plugin for Presence {
    fn name(&self) -> &'static str {
        "presence"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!(
            "{p}presence time - your total voice time\n\
             {p}presence next - your next role and how far away it is\n\
             {p}presence when <@member> [@role] - time until a member reaches a role\n\
             {p}presence top - member with the most voice time\n\
             {p}presence recalc <@member> - rebuild a member's thresholds (admin)\n\
             {p}presence touch <@member> - restart a member's open session at now (admin)\n\
             {p}presence promote <@member> - force one rank up (admin)\n\
             {p}presence demote <@member> - force one rank down (admin)",
            p = prefix
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        if let Event::VoiceStateUpdate { old, new } = event {
            return handle_voice_state_update(ctx, old, new).await;
        }

        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        match args.first() {
            Some(&"time") => handle_time(ctx, msg).await,
            Some(&"next") => handle_next(ctx, msg).await,
            Some(&"when") => handle_when(ctx, msg).await,
            Some(&"top") => handle_top(ctx, msg).await,
            Some(&"recalc") => handle_recalc(ctx, msg).await,
            Some(&"touch") => handle_touch(ctx, msg).await,
            Some(&"promote") => handle_adjust(ctx, msg, Adjust::Promote).await,
            Some(&"demote") => handle_adjust(ctx, msg, Adjust::Demote).await,
            _ => {
                msg.reply(ctx.cache_http, "Invalid command.  See `;help`")
                    .await?;
                Ok(EventHandled::Yes)
            }
        }
    }
}

enum Adjust {
    Promote,
    Demote,
}

/// Snapshot the guild's role ladder for one evaluation.
async fn ladder_for(ctx: &Context<'_>, guild_id: GuildId) -> Result<RoleLadder> {
    let guild = guild_id.to_partial_guild(ctx.http).await?;
    Ok(RoleLadder::from_guild_roles(&guild.roles))
}

async fn rules(ctx: &Context<'_>) -> Progression {
    ctx.cfg.read().await.progression.rules()
}

async fn handle_voice_state_update(
    ctx: &Context<'_>,
    old: &Option<VoiceState>,
    new: &VoiceState,
) -> Result<EventHandled> {
    if new.member.as_ref().is_some_and(|m| m.user.bot) {
        return Ok(EventHandled::No);
    }

    let old_channel_id = old.as_ref().and_then(|o| o.channel_id);
    match (old_channel_id, new.channel_id) {
        (None, Some(_)) => handle_join(ctx, new).await,
        (Some(_), None) => handle_leave(ctx, new).await,
        // Channel moves and mute/deafen changes keep the session open.
        _ => Ok(EventHandled::No),
    }
}

async fn handle_join(ctx: &Context<'_>, new: &VoiceState) -> Result<EventHandled> {
    let guild_id = new.guild_id.ok_or(anyhow!("unable to get guild_id"))?;
    let member = match &new.member {
        Some(member) => member.clone(),
        None => guild_id.member(ctx.http, new.user_id).await?,
    };
    // The gateway does not always attach the member, so the bot check in
    // handle_voice_state_update can miss; repeat it on the fetched member.
    if member.user.bot {
        return Ok(EventHandled::No);
    }

    let ladder = ladder_for(ctx, guild_id).await?;
    let Some(observed) = ladder.highest_of(&member.roles).cloned() else {
        log_internal!("Guild {} has no usable role ladder", guild_id);
        return Ok(EventHandled::No);
    };

    let rules = rules(ctx).await;
    let display_name = member.display_name().to_string();
    let now = Utc::now();

    let mut store = ctx.ledger.write().await;
    let delta = match store.get_mut(member.user.id) {
        Some(entry) => {
            entry.display_name = display_name;
            rules.on_connect(entry, &ladder, &observed, now)
        }
        None => {
            log_internal!("{} seen in voice for the first time, tracking", member.user.name);
            let entry = rules.track_new(member.user.id, display_name, &ladder, &observed, now);
            store.upsert(entry);
            None
        }
    };

    if let Some(delta) = delta {
        log_event!(
            "{} crossed {} threshold(s), promoting \"{}\" -> \"{}\"",
            member.user.name,
            delta.crossed,
            delta.remove.name,
            delta.add.name,
        );
        apply_role_delta(ctx, &member, &delta).await;

        // Best effort; members with closed DMs just miss the note.
        let congrats = CreateMessage::new().content(format!(
            "Hello, you are now eligible for the role of `{}`. Congratulations!",
            delta.add.name
        ));
        if let Err(e) = member.user.direct_message(ctx.cache_http, congrats).await {
            log_internal!("Could not DM {}: {}", member.user.name, e);
        }
    }

    // The ledger is the source of truth even if Discord rejected the role
    // change above.
    store.save().await?;

    // Other plugins might also want to act on this event.
    Ok(EventHandled::No)
}

async fn handle_leave(ctx: &Context<'_>, new: &VoiceState) -> Result<EventHandled> {
    let rules = rules(ctx).await;
    let now = Utc::now();

    let mut store = ctx.ledger.write().await;
    let Some(entry) = store.get_mut(new.user_id) else {
        // Disconnect for somebody we never saw connect.
        return Ok(EventHandled::No);
    };

    // Checked before on_disconnect closes the session and clears the start.
    let malformed = !entry.session_open(now);
    let minutes = rules.on_disconnect(entry, now);
    if malformed {
        log_internal!(
            "No usable session timestamps for {}, counting zero minutes",
            entry.display_name
        );
    }
    log_event!(
        "{} disconnected after {:.1} minute(s), {:.1} total",
        entry.display_name,
        minutes,
        entry.total_minutes_connected,
    );

    store.save().await?;
    Ok(EventHandled::No)
}

/// Ask Discord to swap the member's ladder role.  Failures are logged and the
/// ledger is left as-is; the drift heals on the next recalculation.
async fn apply_role_delta(ctx: &Context<'_>, member: &Member, delta: &RoleDelta) {
    if let Err(e) = member.remove_role(ctx.http, delta.remove.id).await {
        log_internal!(
            "Could not remove role \"{}\" from {}: {}",
            delta.remove.name,
            member.user.name,
            e
        );
    }
    if let Err(e) = member.add_role(ctx.http, delta.add.id).await {
        log_internal!(
            "Could not add role \"{}\" to {}: {}",
            delta.add.name,
            member.user.name,
            e
        );
    }
}

async fn handle_time(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    let store = ctx.ledger.read().await;
    let reply = match store.get(msg.author.id) {
        Some(entry) => format!(
            "According to my records you have spent a total of {:.1} hours connected to voice channels",
            entry.total_minutes_connected / 60.0
        ),
        None => NOT_TRACKED_MSG.to_string(),
    };
    drop(store);

    msg.reply(ctx.cache_http, reply).await?;
    Ok(EventHandled::Yes)
}

async fn handle_next(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    let Some(guild_id) = msg.guild_id else {
        msg.reply(ctx.cache_http, "This command only works inside a server")
            .await?;
        return Ok(EventHandled::Yes);
    };
    let ladder = ladder_for(ctx, guild_id).await?;

    let store = ctx.ledger.read().await;
    let reply = match store.get(msg.author.id) {
        None => NOT_TRACKED_MSG.to_string(),
        Some(entry) => {
            let next_rung = ladder
                .rank_of(entry.highest_role_id)
                .and_then(|rank| ladder.get(rank + 1));

            match (next_rung, entry.minutes_to_next()) {
                (Some(rung), Some(minutes_left)) => format!(
                    "Your next role is `{}`; stay connected another {:.1} hours to earn it",
                    rung.name,
                    (minutes_left / 60.0).max(0.0),
                ),
                (Some(rung), None) => format!(
                    "Your next role is `{}`, but I have no thresholds recorded for you; ask an admin to run `presence recalc`",
                    rung.name,
                ),
                (None, _) => "Looks like you already have the highest role possible".to_string(),
            }
        }
    };
    drop(store);

    msg.reply(ctx.cache_http, reply).await?;
    Ok(EventHandled::Yes)
}

async fn handle_when(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    let Some(guild_id) = msg.guild_id else {
        msg.reply(ctx.cache_http, "This command only works inside a server")
            .await?;
        return Ok(EventHandled::Yes);
    };
    let Some(target) = msg.mentions.first() else {
        msg.reply(ctx.cache_http, "Mention the member to look up, see `;help`")
            .await?;
        return Ok(EventHandled::Yes);
    };

    let ladder = ladder_for(ctx, guild_id).await?;

    let store = ctx.ledger.read().await;
    let Some(entry) = store.get(target.id) else {
        drop(store);
        msg.reply(
            ctx.cache_http,
            format!("{} is not on the tracking list yet", target.mention()),
        )
        .await?;
        return Ok(EventHandled::Yes);
    };

    let Some(current_rank) = ladder.rank_of(entry.highest_role_id) else {
        drop(store);
        msg.reply(
            ctx.cache_http,
            "Their recorded role is no longer on this server's ladder; ask an admin to run `presence recalc`",
        )
        .await?;
        return Ok(EventHandled::Yes);
    };

    // Default to the next rung up when no role was mentioned.
    let wanted_rank = match msg.mention_roles.first() {
        Some(role_id) => match ladder.rank_of(*role_id) {
            Some(rank) => rank,
            None => {
                drop(store);
                msg.reply(ctx.cache_http, "That role is not on the ladder")
                    .await?;
                return Ok(EventHandled::Yes);
            }
        },
        None => match current_rank + 1 < ladder.len() {
            true => current_rank + 1,
            false => {
                drop(store);
                msg.reply(
                    ctx.cache_http,
                    format!(
                        "{} already has the highest role possible",
                        target.mention()
                    ),
                )
                .await?;
                return Ok(EventHandled::Yes);
            }
        },
    };

    let reply = if wanted_rank <= current_rank {
        format!(
            "{} already has a role at or above `{}`",
            target.mention(),
            ladder.get(wanted_rank).map(|r| r.name.as_str()).unwrap_or("?"),
        )
    } else {
        let steps = wanted_rank - current_rank;
        match entry.expected_intervals.get(steps - 1) {
            Some(threshold) => {
                let days_left = ((threshold - entry.total_minutes_connected) / 60.0) / 24.0;
                format!(
                    "Expected time for {} to reach `{}`: {:.1} days",
                    target.mention(),
                    ladder.get(wanted_rank).map(|r| r.name.as_str()).unwrap_or("?"),
                    days_left.max(0.0),
                )
            }
            None => format!(
                "{} has no recorded thresholds that far up the ladder",
                target.mention()
            ),
        }
    };
    drop(store);

    msg.reply(ctx.cache_http, reply).await?;
    Ok(EventHandled::Yes)
}

async fn handle_top(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    let store = ctx.ledger.read().await;
    let reply = match store.leader() {
        Some(leader) => format!(
            "The member with the most time so far is <@{}> with {:.1} days connected",
            leader.member_id,
            leader.total_minutes_connected / 60.0 / 24.0,
        ),
        None => "Nobody is on the tracking list yet".to_string(),
    };
    drop(store);

    msg.reply(ctx.cache_http, reply).await?;
    Ok(EventHandled::Yes)
}

async fn handle_recalc(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    let Some(guild_id) = msg.guild_id else {
        msg.reply(ctx.cache_http, "This command only works inside a server")
            .await?;
        return Ok(EventHandled::Yes);
    };
    if !msg.is_from_guild_admin(ctx) {
        log_internal!(
            "{} tried to use `presence recalc` without permission",
            msg.author.name
        );
        msg.reply(ctx.cache_http, NO_PERMISSION_MSG).await?;
        return Ok(EventHandled::Yes);
    }
    let Some(target) = msg.mentions.first() else {
        msg.reply(ctx.cache_http, "Mention the member to recalculate, see `;help`")
            .await?;
        return Ok(EventHandled::Yes);
    };

    let ladder = ladder_for(ctx, guild_id).await?;
    let rules = rules(ctx).await;

    let mut store = ctx.ledger.write().await;
    let reply = match store.get_mut(target.id) {
        None => {
            drop(store);
            msg.reply(
                ctx.cache_http,
                format!("{} is not on the tracking list yet", target.mention()),
            )
            .await?;
            return Ok(EventHandled::Yes);
        }
        Some(entry) => {
            rules.recalculate(entry, &ladder);
            format!(
                "Recalculated thresholds for {}. The new thresholds are {:?} minutes",
                target.mention(),
                entry.expected_intervals,
            )
        }
    };

    // Persist before acknowledging.
    store.save().await?;
    drop(store);

    msg.reply(ctx.cache_http, reply).await?;
    Ok(EventHandled::Yes)
}

/// Repair for a session whose disconnect was lost (bot downtime, gateway
/// hiccup): restart the member's open session at the current instant so the
/// untracked stretch is neither credited nor double counted.
async fn handle_touch(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    if !msg.is_from_guild_admin(ctx) {
        log_internal!(
            "{} tried to use `presence touch` without permission",
            msg.author.name
        );
        msg.reply(ctx.cache_http, NO_PERMISSION_MSG).await?;
        return Ok(EventHandled::Yes);
    }
    let Some(target) = msg.mentions.first() else {
        msg.reply(ctx.cache_http, "Mention the member to touch, see `;help`")
            .await?;
        return Ok(EventHandled::Yes);
    };

    let now = Utc::now();
    let mut store = ctx.ledger.write().await;
    let reply = match store.get_mut(target.id) {
        None => {
            drop(store);
            msg.reply(
                ctx.cache_http,
                format!("{} is not on the tracking list yet", target.mention()),
            )
            .await?;
            return Ok(EventHandled::Yes);
        }
        Some(entry) => {
            entry.reset_session_start(now);
            format!(
                "Session start for {} reset to {}",
                target.mention(),
                now.to_rfc3339(),
            )
        }
    };

    // Persist before acknowledging.
    store.save().await?;
    drop(store);

    msg.reply(ctx.cache_http, reply).await?;
    Ok(EventHandled::Yes)
}

async fn handle_adjust(ctx: &Context<'_>, msg: &Message, adjust: Adjust) -> Result<EventHandled> {
    let Some(guild_id) = msg.guild_id else {
        msg.reply(ctx.cache_http, "This command only works inside a server")
            .await?;
        return Ok(EventHandled::Yes);
    };
    if !msg.is_from_guild_admin(ctx) {
        log_internal!(
            "{} tried to adjust a member's rank without permission",
            msg.author.name
        );
        msg.reply(ctx.cache_http, NO_PERMISSION_MSG).await?;
        return Ok(EventHandled::Yes);
    }
    let Some(target) = msg.mentions.first() else {
        msg.reply(ctx.cache_http, "Mention the member to adjust, see `;help`")
            .await?;
        return Ok(EventHandled::Yes);
    };

    let ladder = ladder_for(ctx, guild_id).await?;
    let rules = rules(ctx).await;

    let mut store = ctx.ledger.write().await;
    let delta = match store.get_mut(target.id) {
        None => {
            drop(store);
            msg.reply(
                ctx.cache_http,
                format!("{} is not on the tracking list yet", target.mention()),
            )
            .await?;
            return Ok(EventHandled::Yes);
        }
        Some(entry) => match adjust {
            Adjust::Promote => rules.promote_one(entry, &ladder),
            Adjust::Demote => rules.demote_one(entry, &ladder),
        },
    };

    let Some(delta) = delta else {
        drop(store);
        let boundary = match adjust {
            Adjust::Promote => "highest",
            Adjust::Demote => "lowest",
        };
        msg.reply(
            ctx.cache_http,
            format!(
                "{} is already at the {} possible role",
                target.mention(),
                boundary
            ),
        )
        .await?;
        return Ok(EventHandled::Yes);
    };

    let member = guild_id.member(ctx.http, target.id).await?;
    apply_role_delta(ctx, &member, &delta).await;

    // Persist before acknowledging.
    store.save().await?;
    drop(store);

    let verb = match adjust {
        Adjust::Promote => "promotion",
        Adjust::Demote => "demotion",
    };
    log_event!(
        "{} issued a {} for {}: \"{}\" -> \"{}\"",
        msg.author.name,
        verb,
        target.name,
        delta.remove.name,
        delta.add.name,
    );
    msg.reply(
        ctx.cache_http,
        format!(
            "{} received a {} to the role of `{}`",
            target.mention(),
            verb,
            delta.add.name
        ),
    )
    .await?;
    Ok(EventHandled::Yes)
}
