use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use poise::serenity_prelude::{self as serenity, Colour, GuildId, Mentionable, Permissions};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{error, info, instrument, warn};

use super::checks::{is_config_set, is_manager};
use super::CommandsContainer;
use crate::contest;
use crate::database::models::{Event, EventStatus, NewContest, NewEvent};
use crate::database::{ConfigDatabase, ContestDatabase, EventDatabase};
use crate::log::discord_log_info;
use crate::notify::render::{self, CONTEST_EMOJI};
use crate::notify::Notifier;
use crate::scheduler;
use crate::utils::error::CommonError::{self, *};
use crate::utils::shorthand::BotContextExt;
use crate::utils::time::{to_utc, DurationMinutes, EventDate, TimeOfDay, ValidationError};
use crate::{BotContext, BotData, BotError};

/// How far in the future `/create_event_now` schedules the start.
const IMMEDIATE_START_DELAY_MINUTES: i64 = 1;

/// Contests with no end time given close at the end of the day.
const DEFAULT_CONTEST_END_TIME: &str = "23h59";

/// Permissions the bot needs in the channels it posts to.
const REQUIRED_PERMISSIONS: [(Permissions, &str); 5] = [
    (Permissions::MANAGE_ROLES, "Manage Roles"),
    (Permissions::SEND_MESSAGES, "Send Messages"),
    (Permissions::EMBED_LINKS, "Embed Links"),
    (Permissions::ADD_REACTIONS, "Add Reactions"),
    (Permissions::MANAGE_MESSAGES, "Manage Messages"),
];

/// CommandsContainer for the Manager commands.
pub struct ManagerCommands;

impl CommandsContainer for ManagerCommands {
    type Data = BotData;
    type Error = BotError;

    fn get_all() -> Vec<poise::Command<Self::Data, Self::Error>> {
        vec![
            set_config(),
            create_event(),
            create_event_now(),
            end_event(),
            draw_winner(),
            create_contest(),
            end_contest(),
            check_permissions(),
        ]
    }
}

/// Set the configuration for a guild.
///
/// - Manager Role: members with this role can run the manager commands.
/// - Log Channel: the channel where the bot logs the actions it takes.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    default_member_permissions = "ADMINISTRATOR"
)]
#[instrument(skip(ctx))]
async fn set_config(
    ctx: BotContext<'_>,
    #[description = "This role can manage events and contests"] manager_role: serenity::Role,
    #[description = "This channel logs activities"] log_channel: serenity::Channel,
) -> Result<(), BotError> {
    let guild_id = ctx.current_guild()?;
    let log_channel_id = log_channel.id();
    if log_channel.guild().is_none() {
        return Err(ChannelNotExists(log_channel_id.to_string()).into());
    }

    ctx.data()
        .database
        .set_config(&guild_id, &manager_role.id, &log_channel_id)
        .await?;
    info!("Set the configuration of guild {}", guild_id);

    ctx.reply_embed(
        "Configuration set",
        format!(
            "Managers: {}\nLog channel: {}",
            manager_role.mention(),
            log_channel_id.mention()
        ),
        Colour::DARK_GREEN,
    )
    .await
}

/// The channel-like arguments shared by both event creation commands.
struct EventTargets {
    role: serenity::Role,
    announce_channel: serenity::Channel,
    waiting_channel: serenity::Channel,
}

/// Everything the creation commands collect before the draft is validated.
struct EventDraft {
    name: String,
    game_name: String,
    start_time: DateTime<Utc>,
    duration: DurationMinutes,
    max_participants: u32,
    min_participants: u32,
}

fn guild_channel(channel: &serenity::Channel) -> Result<serenity::ChannelId, CommonError> {
    channel
        .clone()
        .guild()
        .map(|channel| channel.id)
        .ok_or_else(|| ChannelNotExists(channel.id().to_string()))
}

fn new_event(
    guild_id: GuildId,
    draft: EventDraft,
    targets: &EventTargets,
) -> Result<NewEvent, CommonError> {
    Ok(NewEvent {
        guild_id,
        name: draft.name.trim().to_string(),
        game_name: draft.game_name.trim().to_string(),
        start_time: draft.start_time,
        duration_minutes: draft.duration.0,
        max_participants: draft.max_participants,
        min_participants: draft.min_participants,
        role_id: targets.role.id,
        announce_channel_id: guild_channel(&targets.announce_channel)?,
        waiting_channel_id: guild_channel(&targets.waiting_channel)?,
    })
}

/// Reads the start instant and the duration typed into `/create_event`.
fn parse_schedule(
    date: &str,
    time: &str,
    duration: &str,
    timezone: chrono_tz::Tz,
) -> Result<(DateTime<Utc>, DurationMinutes), ValidationError> {
    let date: EventDate = date.parse()?;
    let time: TimeOfDay = time.parse()?;
    let duration: DurationMinutes = duration.parse()?;
    Ok((to_utc(date, time, timezone)?, duration))
}

/// Stores the event and posts its announcement.
///
/// An event whose announcement cannot be posted or linked is canceled again, so it neither holds
/// its name nor reaches the scheduler.
async fn create_and_announce<DB, N>(
    database: &DB,
    notifier: &N,
    draft: &NewEvent,
) -> Result<Event, BotError>
where
    DB: EventDatabase<Error = BotError>,
    N: Notifier,
{
    let mut event = database.create_event(draft).await?;
    info!("Created event {} ({})", event.name, event.event_id);

    let posted = match notifier
        .post(event.announce_channel_id, &render::announcement(&event))
        .await
    {
        Ok(message_id) => database
            .set_embed_message(event.event_id, &message_id)
            .await
            .map(|()| message_id)
            .map_err(|e| (e, Some(message_id))),
        Err(e) => Err((e.into(), None)),
    };
    match posted {
        Ok(message_id) => {
            event.embed_message_id = Some(message_id);
            Ok(event)
        }
        Err((e, message_id)) => {
            error!("Unable to announce event {}: {}", event.name, e);
            if let Some(message_id) = message_id {
                if let Err(delete_error) =
                    notifier.delete(event.announce_channel_id, message_id).await
                {
                    error!("Unable to remove an unlinked announcement: {}", delete_error);
                }
            }
            if let Err(cancel_error) = database
                .transition(event.event_id, EventStatus::Canceled)
                .await
            {
                error!(
                    "Unable to cancel the unannounced event {}: {}",
                    event.event_id, cancel_error
                );
            }
            Err(e)
        }
    }
}

/// Validates the draft, stores it and posts its announcement.
async fn publish_event(ctx: BotContext<'_>, draft: NewEvent) -> Result<(), BotError> {
    if let Err(e) = draft.validate(Utc::now()) {
        return ctx.reply_error(e.to_string()).await;
    }
    let data = ctx.data();
    if data
        .database
        .get_active_event_by_name(&draft.guild_id, &draft.name)
        .await?
        .is_some()
    {
        return ctx
            .reply_error(NameTaken("event", draft.name).to_string())
            .await;
    }

    let event = create_and_announce(&data.database, &data.notifier, &draft).await?;

    let start = format!("<t:{}:F>", event.start_time.timestamp());
    let capacity = format!("{} to {}", event.min_participants, event.max_participants);
    if let Err(e) = discord_log_info(
        ctx,
        "Event created",
        vec![
            ("Name", event.name.as_str(), false),
            ("Start", start.as_str(), false),
            ("Participants", capacity.as_str(), false),
        ],
    )
    .await
    {
        warn!("{}", e);
    }

    ctx.reply_embed(
        "Event created",
        format!(
            "**{}** starts {} and is announced in {}.",
            event.name,
            start,
            event.announce_channel_id.mention()
        ),
        Colour::DARK_GREEN,
    )
    .await
}

/// Create an event starting at a given date and time.
///
/// Times are read in the bot's configured timezone.
#[poise::command(
    slash_command,
    guild_only,
    check = "is_config_set",
    check = "is_manager"
)]
#[instrument(skip(ctx, role, announce_channel, waiting_channel))]
async fn create_event(
    ctx: BotContext<'_>,
    #[description = "Event name"] name: String,
    #[description = "Game played during the event"] game: String,
    #[description = "Start date, DD/MM/YYYY"] date: String,
    #[description = "Start time, HHhMM"] time: String,
    #[description = "Duration, NNmin"] duration: String,
    #[description = "Maximum number of participants"] max_participants: u32,
    #[description = "Minimum number of participants, or the event is canceled"]
    min_participants: u32,
    #[description = "Role given to participants while the event runs"] role: serenity::Role,
    #[description = "Channel where the event is announced"] announce_channel: serenity::Channel,
    #[description = "Channel where participants gather"] waiting_channel: serenity::Channel,
) -> Result<(), BotError> {
    let guild_id = ctx.current_guild()?;
    let (start_time, duration) =
        match parse_schedule(&date, &time, &duration, ctx.data().config.timezone) {
            Ok(parsed) => parsed,
            Err(e) => return ctx.reply_error(e.to_string()).await,
        };

    let draft = EventDraft {
        name,
        game_name: game,
        start_time,
        duration,
        max_participants,
        min_participants,
    };
    let targets = EventTargets {
        role,
        announce_channel,
        waiting_channel,
    };
    publish_event(ctx, new_event(guild_id, draft, &targets)?).await
}

/// Create an event starting in a minute.
#[poise::command(
    slash_command,
    guild_only,
    check = "is_config_set",
    check = "is_manager"
)]
#[instrument(skip(ctx, role, announce_channel, waiting_channel))]
async fn create_event_now(
    ctx: BotContext<'_>,
    #[description = "Event name"] name: String,
    #[description = "Game played during the event"] game: String,
    #[description = "Duration, NNmin"] duration: String,
    #[description = "Maximum number of participants"] max_participants: u32,
    #[description = "Minimum number of participants, or the event is canceled"]
    min_participants: u32,
    #[description = "Role given to participants while the event runs"] role: serenity::Role,
    #[description = "Channel where the event is announced"] announce_channel: serenity::Channel,
    #[description = "Channel where participants gather"] waiting_channel: serenity::Channel,
) -> Result<(), BotError> {
    let guild_id = ctx.current_guild()?;
    let duration: DurationMinutes = match duration.parse() {
        Ok(duration) => duration,
        Err(e) => return ctx.reply_error(e.to_string()).await,
    };

    let draft = EventDraft {
        name,
        game_name: game,
        start_time: Utc::now() + Duration::minutes(IMMEDIATE_START_DELAY_MINUTES),
        duration,
        max_participants,
        min_participants,
    };
    let targets = EventTargets {
        role,
        announce_channel,
        waiting_channel,
    };
    publish_event(ctx, new_event(guild_id, draft, &targets)?).await
}

/// End an event right away, whatever its schedule.
#[poise::command(
    slash_command,
    guild_only,
    check = "is_config_set",
    check = "is_manager"
)]
#[instrument(skip(ctx))]
async fn end_event(
    ctx: BotContext<'_>,
    #[description = "Name of the event to end"] name: String,
) -> Result<(), BotError> {
    let guild_id = ctx.current_guild()?;
    let data = ctx.data();
    let Some(event) = data
        .database
        .get_active_event_by_name(&guild_id, name.trim())
        .await?
    else {
        return ctx.reply_error(EventNotExists(name).to_string()).await;
    };

    if !scheduler::terminate(&data.database, &data.notifier, &event).await? {
        return ctx
            .reply_error(format!("**{}** has already ended.", event.name))
            .await;
    }
    let fields = vec![("Name", event.name.as_str(), false)];
    if let Err(e) = discord_log_info(ctx, "Event ended manually", fields).await {
        warn!("{}", e);
    }
    ctx.reply_embed(
        "Event ended",
        format!("**{}** has been ended.", event.name),
        Colour::DARK_GREEN,
    )
    .await
}

/// Draw a random participant of an event, for a giveaway during the event.
#[poise::command(
    slash_command,
    guild_only,
    check = "is_config_set",
    check = "is_manager"
)]
#[instrument(skip(ctx))]
async fn draw_winner(
    ctx: BotContext<'_>,
    #[description = "Name of the event"] name: String,
) -> Result<(), BotError> {
    let guild_id = ctx.current_guild()?;
    let data = ctx.data();
    let Some(event) = data
        .database
        .get_active_event_by_name(&guild_id, name.trim())
        .await?
    else {
        return ctx.reply_error(EventNotExists(name).to_string()).await;
    };

    let mut rng = StdRng::from_entropy();
    let Some(winner) = event.draw(&mut rng).cloned() else {
        return ctx
            .reply_error(format!("Nobody registered for **{}**.", event.name))
            .await;
    };
    info!("{} won the draw of event {}", winner.user_id, event.name);

    data.notifier
        .post(
            event.announce_channel_id,
            &render::event_winner(&event, &winner),
        )
        .await?;
    ctx.reply_embed(
        "Winner drawn",
        format!("{} ({}) won the draw.", winner.user_id.mention(), winner.pseudonym),
        Colour::GOLD,
    )
    .await
}

/// Start a contest. Members enter by reacting to its announcement.
#[poise::command(
    slash_command,
    guild_only,
    check = "is_config_set",
    check = "is_manager"
)]
#[instrument(skip(ctx, channel))]
async fn create_contest(
    ctx: BotContext<'_>,
    #[description = "Contest name"] name: String,
    #[description = "Channel where the contest is posted"] channel: serenity::Channel,
    #[description = "End date, DD/MM/YYYY"] end_date: String,
    #[description = "End time, HHhMM. Default: 23h59"] end_time: Option<String>,
) -> Result<(), BotError> {
    let guild_id = ctx.current_guild()?;
    let data = ctx.data();
    let name = name.trim().to_string();
    let channel_id = guild_channel(&channel)?;

    let end_time = end_time.unwrap_or_else(|| DEFAULT_CONTEST_END_TIME.to_string());
    let end = end_date
        .parse::<EventDate>()
        .and_then(|date| Ok((date, end_time.parse::<TimeOfDay>()?)))
        .and_then(|(date, time)| to_utc(date, time, data.config.timezone));
    let end_date = match end {
        Ok(end_date) => end_date,
        Err(e) => return ctx.reply_error(e.to_string()).await,
    };
    if name.is_empty() {
        return ctx.reply_error(ValidationError::EmptyName.to_string()).await;
    }
    if data
        .database
        .get_active_contest_by_name(&guild_id, &name)
        .await?
        .is_some()
    {
        return ctx.reply_error(NameTaken("contest", name).to_string()).await;
    }

    let message_id = data
        .notifier
        .post(channel_id, &render::contest_announcement(&name, end_date))
        .await?;
    let contest = match data
        .database
        .create_contest(&NewContest {
            guild_id,
            name,
            channel_id,
            message_id,
            end_date,
        })
        .await
    {
        Ok(contest) => contest,
        Err(e) => {
            if let Err(delete_error) = data.notifier.delete(channel_id, message_id).await {
                error!("Unable to remove an unsaved contest post: {}", delete_error);
            }
            return Err(e);
        }
    };
    if let Err(e) = data.notifier.react(channel_id, message_id, CONTEST_EMOJI).await {
        warn!("Unable to seed the reaction of contest {}: {}", contest.name, e);
    }

    let fields = vec![("Name", contest.name.as_str(), false)];
    if let Err(e) = discord_log_info(ctx, "Contest created", fields).await {
        warn!("{}", e);
    }
    ctx.reply_embed(
        "Contest created",
        format!("**{}** is open in {}.", contest.name, channel_id.mention()),
        Colour::DARK_GREEN,
    )
    .await
}

/// End a contest and draw its winner.
#[poise::command(
    slash_command,
    guild_only,
    check = "is_config_set",
    check = "is_manager"
)]
#[instrument(skip(ctx))]
async fn end_contest(
    ctx: BotContext<'_>,
    #[description = "Name of the contest to end"] name: String,
) -> Result<(), BotError> {
    let guild_id = ctx.current_guild()?;
    let data = ctx.data();
    let Some(contest) = data
        .database
        .get_active_contest_by_name(&guild_id, name.trim())
        .await?
    else {
        return ctx.reply_error(ContestNotExists(name).to_string()).await;
    };

    let mut rng = StdRng::from_entropy();
    match contest::end_contest(&data.database, &data.notifier, &mut rng, contest.contest_id).await
    {
        Ok(winner) => {
            let winner_field = winner.user_id.mention().to_string();
            if let Err(e) = discord_log_info(
                ctx,
                "Contest ended",
                vec![("Name", contest.name.as_str(), false), ("Winner", winner_field.as_str(), false)],
            )
            .await
            {
                warn!("{}", e);
            }
            ctx.reply_embed(
                "Contest ended",
                format!("{} won **{}**.", winner_field, contest.name),
                Colour::GOLD,
            )
            .await
        }
        Err(e) if e.kind().is_user_facing() => ctx.reply_error(e.to_string()).await,
        Err(e) => Err(e.into()),
    }
}

/// The required permissions missing from `granted`, by name.
fn missing_permissions(granted: Permissions) -> Vec<&'static str> {
    if granted.administrator() {
        return vec![];
    }
    REQUIRED_PERMISSIONS
        .iter()
        .filter(|(permission, _)| !granted.contains(*permission))
        .map(|(_, name)| *name)
        .collect()
}

/// Check that the bot has every permission it needs in this channel.
#[poise::command(slash_command, guild_only, check = "is_manager")]
#[instrument(skip(ctx))]
async fn check_permissions(ctx: BotContext<'_>) -> Result<(), BotError> {
    let granted = match ctx {
        poise::Context::Application(actx) => actx.interaction.app_permissions,
        poise::Context::Prefix(_) => None,
    }
    .ok_or(anyhow!("Discord did not send the bot permissions for this channel"))?;

    let missing = missing_permissions(granted);
    if missing.is_empty() {
        return ctx
            .reply_embed(
                "All set",
                "The bot has every permission it needs in this channel.",
                Colour::DARK_GREEN,
            )
            .await;
    }
    ctx.reply_embed(
        "Missing permissions",
        format!("The bot is missing: {}", missing.join(", ")),
        Colour::ORANGE,
    )
    .await
}
