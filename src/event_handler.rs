use std::time::Duration;

use poise::serenity_prelude::{
    self as serenity, Colour, ComponentInteraction, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateQuickModal, Reaction,
};
use tracing::{debug, error, info, instrument};

use crate::contest::{self, ContestError, ReactionOutcome};
use crate::database::models::{Event, Participant, MAX_PSEUDONYM_LENGTH};
use crate::notify::render::CONTEST_EMOJI;
use crate::notify::Notifier;
use crate::registry::{self, RegistrationError};
use crate::{BotData, BotError};

const REGISTER_PREFIX: &str = "event_register_";
const WITHDRAW_PREFIX: &str = "event_withdraw_";

/// A button on an event announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventButton {
    Register(i64),
    Withdraw(i64),
}

impl EventButton {
    pub fn custom_id(&self) -> String {
        match self {
            EventButton::Register(event_id) => format!("{}{}", REGISTER_PREFIX, event_id),
            EventButton::Withdraw(event_id) => format!("{}{}", WITHDRAW_PREFIX, event_id),
        }
    }

    /// Recognizes the custom id of an event button. Other components yield `None`.
    pub fn parse(custom_id: &str) -> Option<Self> {
        if let Some(id) = custom_id.strip_prefix(REGISTER_PREFIX) {
            return id.parse().ok().map(EventButton::Register);
        }
        if let Some(id) = custom_id.strip_prefix(WITHDRAW_PREFIX) {
            return id.parse().ok().map(EventButton::Withdraw);
        }
        None
    }
}

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    framework: poise::FrameworkContext<'_, BotData, BotError>,
    data: &BotData,
) -> Result<(), BotError> {
    match event {
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => match EventButton::parse(&component.data.custom_id) {
            Some(EventButton::Register(event_id)) => {
                handle_register(ctx, data, component, event_id).await?
            }
            Some(EventButton::Withdraw(event_id)) => {
                handle_withdraw(ctx, data, component, event_id).await?
            }
            None => {}
        },
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            if is_contest_reaction(add_reaction, framework.bot_id) {
                handle_contest_join(data, add_reaction).await?;
            }
        }
        serenity::FullEvent::ReactionRemove { removed_reaction } => {
            if is_contest_reaction(removed_reaction, framework.bot_id) {
                handle_contest_leave(data, removed_reaction).await?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn is_contest_reaction(reaction: &Reaction, bot_id: serenity::UserId) -> bool {
    let from_bot = reaction.user_id == Some(bot_id)
        || reaction
            .member
            .as_ref()
            .map(|member| member.user.bot)
            .unwrap_or(false);
    !from_bot && reaction.emoji.unicode_eq(&CONTEST_EMOJI.to_string())
}

fn reply(description: impl Into<String>, colour: Colour) -> CreateInteractionResponse {
    let embed = CreateEmbed::default()
        .description(description.into())
        .colour(colour);
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .embed(embed)
            .ephemeral(true),
    )
}

/// Turns a registry outcome into what the member sees.
fn registration_reply(
    result: &Result<Event, RegistrationError>,
    success: String,
) -> CreateInteractionResponse {
    match result {
        Ok(_) => reply(success, Colour::DARK_GREEN),
        Err(e) if e.kind().is_user_facing() => reply(e.to_string(), Colour::RED),
        Err(e) => {
            error!("Registration failed: {:?}", e);
            reply(
                "Something went wrong. Please try again in a moment.",
                Colour::RED,
            )
        }
    }
}

#[instrument(skip(ctx, data, mci), fields(user_id = %mci.user.id))]
async fn handle_register(
    ctx: &serenity::Context,
    data: &BotData,
    mci: &ComponentInteraction,
    event_id: i64,
) -> Result<(), BotError> {
    let modal = CreateQuickModal::new("Register")
        .timeout(Duration::from_secs(120))
        .short_field(format!(
            "Pseudonym (up to {} characters)",
            MAX_PSEUDONYM_LENGTH
        ));
    let Some(response) = mci.quick_modal(ctx, modal).await? else {
        debug!("Registration modal for event {} timed out", event_id);
        return Ok(());
    };
    let pseudonym = response.inputs.first().cloned().unwrap_or_default();

    let display_name = match &mci.member {
        Some(member) => member.display_name().to_string(),
        None => mci.user.name.clone(),
    };
    let participant = Participant::new(mci.user.id, display_name, &pseudonym);
    let pseudonym = participant.pseudonym.clone();

    let result = registry::register(&data.database, &data.notifier, event_id, participant).await;
    let success = match &result {
        Ok(event) => format!("You are registered for **{}** as **{}**.", event.name, pseudonym),
        Err(_) => String::new(),
    };
    response
        .interaction
        .create_response(ctx, registration_reply(&result, success))
        .await?;
    Ok(())
}

#[instrument(skip(ctx, data, mci), fields(user_id = %mci.user.id))]
async fn handle_withdraw(
    ctx: &serenity::Context,
    data: &BotData,
    mci: &ComponentInteraction,
    event_id: i64,
) -> Result<(), BotError> {
    let result = registry::withdraw(&data.database, &data.notifier, event_id, mci.user.id).await;
    let success = match &result {
        Ok(event) => format!("You withdrew from **{}**.", event.name),
        Err(_) => String::new(),
    };
    mci.create_response(ctx, registration_reply(&result, success))
        .await?;
    Ok(())
}

async fn handle_contest_join(data: &BotData, reaction: &Reaction) -> Result<(), BotError> {
    let Some(user_id) = reaction.user_id else {
        return Ok(());
    };
    let display_name = match (&reaction.member, reaction.guild_id) {
        (Some(member), _) => member.display_name().to_string(),
        (None, Some(guild_id)) => match data.notifier.resolve_member(guild_id, user_id).await? {
            Some(member) => member.display_name,
            None => return Ok(()),
        },
        (None, None) => return Ok(()),
    };

    log_outcome(
        contest::join(&data.database, reaction.message_id, user_id, &display_name).await,
        reaction,
    )
}

async fn handle_contest_leave(data: &BotData, reaction: &Reaction) -> Result<(), BotError> {
    let Some(user_id) = reaction.user_id else {
        return Ok(());
    };
    log_outcome(
        contest::leave(&data.database, reaction.message_id, user_id).await,
        reaction,
    )
}

fn log_outcome(
    outcome: Result<ReactionOutcome, ContestError>,
    reaction: &Reaction,
) -> Result<(), BotError> {
    match outcome? {
        ReactionOutcome::Closed => {
            info!(
                "Ignored a reaction on the ended contest {}",
                reaction.message_id
            )
        }
        outcome => debug!("Reaction on {}: {:?}", reaction.message_id, outcome),
    }
    Ok(())
}
