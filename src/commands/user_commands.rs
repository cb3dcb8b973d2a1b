use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use poise::CreateReply;
use prettytable::{row, Table};
use tracing::{info, instrument};

use super::CommandsContainer;
use crate::database::models::Event;
use crate::database::EventDatabase;
use crate::utils::shorthand::BotContextExt;
use crate::{BotContext, BotData, BotError};

/// CommandsContainer for the commands every member can run.
pub struct UserCommands;

impl CommandsContainer for UserCommands {
    type Data = BotData;
    type Error = BotError;

    fn get_all() -> Vec<poise::Command<Self::Data, Self::Error>> {
        vec![list_events(), help()]
    }
}

fn local_time(instant: DateTime<Utc>, timezone: Tz) -> String {
    instant
        .with_timezone(&timezone)
        .format("%d/%m/%Y %Hh%M")
        .to_string()
}

/// Renders the upcoming and running events as a text table.
fn events_table(events: &[Event], timezone: Tz) -> String {
    let mut table = Table::new();
    table.set_titles(row!["Name", "Game", "Start", "Duration", "Players", "Status"]);
    for event in events {
        table.add_row(row![
            &event.name,
            &event.game_name,
            local_time(event.start_time, timezone),
            format!("{}min", event.duration_minutes),
            format!("{}/{}", event.participants.len(), event.max_participants),
            event.status_label()
        ]);
    }
    table.to_string()
}

/// List the events that have not ended yet.
#[poise::command(slash_command, guild_only)]
#[instrument(skip(ctx))]
async fn list_events(ctx: BotContext<'_>) -> Result<(), BotError> {
    let guild_id = ctx.current_guild()?;
    let events = ctx.data().database.get_active_events(&guild_id).await?;
    info!("{} listed the events of guild {}", ctx.author().name, guild_id);

    let content = if events.is_empty() {
        "There are no upcoming events in this server.".to_string()
    } else {
        format!(
            "Here are the upcoming events of this server.\n```\n{}\n```",
            events_table(&events, ctx.data().config.timezone)
        )
    };
    ctx.send(CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// Show the available commands, or the details of one command.
#[poise::command(slash_command, prefix_command)]
async fn help(
    ctx: BotContext<'_>,
    #[description = "Command to get help for"]
    #[autocomplete = "poise::builtins::autocomplete_command"]
    command: Option<String>,
) -> Result<(), BotError> {
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration {
            ephemeral: true,
            extra_text_at_bottom: "Times are written HHhMM, dates DD/MM/YYYY and durations NNmin.",
            ..Default::default()
        },
    )
    .await?;
    Ok(())
}
