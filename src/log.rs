use std::time::SystemTime;

use anyhow::anyhow;
use poise::serenity_prelude::{ChannelId, Color, CreateEmbed, CreateMessage};
use tracing::info;

use crate::{database::ConfigDatabase, BotContext, BotError};

fn now_string() -> String {
    format!(
        "<t:{}:F>",
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    )
}

/// Finds the log channel configured for the guild the command runs in.
async fn log_channel(ctx: BotContext<'_>) -> Result<ChannelId, BotError> {
    let guild_id = ctx
        .guild_id()
        .ok_or(anyhow!("Attempted to log outside of a guild"))?;
    ctx.data()
        .database
        .get_config(&guild_id)
        .await?
        .ok_or(anyhow!("Config not found for guild {}", guild_id))?
        .log_channel()
}

/// Creates an info log message in the current guild's designated log channel.
pub async fn discord_log_info(
    ctx: BotContext<'_>,
    title: &str,
    mut fields: Vec<(&str, &str, bool)>,
) -> Result<(), BotError> {
    let log_channel = log_channel(ctx)
        .await
        .map_err(|e| anyhow!("Error sending info log: {}", e))?;

    info!("ℹ️ {}\n\n{:#?}", title, fields);

    let now_string = now_string();
    fields.push(("Happened at", &now_string, false));

    log_channel
        .send_message(
            ctx,
            CreateMessage::default().embed(
                CreateEmbed::new()
                    .title(format!("ℹ️ {}", title))
                    .fields(fields)
                    .color(Color::BLURPLE),
            ),
        )
        .await?;

    Ok(())
}

/// Creates an error log message in the current guild's designated log channel.
pub async fn discord_log_error(
    ctx: BotContext<'_>,
    title: &str,
    mut fields: Vec<(&str, &str, bool)>,
) -> Result<(), BotError> {
    let log_channel = log_channel(ctx)
        .await
        .map_err(|e| anyhow!("Error sending error log: {}", e))?;

    let now_string = now_string();
    fields.push(("Seen at", &now_string, false));

    log_channel
        .send_message(
            ctx,
            CreateMessage::default()
                .content("⚠️ An error occured in a command!")
                .embed(
                    CreateEmbed::new()
                        .title(title)
                        .description("Please check the logs for more information.")
                        .fields(fields)
                        .color(Color::RED),
                ),
        )
        .await?;

    Ok(())
}
