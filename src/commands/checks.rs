use poise::serenity_prelude::Colour;
use tracing::warn;

use crate::utils::error::CommonError;
use crate::utils::shorthand::BotContextExt;
use crate::{BotContext, BotError};

/// Passes for members with the Administrator permission or the configured manager role.
pub async fn is_manager(ctx: BotContext<'_>) -> Result<bool, BotError> {
    let Some(member) = ctx.author_member().await else {
        return Ok(false);
    };
    if member
        .permissions
        .map(|permissions| permissions.administrator())
        .unwrap_or(false)
    {
        return Ok(true);
    }

    let is_manager = match ctx.get_config().await? {
        Some(config) => member.roles.contains(&config.manager_role()?),
        None => false,
    };
    if !is_manager {
        warn!("{} tried to run a manager command", ctx.author().name);
        ctx.reply_embed(
            "Missing permissions",
            "Only managers can run this command.",
            Colour::RED,
        )
        .await?;
    }
    Ok(is_manager)
}

/// Passes once `/set_config` has been run in the guild.
pub async fn is_config_set(ctx: BotContext<'_>) -> Result<bool, BotError> {
    if ctx.get_config().await?.is_some() {
        return Ok(true);
    }
    ctx.reply_error(CommonError::ConfigNotSet.to_string()).await?;
    Ok(false)
}
