use poise::serenity_prelude::{Colour, CreateEmbed, GuildId};
use poise::CreateReply;

use crate::database::{models::GuildConfig, ConfigDatabase};
use crate::utils::error::CommonError;
use crate::{BotContext, BotError};

#[allow(async_fn_in_trait)]
pub trait BotContextExt {
    /// The guild the command runs in.
    fn current_guild(&self) -> Result<GuildId, BotError>;

    async fn get_config(&self) -> Result<Option<GuildConfig>, BotError>;

    /// Replies with an embed only the invoking user can see.
    async fn reply_embed(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        colour: Colour,
    ) -> Result<(), BotError>;

    /// Replies privately with a red error embed.
    async fn reply_error(&self, description: impl Into<String>) -> Result<(), BotError> {
        self.reply_embed("Error", description, Colour::RED).await
    }
}

impl BotContextExt for BotContext<'_> {
    fn current_guild(&self) -> Result<GuildId, BotError> {
        Ok(self.guild_id().ok_or(CommonError::NotInAGuild)?)
    }

    async fn get_config(&self) -> Result<Option<GuildConfig>, BotError> {
        let guild_id = self.current_guild()?;
        self.data().database.get_config(&guild_id).await
    }

    async fn reply_embed(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        colour: Colour,
    ) -> Result<(), BotError> {
        let embed = CreateEmbed::default()
            .title(title.into())
            .description(description.into())
            .colour(colour);
        self.send(CreateReply::default().embed(embed).ephemeral(true))
            .await?;
        Ok(())
    }
}
