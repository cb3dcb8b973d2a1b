use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};
use thiserror::Error;
use tracing::debug;

use crate::database::models::Event;
use crate::utils::error::ErrorKind;

/// The serenity implementation of [`Notifier`].
pub mod discord;
/// Turns events and contests into [`Notice`]s.
pub mod render;

pub use discord::DiscordNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The user does not accept direct messages from the bot.
    #[error("User is unreachable: {0}")]
    Unreachable(String),
    /// The channel, message or member no longer exists.
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unable to deliver: {0}")]
    Delivery(String),
}

impl NotifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotifyError::NotFound(_) => ErrorKind::NotFound,
            NotifyError::Unreachable(_) | NotifyError::Delivery(_) => ErrorKind::Delivery,
        }
    }
}

/// A button attached to a notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeButton {
    pub custom_id: String,
    pub label: String,
    pub danger: bool,
}

/// Rich message content, independent of the chat platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notice {
    /// Plain text sent above the embed. Used for mentions.
    pub content: Option<String>,
    pub title: String,
    pub description: String,
    pub fields: Vec<(String, String, bool)>,
    pub colour: u32,
    pub buttons: Vec<NoticeButton>,
}

impl Notice {
    pub fn new(title: impl Into<String>, description: impl Into<String>, colour: u32) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            colour,
            ..Default::default()
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push((name.into(), value.into(), inline));
        self
    }

    pub fn button(mut self, custom_id: impl Into<String>, label: impl Into<String>, danger: bool) -> Self {
        self.buttons.push(NoticeButton {
            custom_id: custom_id.into(),
            label: label.into(),
            danger,
        });
        self
    }
}

/// A guild member as seen by the role provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub display_name: String,
    pub roles: Vec<RoleId>,
}

impl MemberInfo {
    pub fn has_role(&self, role_id: RoleId) -> bool {
        self.roles.contains(&role_id)
    }
}

/// The chat platform as seen by the core: message delivery plus the role/membership provider.
///
/// Every call is fallible on its own; callers decide whether a failure matters.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn post(&self, channel_id: ChannelId, notice: &Notice) -> Result<MessageId, NotifyError>;

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        notice: &Notice,
    ) -> Result<(), NotifyError>;

    async fn delete(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), NotifyError>;

    async fn react(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: char,
    ) -> Result<(), NotifyError>;

    async fn direct_message(&self, user_id: UserId, text: &str) -> Result<(), NotifyError>;

    async fn grant_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), NotifyError>;

    async fn revoke_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), NotifyError>;

    /// Looks a member up. `Ok(None)` means the user left the guild.
    async fn resolve_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Option<MemberInfo>, NotifyError>;
}

/// Re-renders the announcement embed of an event, if it was posted.
pub async fn refresh_announcement<N: Notifier>(notifier: &N, event: &Event) -> Result<(), NotifyError> {
    let Some(message_id) = event.embed_message_id else {
        debug!("Event {} has no announcement message to refresh", event.event_id);
        return Ok(());
    };
    notifier
        .edit(event.announce_channel_id, message_id, &render::announcement(event))
        .await
}
