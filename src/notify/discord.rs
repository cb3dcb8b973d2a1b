use std::sync::Arc;

use poise::serenity_prelude::{
    self as serenity, ButtonStyle, ChannelId, CreateActionRow, CreateButton, CreateEmbed,
    CreateMessage, EditMessage, GuildId, Http, MessageId, RoleId, UserId,
};
use tracing::instrument;

use super::{MemberInfo, Notice, Notifier, NotifyError};

/// Delivers notices through the Discord HTTP API.
#[derive(Clone)]
pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl std::fmt::Debug for DiscordNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordNotifier").finish_non_exhaustive()
    }
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn embed(notice: &Notice) -> CreateEmbed {
    CreateEmbed::new()
        .title(&notice.title)
        .description(&notice.description)
        .fields(
            notice
                .fields
                .iter()
                .map(|(name, value, inline)| (name.clone(), value.clone(), *inline)),
        )
        .colour(notice.colour)
}

fn components(notice: &Notice) -> Vec<CreateActionRow> {
    if notice.buttons.is_empty() {
        return vec![];
    }
    let buttons = notice
        .buttons
        .iter()
        .map(|button| {
            CreateButton::new(&button.custom_id)
                .label(&button.label)
                .style(if button.danger {
                    ButtonStyle::Danger
                } else {
                    ButtonStyle::Primary
                })
        })
        .collect();
    vec![CreateActionRow::Buttons(buttons)]
}

/// Which call a failed request came from. Only direct messages read a 403 as an unreachable
/// recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    DirectMessage,
    Guild,
}

fn classify_status(status: Option<u16>, request: Request, message: String) -> NotifyError {
    match (status, request) {
        (Some(404), _) => NotifyError::NotFound(message),
        (Some(403), Request::DirectMessage) => NotifyError::Unreachable(message),
        _ => NotifyError::Delivery(message),
    }
}

/// Maps a serenity error onto the notification error taxonomy.
fn classify_as(request: Request) -> impl Fn(serenity::Error) -> NotifyError {
    move |error| {
        let status = match &error {
            serenity::Error::Http(http_error) => {
                http_error.status_code().map(|status| status.as_u16())
            }
            _ => None,
        };
        classify_status(status, request, error.to_string())
    }
}

fn classify(error: serenity::Error) -> NotifyError {
    classify_as(Request::Guild)(error)
}

impl Notifier for DiscordNotifier {
    #[instrument(skip(self, notice), fields(title = %notice.title))]
    async fn post(&self, channel_id: ChannelId, notice: &Notice) -> Result<MessageId, NotifyError> {
        let mut message = CreateMessage::new()
            .embed(embed(notice))
            .components(components(notice));
        if let Some(content) = &notice.content {
            message = message.content(content);
        }
        let sent = channel_id
            .send_message(self.http.as_ref(), message)
            .await
            .map_err(classify)?;
        Ok(sent.id)
    }

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        notice: &Notice,
    ) -> Result<(), NotifyError> {
        let message = EditMessage::new()
            .embed(embed(notice))
            .components(components(notice));
        channel_id
            .edit_message(self.http.as_ref(), message_id, message)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), NotifyError> {
        channel_id
            .delete_message(self.http.as_ref(), message_id)
            .await
            .map_err(classify)
    }

    async fn react(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: char,
    ) -> Result<(), NotifyError> {
        channel_id
            .create_reaction(self.http.as_ref(), message_id, emoji)
            .await
            .map_err(classify)
    }

    async fn direct_message(&self, user_id: UserId, text: &str) -> Result<(), NotifyError> {
        user_id
            .direct_message(self.http.as_ref(), CreateMessage::new().content(text))
            .await
            .map_err(classify_as(Request::DirectMessage))?;
        Ok(())
    }

    async fn grant_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), NotifyError> {
        self.http
            .add_member_role(guild_id, user_id, role_id, Some("Event started"))
            .await
            .map_err(classify)
    }

    async fn revoke_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), NotifyError> {
        self.http
            .remove_member_role(guild_id, user_id, role_id, Some("Event ended"))
            .await
            .map_err(classify)
    }

    async fn resolve_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Option<MemberInfo>, NotifyError> {
        match guild_id.member(self.http.as_ref(), user_id).await.map_err(classify) {
            Ok(member) => Ok(Some(MemberInfo {
                user_id,
                display_name: member.display_name().to_string(),
                roles: member.roles.clone(),
            })),
            Err(NotifyError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
