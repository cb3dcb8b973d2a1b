use thiserror::Error;

/// The categories every error of the bot falls into.
///
/// The category decides how loudly an error is reported: user mistakes are answered privately,
/// delivery problems are logged and ignored, and store problems are logged as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before persistence.
    Validation,
    /// The event, contest, member or message no longer exists.
    NotFound,
    /// The event is full or closed.
    Capacity,
    /// Already registered, or the name is already taken.
    Duplicate,
    /// A best-effort notification failed.
    Delivery,
    /// The store could not be reached or refused the operation.
    StoreUnavailable,
}

impl ErrorKind {
    /// Whether the error is the user's doing rather than the bot's.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ErrorKind::Validation | ErrorKind::Capacity | ErrorKind::Duplicate | ErrorKind::NotFound
        )
    }
}

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("You are not in a guild.")]
    NotInAGuild,
    #[error("Channel {0} is not a server text channel.")]
    ChannelNotExists(String),
    #[error("No active event is named {0}.")]
    EventNotExists(String),
    #[error("No open contest is named {0}.")]
    ContestNotExists(String),
    #[error("An active {0} is already named {1}.")]
    NameTaken(&'static str, String),
    #[error("The bot has not been configured for this server. Run /set_config first.")]
    ConfigNotSet,
}

impl CommonError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommonError::NameTaken(..) => ErrorKind::Duplicate,
            CommonError::ConfigNotSet => ErrorKind::Validation,
            _ => ErrorKind::NotFound,
        }
    }
}
