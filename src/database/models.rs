use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use strum::Display;

use crate::{utils::time::ValidationError, BotError};

/// Longest pseudonym a participant can register with.
pub const MAX_PSEUDONYM_LENGTH: usize = 32;

/// Parses a Discord snowflake stored as text.
pub(crate) fn parse_snowflake(raw: &str) -> Result<u64, BotError> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(anyhow!("Invalid snowflake stored in the database: {:?}", raw)),
        Ok(id) => Ok(id),
    }
}

/// The configuration for a guild within the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct GuildConfig {
    pub guild_id: String,
    pub manager_role_id: String,
    pub log_channel_id: String,
}

impl GuildConfig {
    pub fn manager_role(&self) -> Result<RoleId, BotError> {
        Ok(RoleId::new(parse_snowflake(&self.manager_role_id)?))
    }

    pub fn log_channel(&self) -> Result<ChannelId, BotError> {
        Ok(ChannelId::new(parse_snowflake(&self.log_channel_id)?))
    }
}

/// The lifecycle state of an event.
///
/// `Ended` and `Canceled` are terminal: once an event reaches one of them, no further
/// transition applies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize, Display, Default,
)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Scheduled,
    Started,
    Ended,
    Canceled,
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Ended | EventStatus::Canceled)
    }

    /// States an event may be in for a transition into `self` to be legal.
    pub fn sources(&self) -> &'static [EventStatus] {
        match self {
            EventStatus::Scheduled => &[],
            EventStatus::Started | EventStatus::Canceled => &[EventStatus::Scheduled],
            EventStatus::Ended => &[EventStatus::Scheduled, EventStatus::Started],
        }
    }
}

/// Someone who registered for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    pub pseudonym: String,
}

impl Participant {
    /// Builds a participant, falling back to the display name when no pseudonym was given.
    pub fn new(user_id: UserId, display_name: impl Into<String>, pseudonym: &str) -> Self {
        let display_name = display_name.into();
        let pseudonym = match pseudonym.trim() {
            "" => display_name.clone(),
            trimmed => trimmed.chars().take(MAX_PSEUDONYM_LENGTH).collect(),
        };
        Self {
            user_id,
            display_name,
            pseudonym,
        }
    }
}

/// An event row as it is stored in Postgres.
#[derive(Debug, sqlx::FromRow)]
pub struct EventRow {
    pub event_id: i64,
    pub guild_id: String,
    pub name: String,
    pub game_name: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub max_participants: i32,
    pub min_participants: i32,
    pub role_id: String,
    pub announce_channel_id: String,
    pub waiting_channel_id: String,
    pub embed_message_id: Option<String>,
    pub participants: Json<Vec<Participant>>,
    pub status: EventStatus,
    pub morning_notified: bool,
    pub thirty_min_notified: bool,
    pub revision: i64,
}

/// A scheduled community event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event_id: i64,
    pub guild_id: GuildId,
    pub name: String,
    pub game_name: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub max_participants: u32,
    pub min_participants: u32,
    pub role_id: RoleId,
    pub announce_channel_id: ChannelId,
    pub waiting_channel_id: ChannelId,
    pub embed_message_id: Option<MessageId>,
    pub participants: Vec<Participant>,
    pub status: EventStatus,
    pub morning_notified: bool,
    pub thirty_min_notified: bool,
    /// Bumped on every write of the participant list.
    pub revision: i64,
}

impl TryFrom<EventRow> for Event {
    type Error = BotError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let embed_message_id = match row.embed_message_id {
            Some(raw) => Some(MessageId::new(parse_snowflake(&raw)?)),
            None => None,
        };
        Ok(Self {
            event_id: row.event_id,
            guild_id: GuildId::new(parse_snowflake(&row.guild_id)?),
            name: row.name,
            game_name: row.game_name,
            start_time: row.start_time,
            duration_minutes: u32::try_from(row.duration_minutes)?,
            max_participants: u32::try_from(row.max_participants)?,
            min_participants: u32::try_from(row.min_participants)?,
            role_id: RoleId::new(parse_snowflake(&row.role_id)?),
            announce_channel_id: ChannelId::new(parse_snowflake(&row.announce_channel_id)?),
            waiting_channel_id: ChannelId::new(parse_snowflake(&row.waiting_channel_id)?),
            embed_message_id,
            participants: row.participants.0,
            status: row.status,
            morning_notified: row.morning_notified,
            thirty_min_notified: row.thirty_min_notified,
            revision: row.revision,
        })
    }
}

impl Event {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn is_started(&self) -> bool {
        self.status == EventStatus::Started
    }

    /// Canceled events count as ended too.
    pub fn is_ended(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.max_participants as usize
    }

    pub fn remaining_slots(&self) -> usize {
        (self.max_participants as usize).saturating_sub(self.participants.len())
    }

    pub fn participant(&self, user_id: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    /// The status shown to users. "full" is derived from the capacity and never stored.
    pub fn status_label(&self) -> String {
        match self.status {
            EventStatus::Scheduled if self.is_full() => "full".to_string(),
            EventStatus::Scheduled => "open".to_string(),
            status => status.to_string(),
        }
    }

    /// Picks a participant uniformly at random.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Participant> {
        self.participants.choose(rng)
    }
}

/// The fields needed to create an event. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub guild_id: GuildId,
    pub name: String,
    pub game_name: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub max_participants: u32,
    pub min_participants: u32,
    pub role_id: RoleId,
    pub announce_channel_id: ChannelId,
    pub waiting_channel_id: ChannelId,
}

impl NewEvent {
    /// Rejects drafts that would break the event invariants before they reach the store.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.duration_minutes == 0 {
            return Err(ValidationError::ZeroDuration);
        }
        if self.max_participants == 0 {
            return Err(ValidationError::ZeroCapacity);
        }
        if self.min_participants > self.max_participants {
            return Err(ValidationError::MinAboveMax {
                min: self.min_participants,
                max: self.max_participants,
            });
        }
        if self.start_time <= now {
            return Err(ValidationError::StartInPast(self.start_time));
        }
        Ok(())
    }
}

/// Someone who entered a contest by reacting to its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestEntrant {
    pub user_id: UserId,
    pub display_name: String,
}

/// A contest row as it is stored in Postgres.
#[derive(Debug, sqlx::FromRow)]
pub struct ContestRow {
    pub contest_id: i64,
    pub guild_id: String,
    pub name: String,
    pub channel_id: String,
    pub message_id: String,
    pub end_date: DateTime<Utc>,
    pub participants: Json<Vec<ContestEntrant>>,
    pub is_ended: bool,
    pub winner_id: Option<String>,
    pub revision: i64,
}

/// A reaction-driven sweepstake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contest {
    pub contest_id: i64,
    pub guild_id: GuildId,
    pub name: String,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    /// Informational only. Contests are ended manually.
    pub end_date: DateTime<Utc>,
    pub participants: Vec<ContestEntrant>,
    pub is_ended: bool,
    pub winner_id: Option<UserId>,
    pub revision: i64,
}

impl TryFrom<ContestRow> for Contest {
    type Error = BotError;

    fn try_from(row: ContestRow) -> Result<Self, Self::Error> {
        let winner_id = match row.winner_id {
            Some(raw) => Some(UserId::new(parse_snowflake(&raw)?)),
            None => None,
        };
        Ok(Self {
            contest_id: row.contest_id,
            guild_id: GuildId::new(parse_snowflake(&row.guild_id)?),
            name: row.name,
            channel_id: ChannelId::new(parse_snowflake(&row.channel_id)?),
            message_id: MessageId::new(parse_snowflake(&row.message_id)?),
            end_date: row.end_date,
            participants: row.participants.0,
            is_ended: row.is_ended,
            winner_id,
            revision: row.revision,
        })
    }
}

impl Contest {
    pub fn has_entrant(&self, user_id: UserId) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&ContestEntrant> {
        self.participants.choose(rng)
    }
}

#[derive(Debug, Clone)]
pub struct NewContest {
    pub guild_id: GuildId,
    pub name: String,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub end_date: DateTime<Utc>,
}
