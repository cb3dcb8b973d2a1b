use crate::lifecycle::Reminder;
use crate::BotError;
use anyhow::anyhow;
use futures::stream::{BoxStream, StreamExt};
use models::*;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use tracing::{info, instrument};
/// Models for the database.
///
/// These models are specific to the current database design and schema.
/// Rows are mapped to typed domain objects through `TryFrom`.
pub mod models;

/// The Postgres database that stores events, contests and guild configurations.
///
/// It is the only source of truth for event state: nothing else in the bot keeps a copy of an
/// event between two reconciliation ticks.
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pub pool: PgPool,
}

impl PgDatabase {
    /// Connects to the database. Failing here must stop the bot before the scheduler starts.
    pub async fn connect(database_url: &str) -> Result<Self, BotError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| anyhow!("Store unavailable: unable to connect to the database: {}", e))?;
        info!("Successfully connected to the database.");

        Ok(PgDatabase { pool })
    }

    pub async fn migrate(&self) -> Result<(), BotError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[allow(async_fn_in_trait)]
pub trait ConfigDatabase {
    type Error;
    /// Sets the config for a guild.
    async fn set_config(
        &self,
        guild_id: &GuildId,
        manager_role_id: &RoleId,
        log_channel_id: &ChannelId,
    ) -> Result<(), Self::Error>;

    /// Retrieves the config of a given guild from the database.
    async fn get_config(&self, guild_id: &GuildId) -> Result<Option<GuildConfig>, Self::Error>;
}

impl ConfigDatabase for PgDatabase {
    type Error = BotError;

    async fn set_config(
        &self,
        guild_id: &GuildId,
        manager_role_id: &RoleId,
        log_channel_id: &ChannelId,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO config (guild_id, manager_role_id, log_channel_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (guild_id)
            DO UPDATE SET
                manager_role_id = $2,
                log_channel_id = $3
            "#,
        )
        .bind(guild_id.to_string())
        .bind(manager_role_id.to_string())
        .bind(log_channel_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_config(&self, guild_id: &GuildId) -> Result<Option<GuildConfig>, Self::Error> {
        let config = sqlx::query_as::<_, GuildConfig>(
            r#"
            SELECT guild_id, manager_role_id, log_channel_id FROM config WHERE guild_id = $1
            LIMIT 1
            "#,
        )
        .bind(guild_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(config)
    }
}

/// Everything the bot needs from the store to run events.
///
/// Writes that guard a one-shot transition are conditional and return whether this caller
/// performed the write. A `false` means the transition already happened elsewhere.
#[allow(async_fn_in_trait)]
pub trait EventDatabase {
    type Error;

    /// Inserts a new event and returns it with its store-assigned id.
    async fn create_event(&self, event: &NewEvent) -> Result<Event, Self::Error>;

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>, Self::Error>;

    /// Finds the non-terminal event with the given name in a guild.
    async fn get_active_event_by_name(
        &self,
        guild_id: &GuildId,
        name: &str,
    ) -> Result<Option<Event>, Self::Error>;

    /// All non-terminal events of a guild, soonest first.
    async fn get_active_events(&self, guild_id: &GuildId) -> Result<Vec<Event>, Self::Error>;

    /// Streams every non-terminal event across all guilds.
    fn stream_active_events(&self) -> BoxStream<'_, Result<Event, Self::Error>>;

    async fn set_embed_message(
        &self,
        event_id: i64,
        message_id: &MessageId,
    ) -> Result<(), Self::Error>;

    /// Replaces the participant list if the stored revision still equals `expected_revision`.
    async fn update_participants(
        &self,
        event_id: i64,
        expected_revision: i64,
        participants: &[Participant],
    ) -> Result<bool, Self::Error>;

    /// Sets a reminder flag if it is still unset.
    async fn mark_reminder(&self, event_id: i64, reminder: Reminder) -> Result<bool, Self::Error>;

    /// Moves the event into `to` if its current status is one of `to.sources()`.
    async fn transition(&self, event_id: i64, to: EventStatus) -> Result<bool, Self::Error> {
        let sources: Vec<String> = to.sources().iter().map(ToString::to_string).collect();
        if sources.is_empty() {
            return Err(anyhow!("Events cannot transition back to {}", to));
        }
        let result = sqlx::query(
            r#"
            UPDATE events SET status = $2
            WHERE event_id = $1 AND status::text = ANY($3)
            "#,
        )
        .bind(event_id)
        .bind(to)
        .bind(&sources)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// Everything the bot needs from the store to run contests.
#[allow(async_fn_in_trait)]
pub trait ContestDatabase {
    type Error;

    async fn create_contest(&self, contest: &NewContest) -> Result<Contest, Self::Error>;

    async fn get_contest(&self, contest_id: i64) -> Result<Option<Contest>, Self::Error>;

    /// Finds the contest announced by the given message.
    async fn get_contest_by_message(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Contest>, Self::Error>;

    /// Finds the open contest with the given name in a guild.
    async fn get_active_contest_by_name(
        &self,
        guild_id: &GuildId,
        name: &str,
    ) -> Result<Option<Contest>, Self::Error>;

    /// Replaces the entrant list if the stored revision still equals `expected_revision`.
    async fn update_contest_participants(
        &self,
        contest_id: i64,
        expected_revision: i64,
        participants: &[ContestEntrant],
    ) -> Result<bool, Self::Error>;

    /// Marks the contest ended with the given winner if it is still open.
    async fn end_contest(&self, contest_id: i64, winner_id: &UserId) -> Result<bool, Self::Error>;
}

impl ContestDatabase for PgDatabase {
    type Error = BotError;

    #[instrument(skip(self))]
    async fn create_contest(&self, contest: &NewContest) -> Result<Contest, Self::Error> {
        let row = sqlx::query_as::<_, ContestRow>(
            r#"
            INSERT INTO contests (guild_id, name, channel_id, message_id, end_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(contest.guild_id.to_string())
        .bind(&contest.name)
        .bind(contest.channel_id.to_string())
        .bind(contest.message_id.to_string())
        .bind(contest.end_date)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_contest(&self, contest_id: i64) -> Result<Option<Contest>, Self::Error> {
        sqlx::query_as::<_, ContestRow>("SELECT * FROM contests WHERE contest_id = $1")
            .bind(contest_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Contest::try_from)
            .transpose()
    }

    async fn get_contest_by_message(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Contest>, Self::Error> {
        sqlx::query_as::<_, ContestRow>("SELECT * FROM contests WHERE message_id = $1")
            .bind(message_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(Contest::try_from)
            .transpose()
    }

    async fn get_active_contest_by_name(
        &self,
        guild_id: &GuildId,
        name: &str,
    ) -> Result<Option<Contest>, Self::Error> {
        sqlx::query_as::<_, ContestRow>(
            r#"
            SELECT * FROM contests
            WHERE guild_id = $1 AND name = $2 AND is_ended = false
            LIMIT 1
            "#,
        )
        .bind(guild_id.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .map(Contest::try_from)
        .transpose()
    }

    async fn update_contest_participants(
        &self,
        contest_id: i64,
        expected_revision: i64,
        participants: &[ContestEntrant],
    ) -> Result<bool, Self::Error> {
        let result = sqlx::query(
            r#"
            UPDATE contests
            SET participants = $3, revision = revision + 1
            WHERE contest_id = $1 AND revision = $2 AND is_ended = false
            "#,
        )
        .bind(contest_id)
        .bind(expected_revision)
        .bind(Json(participants))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn end_contest(&self, contest_id: i64, winner_id: &UserId) -> Result<bool, Self::Error> {
        let result = sqlx::query(
            r#"
            UPDATE contests
            SET is_ended = true, winner_id = $2
            WHERE contest_id = $1 AND is_ended = false
            "#,
        )
        .bind(contest_id)
        .bind(winner_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
