//! Registration and withdrawal of event participants.
//!
//! The participant list is written with a compare-and-swap on the event revision. When another
//! writer got there first, the event is re-read and the rules are applied again.

use poise::serenity_prelude::UserId;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::database::models::{Event, Participant};
use crate::database::EventDatabase;
use crate::notify::{refresh_announcement, Notifier};
use crate::utils::error::ErrorKind;
use crate::BotError;

/// How many times a registration is retried after losing a write race.
pub const MAX_REGISTRATION_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("You are already registered for this event.")]
    AlreadyRegistered,
    #[error("Registrations for this event are closed.")]
    RegistrationClosed,
    #[error("You are not registered for this event.")]
    NotRegistered,
    #[error("This event no longer exists.")]
    EventNotFound(i64),
    #[error("Too many people are registering right now, please try again.")]
    Contention(i64),
    #[error("Store unavailable: {0}")]
    Store(#[source] BotError),
}

impl RegistrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistrationError::AlreadyRegistered => ErrorKind::Duplicate,
            RegistrationError::RegistrationClosed => ErrorKind::Capacity,
            RegistrationError::NotRegistered | RegistrationError::EventNotFound(_) => {
                ErrorKind::NotFound
            }
            RegistrationError::Contention(_) | RegistrationError::Store(_) => {
                ErrorKind::StoreUnavailable
            }
        }
    }
}

/// Checks whether `user_id` may join `event` in its current state.
pub fn admit(event: &Event, user_id: UserId) -> Result<(), RegistrationError> {
    if event.participant(user_id).is_some() {
        return Err(RegistrationError::AlreadyRegistered);
    }
    if event.status.is_terminal() || event.is_started() || event.is_full() {
        return Err(RegistrationError::RegistrationClosed);
    }
    Ok(())
}

/// Checks whether `user_id` may leave `event` in its current state.
pub fn release(event: &Event, user_id: UserId) -> Result<(), RegistrationError> {
    if event.participant(user_id).is_none() {
        return Err(RegistrationError::NotRegistered);
    }
    if event.status.is_terminal() || event.is_started() {
        return Err(RegistrationError::RegistrationClosed);
    }
    Ok(())
}

/// Applies `change` to the latest snapshot of the event and writes the participant list back,
/// retrying when the revision moved underneath us.
async fn update_with_retry<DB, F>(
    database: &DB,
    event_id: i64,
    mut change: F,
) -> Result<Event, RegistrationError>
where
    DB: EventDatabase<Error = BotError>,
    F: FnMut(&mut Event) -> Result<(), RegistrationError>,
{
    for attempt in 1..=MAX_REGISTRATION_ATTEMPTS {
        let mut event = database
            .get_event(event_id)
            .await
            .map_err(RegistrationError::Store)?
            .ok_or(RegistrationError::EventNotFound(event_id))?;
        let expected_revision = event.revision;
        change(&mut event)?;

        let written = database
            .update_participants(event_id, expected_revision, &event.participants)
            .await
            .map_err(RegistrationError::Store)?;
        if written {
            event.revision = expected_revision + 1;
            return Ok(event);
        }
        warn!(
            "Participant list of event {} changed concurrently (attempt {}/{})",
            event_id, attempt, MAX_REGISTRATION_ATTEMPTS
        );
    }
    Err(RegistrationError::Contention(event_id))
}

async fn refresh<N: Notifier>(notifier: &N, event: &Event) {
    if let Err(e) = refresh_announcement(notifier, event).await {
        warn!(
            "Unable to refresh the announcement of event {}: {}",
            event.event_id, e
        );
    }
}

/// Registers a participant for an event and refreshes its announcement.
#[instrument(skip(database, notifier, participant), fields(user_id = %participant.user_id))]
pub async fn register<DB, N>(
    database: &DB,
    notifier: &N,
    event_id: i64,
    participant: Participant,
) -> Result<Event, RegistrationError>
where
    DB: EventDatabase<Error = BotError>,
    N: Notifier,
{
    let event = update_with_retry(database, event_id, |event| {
        admit(event, participant.user_id)?;
        event.participants.push(participant.clone());
        Ok(())
    })
    .await?;

    info!(
        "{} registered for event {} ({}/{})",
        participant.user_id,
        event.name,
        event.participants.len(),
        event.max_participants
    );
    refresh(notifier, &event).await;
    Ok(event)
}

/// Removes a participant from an event and refreshes its announcement.
#[instrument(skip(database, notifier))]
pub async fn withdraw<DB, N>(
    database: &DB,
    notifier: &N,
    event_id: i64,
    user_id: UserId,
) -> Result<Event, RegistrationError>
where
    DB: EventDatabase<Error = BotError>,
    N: Notifier,
{
    let event = update_with_retry(database, event_id, |event| {
        release(event, user_id)?;
        event.participants.retain(|p| p.user_id != user_id);
        Ok(())
    })
    .await?;

    info!("{} withdrew from event {}", user_id, event.name);
    refresh(notifier, &event).await;
    Ok(event)
}
