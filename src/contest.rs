//! Reaction-driven contests: entering and leaving by reaction, ending with a random draw.

use poise::serenity_prelude::{MessageId, UserId};
use rand::Rng;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::database::models::{Contest, ContestEntrant};
use crate::database::ContestDatabase;
use crate::notify::{render, Notifier};
use crate::registry::MAX_REGISTRATION_ATTEMPTS;
use crate::utils::error::ErrorKind;
use crate::BotError;

#[derive(Debug, Error)]
pub enum ContestError {
    #[error("Nobody entered this contest.")]
    NoParticipants,
    #[error("The drawn participant <@{0}> is no longer a member of this server.")]
    WinnerUnresolvable(UserId),
    #[error("This contest has already ended.")]
    ContestEnded,
    #[error("This contest does not exist.")]
    NotFound,
    #[error("Too many people are entering this contest right now.")]
    Contention,
    #[error("Store unavailable: {0}")]
    Store(#[source] BotError),
}

impl ContestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContestError::NoParticipants | ContestError::ContestEnded => ErrorKind::Validation,
            ContestError::WinnerUnresolvable(_) | ContestError::NotFound => ErrorKind::NotFound,
            ContestError::Contention | ContestError::Store(_) => ErrorKind::StoreUnavailable,
        }
    }
}

/// What a reaction did to a contest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    Joined,
    Left,
    /// The reactor was already in (or already out of) the contest.
    Unchanged,
    /// The contest has ended; reactions no longer count.
    Closed,
    /// The message is not a contest.
    Untracked,
}

/// Applies `change` to the open contest posted as `message_id` and writes the entrants back.
///
/// `change` returns whether it modified the contest; `applied` is reported when it did.
async fn update_entrants<DB, F>(
    database: &DB,
    message_id: MessageId,
    applied: ReactionOutcome,
    mut change: F,
) -> Result<ReactionOutcome, ContestError>
where
    DB: ContestDatabase<Error = BotError>,
    F: FnMut(&mut Contest) -> bool,
{
    for _ in 0..MAX_REGISTRATION_ATTEMPTS {
        let Some(mut contest) = database
            .get_contest_by_message(&message_id)
            .await
            .map_err(ContestError::Store)?
        else {
            return Ok(ReactionOutcome::Untracked);
        };
        if contest.is_ended {
            return Ok(ReactionOutcome::Closed);
        }
        if !change(&mut contest) {
            return Ok(ReactionOutcome::Unchanged);
        }
        if database
            .update_contest_participants(contest.contest_id, contest.revision, &contest.participants)
            .await
            .map_err(ContestError::Store)?
        {
            return Ok(applied);
        }
        warn!("Entrants of contest {} changed concurrently", contest.name);
    }
    Err(ContestError::Contention)
}

/// Enters the reactor into the contest posted as `message_id`.
#[instrument(skip(database, display_name))]
pub async fn join<DB>(
    database: &DB,
    message_id: MessageId,
    user_id: UserId,
    display_name: &str,
) -> Result<ReactionOutcome, ContestError>
where
    DB: ContestDatabase<Error = BotError>,
{
    let outcome = update_entrants(database, message_id, ReactionOutcome::Joined, |contest| {
        if contest.has_entrant(user_id) {
            return false;
        }
        contest.participants.push(ContestEntrant {
            user_id,
            display_name: display_name.to_string(),
        });
        true
    })
    .await?;
    if outcome == ReactionOutcome::Joined {
        info!("{} entered the contest on message {}", user_id, message_id);
    }
    Ok(outcome)
}

/// Removes the reactor from the contest posted as `message_id`.
#[instrument(skip(database))]
pub async fn leave<DB>(
    database: &DB,
    message_id: MessageId,
    user_id: UserId,
) -> Result<ReactionOutcome, ContestError>
where
    DB: ContestDatabase<Error = BotError>,
{
    let outcome = update_entrants(database, message_id, ReactionOutcome::Left, |contest| {
        if !contest.has_entrant(user_id) {
            return false;
        }
        contest.participants.retain(|e| e.user_id != user_id);
        true
    })
    .await?;
    if outcome == ReactionOutcome::Left {
        info!("{} left the contest on message {}", user_id, message_id);
    }
    Ok(outcome)
}

/// Ends a contest by drawing one entrant uniformly at random and announcing them.
///
/// A drawn entrant who left the guild fails the call with
/// [`ContestError::WinnerUnresolvable`] and leaves the contest open. Only the caller whose
/// conditional write closes the contest announces the winner.
#[instrument(skip(database, notifier, rng))]
pub async fn end_contest<DB, N, R>(
    database: &DB,
    notifier: &N,
    rng: &mut R,
    contest_id: i64,
) -> Result<ContestEntrant, ContestError>
where
    DB: ContestDatabase<Error = BotError>,
    N: Notifier,
    R: Rng + ?Sized,
{
    let contest: Contest = database
        .get_contest(contest_id)
        .await
        .map_err(ContestError::Store)?
        .ok_or(ContestError::NotFound)?;
    if contest.is_ended {
        return Err(ContestError::ContestEnded);
    }
    let winner = contest.draw(rng).cloned().ok_or(ContestError::NoParticipants)?;

    match notifier.resolve_member(contest.guild_id, winner.user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(ContestError::WinnerUnresolvable(winner.user_id)),
        Err(e) => {
            warn!("Unable to resolve contest winner {}: {}", winner.user_id, e);
            return Err(ContestError::WinnerUnresolvable(winner.user_id));
        }
    }

    if !database
        .end_contest(contest_id, &winner.user_id)
        .await
        .map_err(ContestError::Store)?
    {
        return Err(ContestError::ContestEnded);
    }
    info!("{} won contest {}", winner.user_id, contest.name);

    if let Err(e) = notifier
        .post(contest.channel_id, &render::contest_winner(&contest, &winner))
        .await
    {
        warn!("Unable to announce the winner of contest {}: {}", contest.name, e);
    }
    Ok(winner)
}
