//! The reconciliation loop.
//!
//! Every tick re-reads all non-terminal events from the store, refreshes their announcement,
//! asks [`lifecycle::evaluate`] what is due and applies it.
//!
//! Each one-shot write is conditional and happens *before* its side effect: only the caller that
//! flipped the flag sends the notification. A crash between the two loses that notification but
//! never sends it twice (at-most-once delivery).

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::database::models::Event;
use crate::database::EventDatabase;
use crate::lifecycle::{self, Reminder, Transition};
use crate::notify::{refresh_announcement, render, Notifier, NotifyError};
use crate::utils::error::ErrorKind;
use crate::BotError;

/// Drives every event through its lifecycle on a fixed period.
pub struct Scheduler<DB, N> {
    database: DB,
    notifier: N,
    period: Duration,
    /// Status label last rendered per event, to avoid editing unchanged announcements.
    rendered: Mutex<HashMap<i64, String>>,
}

impl<DB, N> Scheduler<DB, N>
where
    DB: EventDatabase<Error = BotError>,
    N: Notifier,
{
    pub fn new(database: DB, notifier: N, period: Duration) -> Self {
        Self {
            database,
            notifier,
            period,
            rendered: Mutex::new(HashMap::new()),
        }
    }

    /// Runs ticks until `shutdown` is cancelled. A tick never overlaps the previous one.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Scheduler started with a period of {:?}", self.period);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scheduler stopped");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!("Reconciliation tick failed: {}", e);
                    }
                }
            }
        }
    }

    /// Reconciles every non-terminal event once, as of `now`.
    ///
    /// Failures are isolated per event. Only a failure to enumerate events fails the tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<(), BotError> {
        let event_ids: Vec<i64> = self
            .database
            .stream_active_events()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => Some(event.event_id),
                    Err(e) => {
                        error!("Skipping an unreadable event: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        stream::iter(event_ids)
            .for_each_concurrent(None, |event_id| async move {
                if let Err(e) = self.reconcile(event_id, now).await {
                    error!("Unable to reconcile event {}: {}", event_id, e);
                }
            })
            .await;

        self.forget_finished().await;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reconcile(&self, event_id: i64, now: DateTime<Utc>) -> Result<(), BotError> {
        // The enumeration may be stale by now; always act on a fresh snapshot.
        let Some(event) = self.database.get_event(event_id).await? else {
            return Ok(());
        };
        if event.is_ended() {
            return Ok(());
        }

        self.refresh_display(&event).await;

        let plan = lifecycle::evaluate(&event, now);
        if plan.is_empty() {
            debug!(
                "Nothing to do for event {} until {:?}",
                event.event_id,
                lifecycle::next_deadline(&event, now)
            );
            return Ok(());
        }
        for reminder in plan.reminders {
            send_reminder(&self.database, &self.notifier, &event, reminder).await?;
        }
        if let Some(transition) = plan.transition {
            apply(&self.database, &self.notifier, &event, transition).await?;
            self.rendered.lock().await.remove(&event.event_id);
        }
        Ok(())
    }

    async fn refresh_display(&self, event: &Event) {
        let label = event.status_label();
        let unchanged = self.rendered.lock().await.get(&event.event_id) == Some(&label);
        if unchanged {
            return;
        }
        match refresh_announcement(&self.notifier, event).await {
            Ok(()) => {
                self.rendered.lock().await.insert(event.event_id, label);
            }
            Err(e) => warn!(
                "Unable to refresh the announcement of event {}: {}",
                event.event_id, e
            ),
        }
    }

    /// Drops rendered labels of events that are no longer active.
    async fn forget_finished(&self) {
        let active: Vec<i64> = self
            .database
            .stream_active_events()
            .filter_map(|event| async move { event.ok().map(|e| e.event_id) })
            .collect()
            .await;
        self.rendered
            .lock()
            .await
            .retain(|event_id, _| active.contains(event_id));
    }
}

/// Sends a reminder if this caller is the one that flips its flag.
async fn send_reminder<DB, N>(
    database: &DB,
    notifier: &N,
    event: &Event,
    reminder: Reminder,
) -> Result<(), BotError>
where
    DB: EventDatabase<Error = BotError>,
    N: Notifier,
{
    if !database.mark_reminder(event.event_id, reminder).await? {
        debug!("{:?} reminder of event {} was already sent", reminder, event.event_id);
        return Ok(());
    }
    info!("Sending the {:?} reminder of event {}", reminder, event.name);
    let result = notifier
        .post(event.announce_channel_id, &render::reminder(event, reminder))
        .await
        .map(|_| ());
    log_delivery(event, "a reminder", result);
    Ok(())
}

/// Applies a lifecycle transition: the conditional status write first, then its effects.
///
/// Returns `false` if the event had already left the source state.
pub async fn apply<DB, N>(
    database: &DB,
    notifier: &N,
    event: &Event,
    transition: Transition,
) -> Result<bool, BotError>
where
    DB: EventDatabase<Error = BotError>,
    N: Notifier,
{
    let target = transition.target();
    if !database.transition(event.event_id, target).await? {
        debug!("Event {} already left {}", event.event_id, event.status);
        return Ok(false);
    }
    info!("Event {} is now {}", event.name, target);

    let mut after = event.clone();
    after.status = target;

    match transition {
        Transition::Cancel => cancel(notifier, &after).await,
        Transition::Start => start(notifier, &after).await,
        Transition::End => end(notifier, &after).await,
    }
    Ok(true)
}

/// Manually terminates an event: jumps straight to the end effects, whatever the clock says.
pub async fn terminate<DB, N>(database: &DB, notifier: &N, event: &Event) -> Result<bool, BotError>
where
    DB: EventDatabase<Error = BotError>,
    N: Notifier,
{
    match lifecycle::terminate(event) {
        Some(transition) => apply(database, notifier, event, transition).await,
        None => Ok(false),
    }
}

fn log_delivery(event: &Event, what: &str, result: Result<(), NotifyError>) {
    let Err(e) = result else {
        return;
    };
    match (&e, e.kind()) {
        (NotifyError::Unreachable(_), _) => {
            debug!("Skipped {} for event {}: recipient unreachable", what, event.event_id)
        }
        (_, ErrorKind::NotFound) => {
            info!("Skipped {} for event {}: {}", what, event.event_id, e)
        }
        _ => warn!("Unable to deliver {} for event {}: {}", what, event.event_id, e),
    }
}

async fn cancel<N: Notifier>(notifier: &N, event: &Event) {
    let result = notifier
        .post(event.announce_channel_id, &render::cancellation(event))
        .await
        .map(|_| ());
    log_delivery(event, "the cancellation notice", result);
    log_delivery(
        event,
        "the final announcement",
        refresh_announcement(notifier, event).await,
    );
}

async fn start<N: Notifier>(notifier: &N, event: &Event) {
    let text = render::start_direct_message(event);
    for participant in &event.participants {
        log_delivery(
            event,
            "a role grant",
            notifier
                .grant_role(event.guild_id, participant.user_id, event.role_id)
                .await,
        );
        log_delivery(
            event,
            "a start direct message",
            notifier.direct_message(participant.user_id, &text).await,
        );
    }
    let result = notifier
        .post(event.waiting_channel_id, &render::start(event))
        .await
        .map(|_| ());
    log_delivery(event, "the start notice", result);
    log_delivery(
        event,
        "the announcement",
        refresh_announcement(notifier, event).await,
    );
}

async fn end<N: Notifier>(notifier: &N, event: &Event) {
    for participant in &event.participants {
        let holds_role = match notifier
            .resolve_member(event.guild_id, participant.user_id)
            .await
        {
            Ok(Some(member)) => member.has_role(event.role_id),
            Ok(None) => false,
            Err(e) => {
                warn!("Unable to resolve {}: {}", participant.user_id, e);
                false
            }
        };
        if holds_role {
            log_delivery(
                event,
                "a role revocation",
                notifier
                    .revoke_role(event.guild_id, participant.user_id, event.role_id)
                    .await,
            );
        }
    }
    let result = notifier
        .post(event.announce_channel_id, &render::end(event))
        .await
        .map(|_| ());
    log_delivery(event, "the end notice", result);
    if let Some(message_id) = event.embed_message_id {
        log_delivery(
            event,
            "the announcement deletion",
            notifier.delete(event.announce_channel_id, message_id).await,
        );
    }
}
