//! The event lifecycle as a pure decision function.
//!
//! Given a snapshot of an event and the current instant, [`evaluate`] says which one-shot
//! reminders are due and which lifecycle transition, if any, must be applied next. It performs no
//! I/O; the scheduler applies the plan.

use chrono::{DateTime, Duration, Utc};

use crate::database::models::{Event, EventStatus};

/// Morning reminder window, in minutes before the start: (11h59, 12h01).
pub const MORNING_REMINDER_WINDOW: (i64, i64) = (11 * 60 + 59, 12 * 60 + 1);
/// 30-minute reminder window, in minutes before the start.
pub const THIRTY_MINUTE_REMINDER_WINDOW: (i64, i64) = (29, 31);
/// Under-capacity events are canceled once the start is closer than this many minutes.
pub const CANCELLATION_LEAD_MINUTES: i64 = 30;

/// A one-shot reminder sent before an event starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reminder {
    Morning,
    ThirtyMinutes,
}

impl Reminder {
    pub fn window(&self) -> (i64, i64) {
        match self {
            Reminder::Morning => MORNING_REMINDER_WINDOW,
            Reminder::ThirtyMinutes => THIRTY_MINUTE_REMINDER_WINDOW,
        }
    }

    pub fn is_sent(&self, event: &Event) -> bool {
        match self {
            Reminder::Morning => event.morning_notified,
            Reminder::ThirtyMinutes => event.thirty_min_notified,
        }
    }
}

/// A change of lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Cancel,
    Start,
    End,
}

impl Transition {
    /// The status an event is in after the transition.
    pub fn target(&self) -> EventStatus {
        match self {
            Transition::Cancel => EventStatus::Canceled,
            Transition::Start => EventStatus::Started,
            Transition::End => EventStatus::Ended,
        }
    }
}

/// What the scheduler has to do for an event during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub reminders: Vec<Reminder>,
    pub transition: Option<Transition>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty() && self.transition.is_none()
    }
}

fn within(lead: Duration, (after, before): (i64, i64)) -> bool {
    lead > Duration::minutes(after) && lead < Duration::minutes(before)
}

/// Computes the plan for `event` at `now`.
///
/// Reminders are evaluated first and independently. Then the first matching transition wins,
/// in order: cancellation, start, end.
pub fn evaluate(event: &Event, now: DateTime<Utc>) -> Plan {
    let mut plan = Plan::default();
    let lead = event.start_time - now;

    match event.status {
        EventStatus::Ended | EventStatus::Canceled => {}
        EventStatus::Scheduled => {
            for reminder in [Reminder::Morning, Reminder::ThirtyMinutes] {
                if !reminder.is_sent(event) && within(lead, reminder.window()) {
                    plan.reminders.push(reminder);
                }
            }

            let under_capacity = event.participants.len() < event.min_participants as usize;
            plan.transition = if lead < Duration::minutes(CANCELLATION_LEAD_MINUTES) && under_capacity
            {
                Some(Transition::Cancel)
            } else if now > event.start_time {
                Some(Transition::Start)
            } else {
                None
            };
        }
        EventStatus::Started => {
            if now > event.end_time() {
                plan.transition = Some(Transition::End);
            }
        }
    }

    plan
}

/// Manual termination: ends any non-terminal event regardless of the clock.
pub fn terminate(event: &Event) -> Option<Transition> {
    (!event.status.is_terminal()).then_some(Transition::End)
}

/// The next instant after `now` at which [`evaluate`] may return a different plan.
pub fn next_deadline(event: &Event, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let start = event.start_time;
    let candidates = match event.status {
        EventStatus::Ended | EventStatus::Canceled => return None,
        EventStatus::Scheduled => vec![
            start - Duration::minutes(MORNING_REMINDER_WINDOW.1),
            start - Duration::minutes(MORNING_REMINDER_WINDOW.0),
            start - Duration::minutes(THIRTY_MINUTE_REMINDER_WINDOW.1),
            start - Duration::minutes(CANCELLATION_LEAD_MINUTES),
            start - Duration::minutes(THIRTY_MINUTE_REMINDER_WINDOW.0),
            start,
        ],
        EventStatus::Started => vec![event.end_time()],
    };

    candidates.into_iter().filter(|instant| *instant > now).min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Participant;
    use crate::testing::sample_event;
    use poise::serenity_prelude::UserId;
    use proptest::prelude::*;

    fn with_participants(mut event: Event, count: u64) -> Event {
        for id in 1..=count {
            event
                .participants
                .push(Participant::new(UserId::new(id), format!("user{id}"), ""));
        }
        event
    }

    fn at_lead(lead: Duration, max: u32, min: u32) -> (Event, DateTime<Utc>) {
        let now = Utc::now();
        (sample_event(now + lead, max, min), now)
    }

    #[test]
    fn morning_reminder_fires_inside_window_only() {
        let (event, now) = at_lead(Duration::hours(12), 4, 0);
        assert_eq!(evaluate(&event, now).reminders, vec![Reminder::Morning]);

        let (event, now) = at_lead(Duration::minutes(11 * 60 + 59), 4, 0);
        assert!(evaluate(&event, now).reminders.is_empty());

        let (event, now) = at_lead(Duration::minutes(12 * 60 + 1), 4, 0);
        assert!(evaluate(&event, now).reminders.is_empty());

        let (event, now) = at_lead(Duration::minutes(12 * 60 + 1) - Duration::seconds(1), 4, 0);
        assert_eq!(evaluate(&event, now).reminders, vec![Reminder::Morning]);
    }

    #[test]
    fn sent_reminders_are_not_repeated() {
        let (mut event, now) = at_lead(Duration::hours(12), 4, 0);
        event.morning_notified = true;
        assert!(evaluate(&event, now).is_empty());

        let (mut event, now) = at_lead(Duration::minutes(30) + Duration::seconds(10), 4, 0);
        assert_eq!(evaluate(&event, now).reminders, vec![Reminder::ThirtyMinutes]);
        event.thirty_min_notified = true;
        assert!(evaluate(&event, now).is_empty());
    }

    #[test]
    fn under_capacity_event_is_canceled_inside_thirty_minutes() {
        let (event, now) = at_lead(Duration::minutes(10), 4, 2);
        let event = with_participants(event, 1);
        assert_eq!(evaluate(&event, now).transition, Some(Transition::Cancel));

        // Exactly thirty minutes out is not yet inside the window.
        let (event, now) = at_lead(Duration::minutes(30), 4, 2);
        assert_eq!(evaluate(&event, now).transition, None);
    }

    #[test]
    fn reminder_and_cancellation_can_share_a_tick() {
        let (event, now) = at_lead(Duration::minutes(29) + Duration::seconds(30), 4, 2);
        let plan = evaluate(&event, now);
        assert_eq!(plan.reminders, vec![Reminder::ThirtyMinutes]);
        assert_eq!(plan.transition, Some(Transition::Cancel));
    }

    #[test]
    fn event_starts_strictly_after_start_time() {
        let now = Utc::now();
        let event = with_participants(sample_event(now, 4, 1), 1);
        assert_eq!(evaluate(&event, now).transition, None);

        let event = with_participants(sample_event(now - Duration::seconds(1), 4, 1), 1);
        assert_eq!(evaluate(&event, now).transition, Some(Transition::Start));
    }

    #[test]
    fn cancellation_wins_over_start() {
        let now = Utc::now();
        let event = sample_event(now - Duration::seconds(1), 4, 2);
        assert_eq!(evaluate(&event, now).transition, Some(Transition::Cancel));
    }

    #[test]
    fn started_event_ends_after_its_duration() {
        let now = Utc::now();
        let mut event = with_participants(sample_event(now - Duration::minutes(61), 4, 2), 2);
        event.status = EventStatus::Started;
        assert_eq!(evaluate(&event, now).transition, Some(Transition::End));

        event.start_time = now - Duration::minutes(30);
        assert_eq!(evaluate(&event, now).transition, None);
    }

    #[test]
    fn started_event_is_never_canceled() {
        let now = Utc::now();
        let mut event = sample_event(now - Duration::minutes(5), 4, 2);
        event.status = EventStatus::Started;
        assert!(evaluate(&event, now).is_empty());
    }

    #[test]
    fn terminal_events_have_nothing_to_do() {
        let now = Utc::now();
        for status in [EventStatus::Ended, EventStatus::Canceled] {
            let mut event = sample_event(now - Duration::days(1), 4, 2);
            event.status = status;
            assert!(evaluate(&event, now).is_empty());
            assert_eq!(terminate(&event), None);
            assert_eq!(next_deadline(&event, now), None);
        }
    }

    #[test]
    fn terminate_ends_scheduled_and_started_events() {
        let now = Utc::now();
        let mut event = sample_event(now + Duration::days(3), 4, 2);
        assert_eq!(terminate(&event), Some(Transition::End));
        event.status = EventStatus::Started;
        assert_eq!(terminate(&event), Some(Transition::End));
    }

    #[test]
    fn next_deadline_walks_the_schedule() {
        let now = Utc::now();
        let event = sample_event(now + Duration::hours(13), 4, 2);
        assert_eq!(
            next_deadline(&event, now),
            Some(event.start_time - Duration::minutes(12 * 60 + 1))
        );

        let event = sample_event(now + Duration::minutes(20), 4, 2);
        assert_eq!(next_deadline(&event, now), Some(event.start_time));

        let mut event = sample_event(now - Duration::minutes(20), 4, 2);
        event.status = EventStatus::Started;
        assert_eq!(next_deadline(&event, now), Some(event.end_time()));
    }

    proptest! {
        #[test]
        fn plans_respect_one_shot_flags(
            lead_secs in -200_000i64..200_000,
            morning in any::<bool>(),
            thirty in any::<bool>(),
            registered in 0u64..6,
            min in 0u32..6,
        ) {
            let now = Utc::now();
            let mut event = with_participants(
                sample_event(now + Duration::seconds(lead_secs), 6, min),
                registered,
            );
            event.morning_notified = morning;
            event.thirty_min_notified = thirty;

            let plan = evaluate(&event, now);
            for reminder in &plan.reminders {
                prop_assert!(!reminder.is_sent(&event));
            }
            if let Some(transition) = plan.transition {
                prop_assert!(transition.target().sources().contains(&event.status));
            }
        }

        #[test]
        fn terminal_events_never_plan(lead_secs in -200_000i64..200_000, canceled in any::<bool>()) {
            let now = Utc::now();
            let mut event = sample_event(now + Duration::seconds(lead_secs), 6, 3);
            event.status = if canceled { EventStatus::Canceled } else { EventStatus::Ended };
            prop_assert!(evaluate(&event, now).is_empty());
        }
    }
}
