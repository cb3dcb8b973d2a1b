use chrono::{DateTime, Utc};
use poise::serenity_prelude::Colour;

use super::Notice;
use crate::database::models::{Contest, ContestEntrant, Event, EventStatus, Participant};
use crate::event_handler::EventButton;
use crate::lifecycle::Reminder;

/// Emoji users react with to enter a contest.
pub const CONTEST_EMOJI: char = '🎉';

/// Discord refuses embed field values longer than this.
const FIELD_LIMIT: usize = 1024;

fn timestamp(instant: DateTime<Utc>) -> String {
    format!("<t:{}:F> (<t:{}:R>)", instant.timestamp(), instant.timestamp())
}

fn mentions(event: &Event) -> String {
    event
        .participants
        .iter()
        .map(|p| format!("<@{}>", p.user_id))
        .collect::<Vec<_>>()
        .join(" ")
}

fn participant_list(participants: &[Participant]) -> String {
    if participants.is_empty() {
        return "Nobody yet".to_string();
    }
    let mut list = String::new();
    for (index, participant) in participants.iter().enumerate() {
        let line = format!("{}. {}\n", index + 1, participant.pseudonym);
        if list.len() + line.len() > FIELD_LIMIT - 32 {
            list.push_str(&format!("…and {} more", participants.len() - index));
            break;
        }
        list.push_str(&line);
    }
    list
}

/// The live announcement of an event, with its registration buttons.
pub fn announcement(event: &Event) -> Notice {
    let colour = match event.status {
        EventStatus::Scheduled if event.is_full() => Colour::GOLD.0,
        EventStatus::Scheduled => Colour::BLUE.0,
        EventStatus::Started => Colour::DARK_GREEN.0,
        EventStatus::Ended | EventStatus::Canceled => Colour::DARK_GREY.0,
    };
    let mut notice = Notice::new(format!("📅 {}", event.name), event.game_name.clone(), colour)
        .field("Start", timestamp(event.start_time), false)
        .field("Duration", format!("{} min", event.duration_minutes), true)
        .field(
            "Participants",
            format!(
                "{}/{} ({} left)",
                event.participants.len(),
                event.max_participants,
                event.remaining_slots()
            ),
            true,
        )
        .field("Minimum", event.min_participants.to_string(), true)
        .field("Status", event.status_label(), true)
        .field("Registered", participant_list(&event.participants), false);

    if event.status == EventStatus::Scheduled {
        if !event.is_full() {
            notice = notice.button(EventButton::Register(event.event_id).custom_id(), "Register", false);
        }
        notice = notice.button(EventButton::Withdraw(event.event_id).custom_id(), "Withdraw", true);
    }
    notice
}

pub fn reminder(event: &Event, reminder: Reminder) -> Notice {
    let description = match reminder {
        Reminder::Morning => format!(
            "**{}** starts in 12 hours. See you there!",
            event.name
        ),
        Reminder::ThirtyMinutes => format!(
            "**{}** starts in 30 minutes. Get ready!",
            event.name
        ),
    };
    Notice::new("⏰ Reminder", description, Colour::ORANGE.0)
        .content(mentions(event))
        .field("Start", timestamp(event.start_time), false)
}

pub fn cancellation(event: &Event) -> Notice {
    Notice::new(
        "❌ Event canceled",
        format!(
            "**{}** was canceled: only {} of the {} required participants registered.",
            event.name,
            event.participants.len(),
            event.min_participants
        ),
        Colour::RED.0,
    )
    .content(mentions(event))
}

pub fn start(event: &Event) -> Notice {
    Notice::new(
        "🚀 Event started",
        format!("**{}** has started. Good luck everyone!", event.name),
        Colour::DARK_GREEN.0,
    )
    .content(format!("<@&{}>", event.role_id))
    .field("Players", participant_list(&event.participants), false)
}

pub fn start_direct_message(event: &Event) -> String {
    format!(
        "**{}** ({}) is starting now! Head over to <#{}>.",
        event.name, event.game_name, event.waiting_channel_id
    )
}

pub fn end(event: &Event) -> Notice {
    Notice::new(
        "🏁 Event ended",
        format!("**{}** is over. Thanks for playing!", event.name),
        Colour::DARK_GREY.0,
    )
}

pub fn event_winner(event: &Event, winner: &Participant) -> Notice {
    Notice::new(
        "🎲 Winner drawn",
        format!(
            "<@{}> ({}) won the draw for **{}**!",
            winner.user_id, winner.pseudonym, event.name
        ),
        Colour::GOLD.0,
    )
    .content(format!("<@{}>", winner.user_id))
}

pub fn contest_announcement(name: &str, end_date: DateTime<Utc>) -> Notice {
    Notice::new(
        format!("🎁 {}", name),
        format!("React with {} to enter the contest!", CONTEST_EMOJI),
        Colour::PURPLE.0,
    )
    .field("Ends", timestamp(end_date), false)
}

pub fn contest_winner(contest: &Contest, winner: &ContestEntrant) -> Notice {
    Notice::new(
        "🏆 Contest winner",
        format!(
            "Congratulations <@{}>, you won **{}** out of {} participants!",
            winner.user_id,
            contest.name,
            contest.participants.len()
        ),
        Colour::GOLD.0,
    )
    .content(format!("<@{}>", winner.user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_event;
    use chrono::Duration;
    use poise::serenity_prelude::UserId;

    #[test]
    fn announcement_shows_capacity_and_buttons() {
        let mut event = sample_event(Utc::now() + Duration::hours(2), 2, 1);
        event
            .participants
            .push(Participant::new(UserId::new(10), "Alice", "Ace"));

        let notice = announcement(&event);
        assert!(notice
            .fields
            .iter()
            .any(|(name, value, _)| name == "Participants" && value == "1/2 (1 left)"));
        assert!(notice
            .fields
            .iter()
            .any(|(name, value, _)| name == "Registered" && value.contains("Ace")));
        assert_eq!(notice.buttons.len(), 2);

        event
            .participants
            .push(Participant::new(UserId::new(11), "Bob", ""));
        let notice = announcement(&event);
        assert_eq!(notice.buttons.len(), 1);
        assert!(notice.buttons[0].danger);

        event.status = EventStatus::Ended;
        assert!(announcement(&event).buttons.is_empty());
    }

    #[test]
    fn long_participant_lists_are_truncated() {
        let participants: Vec<_> = (1..=200)
            .map(|id| Participant::new(UserId::new(id), "Someone", &"p".repeat(20)))
            .collect();
        let list = participant_list(&participants);
        assert!(list.len() <= FIELD_LIMIT);
        assert!(list.contains("more"));
    }

    #[test]
    fn reminders_mention_participants() {
        let mut event = sample_event(Utc::now() + Duration::minutes(30), 4, 1);
        event
            .participants
            .push(Participant::new(UserId::new(42), "Alice", ""));
        let notice = reminder(&event, Reminder::ThirtyMinutes);
        assert_eq!(notice.content.as_deref(), Some("<@42>"));
    }
}
