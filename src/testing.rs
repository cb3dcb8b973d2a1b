//! In-memory stand-ins for the store and the chat platform.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};

use crate::database::models::*;
use crate::database::{ConfigDatabase, ContestDatabase, EventDatabase};
use crate::lifecycle::Reminder;
use crate::notify::{MemberInfo, Notice, Notifier, NotifyError};
use crate::BotError;

pub const GUILD: u64 = 1000;
pub const ROLE: u64 = 2000;
pub const ANNOUNCE_CHANNEL: u64 = 3000;
pub const WAITING_CHANNEL: u64 = 3001;

/// An event lasting 60 minutes with no participants.
pub fn sample_event(start_time: DateTime<Utc>, max_participants: u32, min_participants: u32) -> Event {
    Event {
        event_id: 0,
        guild_id: GuildId::new(GUILD),
        name: "Friday raid".to_string(),
        game_name: "Some game".to_string(),
        start_time,
        duration_minutes: 60,
        max_participants,
        min_participants,
        role_id: RoleId::new(ROLE),
        announce_channel_id: ChannelId::new(ANNOUNCE_CHANNEL),
        waiting_channel_id: ChannelId::new(WAITING_CHANNEL),
        embed_message_id: None,
        participants: vec![],
        status: EventStatus::Scheduled,
        morning_notified: false,
        thirty_min_notified: false,
        revision: 0,
    }
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    events: BTreeMap<i64, Event>,
    contests: BTreeMap<i64, Contest>,
    configs: HashMap<GuildId, GuildConfig>,
    broken_events: HashSet<i64>,
    interleaved: HashMap<i64, Participant>,
    rejected_writes: usize,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A store keeping everything in a map, with hooks to simulate failures and races.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
}

impl MemoryDatabase {
    /// Stores the event under a fresh id and returns the id.
    pub fn insert_event(&self, mut event: Event) -> i64 {
        let mut state = self.state.lock().unwrap();
        event.event_id = state.next_id();
        let id = event.event_id;
        state.events.insert(id, event);
        id
    }

    pub fn event(&self, event_id: i64) -> Event {
        self.state.lock().unwrap().events[&event_id].clone()
    }

    pub fn insert_contest(&self, mut contest: Contest) -> i64 {
        let mut state = self.state.lock().unwrap();
        contest.contest_id = state.next_id();
        let id = contest.contest_id;
        state.contests.insert(id, contest);
        id
    }

    pub fn contest(&self, contest_id: i64) -> Contest {
        self.state.lock().unwrap().contests[&contest_id].clone()
    }

    /// Makes every read of the event fail.
    pub fn break_event(&self, event_id: i64) {
        self.state.lock().unwrap().broken_events.insert(event_id);
    }

    /// Registers `participant` right before the next participant write to the event lands.
    pub fn interleave_registration(&self, event_id: i64, participant: Participant) {
        self.state
            .lock()
            .unwrap()
            .interleaved
            .insert(event_id, participant);
    }

    /// Makes the next `count` participant writes lose their compare-and-swap.
    pub fn reject_participant_writes(&self, count: usize) {
        self.state.lock().unwrap().rejected_writes = count;
    }
}

impl ConfigDatabase for MemoryDatabase {
    type Error = BotError;

    async fn set_config(
        &self,
        guild_id: &GuildId,
        manager_role_id: &RoleId,
        log_channel_id: &ChannelId,
    ) -> Result<(), Self::Error> {
        self.state.lock().unwrap().configs.insert(
            *guild_id,
            GuildConfig {
                guild_id: guild_id.to_string(),
                manager_role_id: manager_role_id.to_string(),
                log_channel_id: log_channel_id.to_string(),
            },
        );
        Ok(())
    }

    async fn get_config(&self, guild_id: &GuildId) -> Result<Option<GuildConfig>, Self::Error> {
        Ok(self.state.lock().unwrap().configs.get(guild_id).cloned())
    }
}

impl EventDatabase for MemoryDatabase {
    type Error = BotError;

    async fn create_event(&self, event: &NewEvent) -> Result<Event, Self::Error> {
        let mut stored = sample_event(event.start_time, event.max_participants, event.min_participants);
        stored.guild_id = event.guild_id;
        stored.name = event.name.clone();
        stored.game_name = event.game_name.clone();
        stored.duration_minutes = event.duration_minutes;
        stored.role_id = event.role_id;
        stored.announce_channel_id = event.announce_channel_id;
        stored.waiting_channel_id = event.waiting_channel_id;
        let id = self.insert_event(stored);
        Ok(self.event(id))
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>, Self::Error> {
        let state = self.state.lock().unwrap();
        if state.broken_events.contains(&event_id) {
            return Err(anyhow!("Event {} is unreadable", event_id));
        }
        Ok(state.events.get(&event_id).cloned())
    }

    async fn get_active_event_by_name(
        &self,
        guild_id: &GuildId,
        name: &str,
    ) -> Result<Option<Event>, Self::Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .values()
            .find(|e| e.guild_id == *guild_id && e.name == name && !e.is_ended())
            .cloned())
    }

    async fn get_active_events(&self, guild_id: &GuildId) -> Result<Vec<Event>, Self::Error> {
        let mut events: Vec<Event> = self
            .state
            .lock()
            .unwrap()
            .events
            .values()
            .filter(|e| e.guild_id == *guild_id && !e.is_ended())
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_time);
        Ok(events)
    }

    fn stream_active_events(&self) -> BoxStream<'_, Result<Event, Self::Error>> {
        let events: Vec<Result<Event, BotError>> = self
            .state
            .lock()
            .unwrap()
            .events
            .values()
            .filter(|e| !e.is_ended())
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(events).boxed()
    }

    async fn set_embed_message(
        &self,
        event_id: i64,
        message_id: &MessageId,
    ) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        let event = state
            .events
            .get_mut(&event_id)
            .ok_or_else(|| anyhow!("No event {}", event_id))?;
        event.embed_message_id = Some(*message_id);
        Ok(())
    }

    async fn update_participants(
        &self,
        event_id: i64,
        expected_revision: i64,
        participants: &[Participant],
    ) -> Result<bool, Self::Error> {
        let mut state = self.state.lock().unwrap();
        if state.rejected_writes > 0 {
            state.rejected_writes -= 1;
            return Ok(false);
        }
        let interleaved = state.interleaved.remove(&event_id);
        let event = state
            .events
            .get_mut(&event_id)
            .ok_or_else(|| anyhow!("No event {}", event_id))?;
        if let Some(participant) = interleaved {
            event.participants.push(participant);
            event.revision += 1;
        }
        if event.revision != expected_revision {
            return Ok(false);
        }
        event.participants = participants.to_vec();
        event.revision += 1;
        Ok(true)
    }

    async fn mark_reminder(&self, event_id: i64, reminder: Reminder) -> Result<bool, Self::Error> {
        let mut state = self.state.lock().unwrap();
        let event = state
            .events
            .get_mut(&event_id)
            .ok_or_else(|| anyhow!("No event {}", event_id))?;
        let flag = match reminder {
            Reminder::Morning => &mut event.morning_notified,
            Reminder::ThirtyMinutes => &mut event.thirty_min_notified,
        };
        if *flag {
            return Ok(false);
        }
        *flag = true;
        Ok(true)
    }

    async fn transition(&self, event_id: i64, to: EventStatus) -> Result<bool, Self::Error> {
        let mut state = self.state.lock().unwrap();
        let event = state
            .events
            .get_mut(&event_id)
            .ok_or_else(|| anyhow!("No event {}", event_id))?;
        if !to.sources().contains(&event.status) {
            return Ok(false);
        }
        event.status = to;
        Ok(true)
    }
}

impl ContestDatabase for MemoryDatabase {
    type Error = BotError;

    async fn create_contest(&self, contest: &NewContest) -> Result<Contest, Self::Error> {
        let id = self.insert_contest(Contest {
            contest_id: 0,
            guild_id: contest.guild_id,
            name: contest.name.clone(),
            channel_id: contest.channel_id,
            message_id: contest.message_id,
            end_date: contest.end_date,
            participants: vec![],
            is_ended: false,
            winner_id: None,
            revision: 0,
        });
        Ok(self.contest(id))
    }

    async fn get_contest(&self, contest_id: i64) -> Result<Option<Contest>, Self::Error> {
        Ok(self.state.lock().unwrap().contests.get(&contest_id).cloned())
    }

    async fn get_contest_by_message(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Contest>, Self::Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .contests
            .values()
            .find(|c| c.message_id == *message_id)
            .cloned())
    }

    async fn get_active_contest_by_name(
        &self,
        guild_id: &GuildId,
        name: &str,
    ) -> Result<Option<Contest>, Self::Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .contests
            .values()
            .find(|c| c.guild_id == *guild_id && c.name == name && !c.is_ended)
            .cloned())
    }

    async fn update_contest_participants(
        &self,
        contest_id: i64,
        expected_revision: i64,
        participants: &[ContestEntrant],
    ) -> Result<bool, Self::Error> {
        let mut state = self.state.lock().unwrap();
        let contest = state
            .contests
            .get_mut(&contest_id)
            .ok_or_else(|| anyhow!("No contest {}", contest_id))?;
        if contest.is_ended || contest.revision != expected_revision {
            return Ok(false);
        }
        contest.participants = participants.to_vec();
        contest.revision += 1;
        Ok(true)
    }

    async fn end_contest(&self, contest_id: i64, winner_id: &UserId) -> Result<bool, Self::Error> {
        let mut state = self.state.lock().unwrap();
        let contest = state
            .contests
            .get_mut(&contest_id)
            .ok_or_else(|| anyhow!("No contest {}", contest_id))?;
        if contest.is_ended {
            return Ok(false);
        }
        contest.is_ended = true;
        contest.winner_id = Some(*winner_id);
        Ok(true)
    }
}

/// Something the notifier was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Post { channel_id: ChannelId, notice: Notice },
    Edit { channel_id: ChannelId, message_id: MessageId, notice: Notice },
    Delete { channel_id: ChannelId, message_id: MessageId },
    React { message_id: MessageId, emoji: char },
    DirectMessage { user_id: UserId, text: String },
    Grant { user_id: UserId, role_id: RoleId },
    Revoke { user_id: UserId, role_id: RoleId },
}

#[derive(Default)]
struct RecordingState {
    sent: Vec<Sent>,
    next_message: u64,
    members: HashMap<UserId, MemberInfo>,
    unreachable: HashSet<UserId>,
    departed: HashSet<UserId>,
    failing_channels: HashSet<ChannelId>,
}

/// A notifier that records every successful call and treats any user as a guild member
/// unless told otherwise.
#[derive(Default)]
pub struct RecordingNotifier {
    state: Mutex<RecordingState>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn posts_to(&self, channel: u64) -> Vec<Notice> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Post { channel_id, notice } if channel_id == ChannelId::new(channel) => {
                    Some(notice)
                }
                _ => None,
            })
            .collect()
    }

    pub fn grants(&self) -> Vec<UserId> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Grant { user_id, .. } => Some(user_id),
                _ => None,
            })
            .collect()
    }

    pub fn revokes(&self) -> Vec<UserId> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Revoke { user_id, .. } => Some(user_id),
                _ => None,
            })
            .collect()
    }

    /// Removes a user from the guild.
    pub fn remove_member(&self, user_id: UserId) {
        self.state.lock().unwrap().departed.insert(user_id);
    }

    pub fn set_roles(&self, user_id: UserId, roles: Vec<RoleId>) {
        self.state.lock().unwrap().members.insert(
            user_id,
            MemberInfo {
                user_id,
                display_name: format!("member{}", user_id),
                roles,
            },
        );
    }

    pub fn block_direct_messages(&self, user_id: UserId) {
        self.state.lock().unwrap().unreachable.insert(user_id);
    }

    /// Makes every message operation on the channel fail as if it was deleted.
    pub fn fail_channel(&self, channel_id: ChannelId) {
        self.state.lock().unwrap().failing_channels.insert(channel_id);
    }

    fn check_channel(state: &RecordingState, channel_id: ChannelId) -> Result<(), NotifyError> {
        if state.failing_channels.contains(&channel_id) {
            return Err(NotifyError::NotFound(format!("Unknown channel {}", channel_id)));
        }
        Ok(())
    }
}

impl Notifier for RecordingNotifier {
    async fn post(&self, channel_id: ChannelId, notice: &Notice) -> Result<MessageId, NotifyError> {
        let mut state = self.state.lock().unwrap();
        Self::check_channel(&state, channel_id)?;
        state.next_message += 1;
        let message_id = MessageId::new(state.next_message);
        state.sent.push(Sent::Post {
            channel_id,
            notice: notice.clone(),
        });
        Ok(message_id)
    }

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        notice: &Notice,
    ) -> Result<(), NotifyError> {
        let mut state = self.state.lock().unwrap();
        Self::check_channel(&state, channel_id)?;
        state.sent.push(Sent::Edit {
            channel_id,
            message_id,
            notice: notice.clone(),
        });
        Ok(())
    }

    async fn delete(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), NotifyError> {
        let mut state = self.state.lock().unwrap();
        Self::check_channel(&state, channel_id)?;
        state.sent.push(Sent::Delete {
            channel_id,
            message_id,
        });
        Ok(())
    }

    async fn react(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: char,
    ) -> Result<(), NotifyError> {
        let mut state = self.state.lock().unwrap();
        Self::check_channel(&state, channel_id)?;
        state.sent.push(Sent::React { message_id, emoji });
        Ok(())
    }

    async fn direct_message(&self, user_id: UserId, text: &str) -> Result<(), NotifyError> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable.contains(&user_id) {
            return Err(NotifyError::Unreachable(format!("{} blocks direct messages", user_id)));
        }
        state.sent.push(Sent::DirectMessage {
            user_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn grant_role(
        &self,
        _guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), NotifyError> {
        let mut state = self.state.lock().unwrap();
        if state.departed.contains(&user_id) {
            return Err(NotifyError::NotFound(format!("Unknown member {}", user_id)));
        }
        let member = state.members.entry(user_id).or_insert_with(|| MemberInfo {
            user_id,
            display_name: format!("member{}", user_id),
            roles: vec![],
        });
        member.roles.push(role_id);
        state.sent.push(Sent::Grant { user_id, role_id });
        Ok(())
    }

    async fn revoke_role(
        &self,
        _guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), NotifyError> {
        let mut state = self.state.lock().unwrap();
        if let Some(member) = state.members.get_mut(&user_id) {
            member.roles.retain(|r| *r != role_id);
        }
        state.sent.push(Sent::Revoke { user_id, role_id });
        Ok(())
    }

    async fn resolve_member(
        &self,
        _guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Option<MemberInfo>, NotifyError> {
        let state = self.state.lock().unwrap();
        if state.departed.contains(&user_id) {
            return Ok(None);
        }
        match state.members.get(&user_id) {
            Some(member) => Ok(Some(member.clone())),
            None => Ok(Some(MemberInfo {
                user_id,
                display_name: format!("member{}", user_id),
                roles: vec![],
            })),
        }
    }
}
