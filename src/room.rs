/// Room data structures shared by the parser, classifier and batch engine.
///
/// `RawRoom` / `RawEvent` are what the chat client hands over after a sync.
/// `ParsedRoom` is the canonical, read-only shape everything else works on.
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Event type marking a room message.
pub const MESSAGE_EVENT_TYPE: &str = "m.room.message";

/// Message subtype of plain text messages.
pub const TEXT_MSGTYPE: &str = "m.text";

/// A room as delivered by the chat client. Read-only for the core.
#[derive(Debug, Clone, Default)]
pub struct RawRoom {
    pub room_id: String,
    pub name: String,
    pub alias: Option<String>,
    /// Full user ids of joined members (e.g. `@alice:matrix.example.org`).
    pub members: Vec<String>,
    /// Timeline in chronological order.
    pub timeline: Vec<RawEvent>,
}

/// Content fields of an event the core cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EventContent {
    #[serde(default)]
    pub msgtype: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// A single timeline event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub sender: String,
    pub kind: String,
    pub timestamp: i64,
    pub date: DateTime<Utc>,
    pub content: EventContent,
}

impl RawEvent {
    /// Builds an event; `date` is derived from the millisecond timestamp.
    pub fn new(sender: &str, kind: &str, timestamp: i64, content: EventContent) -> Self {
        Self {
            sender: sender.to_owned(),
            kind: kind.to_owned(),
            timestamp,
            date: date_from_millis(timestamp),
            content,
        }
    }

    /// Plain text room message.
    pub fn text(sender: &str, timestamp: i64, body: &str) -> Self {
        Self::new(
            sender,
            MESSAGE_EVENT_TYPE,
            timestamp,
            EventContent {
                msgtype: Some(TEXT_MSGTYPE.to_owned()),
                body: Some(body.to_owned()),
            },
        )
    }

    pub fn is_message(&self) -> bool {
        self.kind == MESSAGE_EVENT_TYPE
    }
}

/// Converts epoch milliseconds to a UTC date, falling back to the epoch for
/// out-of-range values.
pub fn date_from_millis(timestamp: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(timestamp)
        .single()
        .unwrap_or_default()
}

/// A message kept for activity computations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub author: String,
    pub date: DateTime<Utc>,
}

/// Date of the last message-type event in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageDate {
    pub date: DateTime<Utc>,
    pub timestamp: i64,
}

/// Canonical room record produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRoom {
    pub room_id: String,
    pub room_name: String,
    pub alias: Option<String>,
    pub project: String,
    pub members: BTreeSet<String>,
    pub messages: Vec<Message>,
    pub last_message_date: Option<MessageDate>,
}

impl ParsedRoom {
    pub fn to_ref(&self) -> RoomRef {
        RoomRef {
            room_id: self.room_id.clone(),
            room_name: self.room_name.clone(),
            alias: self.alias.clone(),
        }
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.last_message_date.map(|d| d.timestamp)
    }
}

/// Minimal room handle passed to bulk operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_id: String,
    pub room_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl RoomRef {
    pub fn new(room_id: &str, room_name: &str) -> Self {
        Self {
            room_id: room_id.to_owned(),
            room_name: room_name.to_owned(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_owned());
        self
    }
}

impl From<&ParsedRoom> for RoomRef {
    fn from(room: &ParsedRoom) -> Self {
        room.to_ref()
    }
}

/// A user known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: Option<String>,
}

/// Snapshot of a room's power levels state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerLevels {
    pub users: BTreeMap<String, i64>,
    pub users_default: i64,
}

impl PowerLevels {
    pub fn level_of(&self, user_id: &str) -> i64 {
        self.users
            .get(user_id)
            .copied()
            .unwrap_or(self.users_default)
    }
}
