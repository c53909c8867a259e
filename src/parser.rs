/// Turns raw rooms into `ParsedRoom` records.
///
/// Sender and member ids are reduced to their local part, message events are
/// extracted from the timeline, and messages written by ignored senders
/// (usually bots) or bot commands are kept out of the room's real activity.
use std::collections::{BTreeSet, HashSet};

use crate::room::{Message, MessageDate, ParsedRoom, RawRoom, TEXT_MSGTYPE};

/// Project used when a room name carries no `project-` prefix.
pub const CUSTOM_PROJECT: &str = "custom project";

/// Default prefixes of bot command messages.
pub const DEFAULT_COMMAND_PREFIXES: &[&str] = &["!"];

/// Strips the `@` sigil and the `:domain` suffix from a user id.
///
/// `@some_user1:matrix.example.org` becomes `some_user1`. Input without a
/// sigil or domain is returned as is.
pub fn canonical_name(user_id: &str) -> String {
    let local = user_id.strip_prefix('@').unwrap_or(user_id);
    match local.split_once(':') {
        Some((name, _)) => name.to_owned(),
        None => local.to_owned(),
    }
}

/// Leading `-` separated token of a room name.
pub fn project_name(room_name: &str) -> String {
    match room_name.split_once('-') {
        Some((project, _)) => project.to_owned(),
        None => CUSTOM_PROJECT.to_owned(),
    }
}

/// A message event pulled out of the timeline before ignore filtering.
struct TimelineMessage<'a> {
    author: String,
    message_date: MessageDate,
    body: Option<&'a str>,
}

/// Parser configured with the senders and command prefixes to ignore.
#[derive(Debug, Clone)]
pub struct RoomParser {
    ignored_senders: HashSet<String>,
    command_prefixes: Vec<String>,
}

impl Default for RoomParser {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl RoomParser {
    /// Creates a parser with the default command prefixes.
    ///
    /// Ignored senders may be given as full user ids or local names; matching
    /// is case-insensitive on the local name.
    pub fn new<I, S>(ignored_senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ignored_senders: ignored_senders
                .into_iter()
                .map(|s| canonical_name(s.as_ref().trim()).to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            command_prefixes: DEFAULT_COMMAND_PREFIXES
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
        }
    }

    pub fn with_command_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.command_prefixes = prefixes.into_iter().filter(|p| !p.is_empty()).collect();
        self
    }

    /// Same command prefixes, different ignore list.
    pub fn with_ignored_senders<I, S>(&self, ignored_senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            command_prefixes: self.command_prefixes.clone(),
            ..Self::new(ignored_senders)
        }
    }

    /// Ignored local names, sorted.
    pub fn ignored_senders(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ignored_senders.iter().cloned().collect();
        names.sort();
        names
    }

    pub fn is_ignored(&self, author: &str) -> bool {
        self.ignored_senders.contains(&author.to_lowercase())
    }

    pub fn is_command(&self, body: &str) -> bool {
        let body = body.trim_start();
        self.command_prefixes.iter().any(|p| body.starts_with(p))
    }

    /// Builds the canonical record for one room.
    ///
    /// `last_message_date` comes from the last message event of the timeline,
    /// ignored senders and commands included. `messages` excludes both.
    pub fn parse(&self, raw: &RawRoom) -> ParsedRoom {
        let timeline_messages: Vec<TimelineMessage<'_>> = raw
            .timeline
            .iter()
            .filter(|ev| ev.is_message())
            .map(|ev| TimelineMessage {
                author: canonical_name(&ev.sender),
                message_date: MessageDate {
                    date: ev.date,
                    timestamp: ev.timestamp,
                },
                body: match ev.content.msgtype.as_deref() {
                    Some(TEXT_MSGTYPE) => ev.content.body.as_deref(),
                    _ => None,
                },
            })
            .collect();

        let last_message_date = timeline_messages.last().map(|m| m.message_date);

        let messages = timeline_messages
            .iter()
            .filter(|m| !self.is_ignored(&m.author))
            .filter(|m| !m.body.is_some_and(|body| self.is_command(body)))
            .map(|m| Message {
                author: m.author.clone(),
                date: m.message_date.date,
            })
            .collect();

        let members: BTreeSet<String> = raw.members.iter().map(|m| canonical_name(m)).collect();

        ParsedRoom {
            room_id: raw.room_id.clone(),
            room_name: raw.name.clone(),
            alias: raw.alias.clone(),
            project: project_name(&raw.name),
            members,
            messages,
            last_message_date,
        }
    }

    pub fn parse_all(&self, rooms: &[RawRoom]) -> Vec<ParsedRoom> {
        rooms.iter().map(|r| self.parse(r)).collect()
    }
}
