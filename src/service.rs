/// Room operations exposed to the CLI.
///
/// `RoomService` owns the chat session and binds the batch engine to the
/// concrete server calls. Each bulk operation returns a report named after its
/// verb; retrying is left to the caller (see `report::retry_failed`).
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::batch::{BatchOptions, BatchRunner};
use crate::classifier::{self, RoomBuckets};
use crate::client::{ChatClient, OperationError};
use crate::config::{self, Config};
use crate::parser::RoomParser;
use crate::report::{InviteReport, JoinReport, LeaveReport, PowerReport, SendReport};
use crate::room::{ParsedRoom, RoomRef, UserProfile};

/// Power level given when none is specified.
pub const DEFAULT_POWER_LEVEL: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaveOptions {
    /// Also delete the room's alias; the room only counts as left if both
    /// calls succeed.
    pub delete_alias: bool,
}

/// Text message with an optional HTML rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub html: Option<String>,
}

impl OutgoingMessage {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            html: None,
        }
    }

    pub fn html(text: &str, html: &str) -> Self {
        Self {
            text: text.to_owned(),
            html: Some(html.to_owned()),
        }
    }
}

pub struct RoomService<C> {
    client: C,
    parser: RoomParser,
    options: BatchOptions,
    host: String,
    show_progress: bool,
}

impl<C: ChatClient> RoomService<C> {
    /// `host` is the homeserver name used to build aliases and user ids
    /// (e.g. `matrix.example.org`).
    pub fn new(client: C, parser: RoomParser, options: BatchOptions, host: &str) -> Self {
        Self {
            client,
            parser,
            options,
            host: host.to_owned(),
            show_progress: false,
        }
    }

    pub fn from_config(client: C, config: &Config) -> Self {
        Self::new(client, config.parser(), config.batch, &config.matrix_host_name())
    }

    /// Shows terminal progress during bulk operations.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Senders ignored by `rooms`, `buckets` and the outdated search.
    pub fn ignored_senders(&self) -> Vec<String> {
        self.parser.ignored_senders()
    }

    pub fn user_id(&self, name: &str) -> String {
        config::full_user_id(&self.host, name)
    }

    pub fn room_alias(&self, name: &str) -> String {
        config::full_room_alias(&self.host, name)
    }

    fn runner(&self, verb: &str) -> BatchRunner {
        let runner = BatchRunner::new(self.options);
        if self.show_progress {
            runner.with_progress(verb)
        } else {
            runner
        }
    }

    /// Parses every joined room with the configured ignore list.
    pub async fn rooms(&self) -> Vec<ParsedRoom> {
        self.parser.parse_all(&self.client.rooms().await)
    }

    /// Parses and groups all rooms, ignoring `ignored_senders` instead of the
    /// configured list. Command prefixes stay as configured.
    pub async fn classify_and_parse(&self, ignored_senders: &[String]) -> RoomBuckets {
        let parser = self.parser.with_ignored_senders(ignored_senders);
        classifier::classify(parser.parse_all(&self.client.rooms().await))
    }

    /// Groups all rooms with the configured ignore list.
    pub async fn buckets(&self) -> RoomBuckets {
        classifier::classify(self.rooms().await)
    }

    /// Group rooms without activity for `months_limit` months, most recent
    /// first. Direct chats and rooms without messages are left out.
    pub async fn get_outdated_rooms(&self, months_limit: i64) -> Vec<ParsedRoom> {
        self.get_outdated_rooms_at(months_limit, Utc::now()).await
    }

    pub async fn get_outdated_rooms_at(&self, months_limit: i64, now: DateTime<Utc>) -> Vec<ParsedRoom> {
        let rooms: Vec<ParsedRoom> = self
            .rooms()
            .await
            .into_iter()
            .filter(|room| !classifier::is_direct_chat(room))
            .collect();
        classifier::outdated(&rooms, months_limit, now)
    }

    /// Rooms whose name contains `fragment`, ignoring case.
    pub async fn rooms_by_name(&self, fragment: &str) -> Vec<ParsedRoom> {
        let needle = fragment.to_lowercase();
        self.rooms()
            .await
            .into_iter()
            .filter(|room| room.room_name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Resolves `#name:host` to a room id.
    pub async fn room_id_by_alias(&self, name: &str) -> Option<String> {
        let alias = self.room_alias(name);
        match self.client.room_id_for_alias(&alias).await {
            Ok(room_id) => Some(room_id),
            Err(error) => {
                warn!(%alias, %error, "Alias did not resolve");
                None
            }
        }
    }

    pub async fn delete_alias(&self, name: &str) -> Result<(), OperationError> {
        let alias = self.room_alias(name);
        self.client.delete_alias(&alias).await?;
        info!(%alias, "Alias deleted");
        Ok(())
    }

    pub async fn known_users(&self) -> Vec<UserProfile> {
        self.client.users().await
    }

    pub async fn user(&self, name: &str) -> Option<UserProfile> {
        self.client.user(&self.user_id(name)).await
    }

    pub async fn invited_rooms(&self) -> Vec<RoomRef> {
        self.client.invited_rooms().await
    }

    pub async fn leave_rooms(&self, rooms: Vec<RoomRef>, options: LeaveOptions) -> LeaveReport {
        let client = &self.client;
        self.runner("leaving")
            .run(rooms, |room| async move {
                client.leave(&room.room_id).await?;
                if options.delete_alias {
                    if let Some(alias) = room.alias.as_deref() {
                        client.delete_alias(alias).await?;
                    }
                }
                Ok(())
            })
            .await
            .into()
    }

    pub async fn invite_user_to_rooms(&self, rooms: Vec<RoomRef>, user_id: &str) -> InviteReport {
        let client = &self.client;
        self.runner("inviting")
            .run(rooms, |room| async move { client.invite(&room.room_id, user_id).await })
            .await
            .into()
    }

    pub async fn join_rooms(&self, rooms: Vec<RoomRef>) -> JoinReport {
        let client = &self.client;
        self.runner("joining")
            .run(rooms, |room| async move { client.join_room(&room.room_id).await })
            .await
            .into()
    }

    /// Reads each room's power levels, then writes `level` (default 100) for
    /// `user_id`.
    pub async fn set_power_on_rooms(
        &self,
        rooms: Vec<RoomRef>,
        user_id: &str,
        level: Option<i64>,
    ) -> PowerReport {
        let client = &self.client;
        let level = level.unwrap_or(DEFAULT_POWER_LEVEL);
        self.runner("powering")
            .run(rooms, |room| async move {
                let current = client.power_levels(&room.room_id).await?;
                client
                    .set_power_level(&room.room_id, user_id, level, &current)
                    .await
            })
            .await
            .into()
    }

    /// Sends to all rooms at once, without batching or delay.
    pub async fn send_message_to_rooms(
        &self,
        rooms: Vec<RoomRef>,
        message: &OutgoingMessage,
    ) -> SendReport {
        let client = &self.client;
        self.runner("sending")
            .fan_out(rooms, |room| async move {
                match message.html.as_deref() {
                    Some(html) => {
                        client
                            .send_html_message(&room.room_id, &message.text, html)
                            .await
                    }
                    None => client.send_text_message(&room.room_id, &message.text).await,
                }
            })
            .await
            .into()
    }

    pub async fn stop(&self) {
        self.client.stop().await;
    }
}
