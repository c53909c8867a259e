/// `ChatClient` over matrix-sdk.
///
/// `connect` logs in with a password and runs a single sync whose timeline
/// limit bounds how much history the parser sees. Timelines from that sync are
/// cached; room state (names, aliases, members) is read from the SDK store.
use anyhow::{Context, Result};
use async_trait::async_trait;
use matrix_sdk::config::SyncSettings;
use matrix_sdk::ruma::api::client::alias::delete_alias;
use matrix_sdk::ruma::api::client::filter::{Filter, FilterDefinition};
use matrix_sdk::ruma::events::room::message::RoomMessageEventContent;
use matrix_sdk::ruma::{Int, OwnedRoomId, RoomAliasId, RoomId, UInt, UserId};
use matrix_sdk::{Client, Room, RoomMemberships, RoomState};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::client::{ChatClient, OperationError};
use crate::config::Config;
use crate::room::{EventContent, PowerLevels, RawEvent, RawRoom, RoomRef, UserProfile};

const DEVICE_DISPLAY_NAME: &str = "mrooms";

/// Timeline event fields read from the sync payload.
#[derive(Debug, Deserialize)]
struct SyncedEvent {
    sender: String,
    #[serde(rename = "type")]
    kind: String,
    origin_server_ts: i64,
    #[serde(default)]
    content: EventContent,
}

pub struct MatrixChatClient {
    client: Client,
    user_id: String,
    timelines: HashMap<OwnedRoomId, Vec<RawEvent>>,
}

/// Logs in and performs the initial sync.
///
/// Login or sync failures are returned before any room is touched.
pub async fn connect(config: &Config) -> Result<MatrixChatClient> {
    let started = Instant::now();
    let homeserver_url = config.base_url()?;
    let user_id = config.own_user_id();

    let client = Client::builder()
        .homeserver_url(homeserver_url.clone())
        .build()
        .await
        .with_context(|| format!("Failed to build client for {}", homeserver_url))?;

    client
        .matrix_auth()
        .login_username(&user_id, &config.password)
        .initial_device_display_name(DEVICE_DISPLAY_NAME)
        .send()
        .await
        .context("login failed")?;
    info!(%user_id, "Logged in");

    let mut filter = FilterDefinition::default();
    filter.room.timeline.limit = Some(UInt::from(config.events_count));
    filter.presence = Filter::empty();

    let response = client
        .sync_once(SyncSettings::default().filter(filter.into()))
        .await
        .context("initial sync failed")?;

    let mut timelines = HashMap::new();
    for (room_id, update) in response.rooms.joined {
        let events: Vec<RawEvent> = update
            .timeline
            .events
            .iter()
            .filter_map(|event| {
                match serde_json::from_str::<SyncedEvent>(event.raw().json().get()) {
                    Ok(e) => Some(RawEvent::new(&e.sender, &e.kind, e.origin_server_ts, e.content)),
                    Err(error) => {
                        debug!(%room_id, %error, "Skipping unreadable timeline event");
                        None
                    }
                }
            })
            .collect();
        timelines.insert(room_id, events);
    }

    let elapsed = started.elapsed();
    info!(rooms = timelines.len(), elapsed_ms = elapsed.as_millis() as u64, "Initial sync done");
    eprintln!("Connected in {}", format_elapsed(elapsed));

    Ok(MatrixChatClient {
        client,
        user_id,
        timelines,
    })
}

/// `X min Y sec`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{} min {} sec", secs / 60, secs % 60)
}

fn parse_room_id(room_id: &str) -> Result<OwnedRoomId, OperationError> {
    RoomId::parse(room_id).map_err(|e| OperationError::invalid_id(room_id, e))
}

impl MatrixChatClient {
    fn room(&self, room_id: &str) -> Result<Room, OperationError> {
        let id = parse_room_id(room_id)?;
        self.client
            .get_room(&id)
            .ok_or_else(|| OperationError::RoomNotFound(room_id.to_owned()))
    }

    async fn room_name(room: &Room) -> String {
        room.display_name()
            .await
            .ok()
            .map(|n| n.to_string())
            .unwrap_or_else(|| room.room_id().to_string())
    }

    async fn raw_room(&self, room: &Room) -> RawRoom {
        let members = match room.members(RoomMemberships::JOIN).await {
            Ok(members) => members.iter().map(|m| m.user_id().to_string()).collect(),
            Err(error) => {
                warn!(room_id = %room.room_id(), %error, "Failed to load members");
                Vec::new()
            }
        };
        RawRoom {
            room_id: room.room_id().to_string(),
            name: Self::room_name(room).await,
            alias: room.canonical_alias().map(|a| a.to_string()),
            members,
            timeline: self
                .timelines
                .get(room.room_id())
                .cloned()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ChatClient for MatrixChatClient {
    async fn rooms(&self) -> Vec<RawRoom> {
        let mut rooms = Vec::new();
        for room in self.client.joined_rooms() {
            rooms.push(self.raw_room(&room).await);
        }
        rooms
    }

    async fn invited_rooms(&self) -> Vec<RoomRef> {
        let mut rooms = Vec::new();
        for room in self.client.invited_rooms() {
            let name = Self::room_name(&room).await;
            rooms.push(RoomRef::new(room.room_id().as_str(), &name));
        }
        rooms
    }

    async fn users(&self) -> Vec<UserProfile> {
        let mut users = BTreeMap::new();
        for room in self.client.joined_rooms() {
            let Ok(members) = room.members(RoomMemberships::JOIN).await else {
                continue;
            };
            for member in members {
                users
                    .entry(member.user_id().to_string())
                    .or_insert_with(|| member.display_name().map(str::to_owned));
            }
        }
        users
            .into_iter()
            .map(|(user_id, display_name)| UserProfile {
                user_id,
                display_name,
            })
            .collect()
    }

    async fn leave(&self, room_id: &str) -> Result<(), OperationError> {
        let room = self.room(room_id)?;
        // a retry after a failed alias deletion finds the room already left
        if matches!(room.state(), RoomState::Left) {
            return Ok(());
        }
        room.leave().await.map_err(OperationError::server)
    }

    async fn invite(&self, room_id: &str, user_id: &str) -> Result<(), OperationError> {
        let user = UserId::parse(user_id).map_err(|e| OperationError::invalid_id(user_id, e))?;
        self.room(room_id)?
            .invite_user_by_id(&user)
            .await
            .map_err(OperationError::server)
    }

    async fn join_room(&self, room_id: &str) -> Result<(), OperationError> {
        let id = parse_room_id(room_id)?;
        self.client
            .join_room_by_id(&id)
            .await
            .map(|_| ())
            .map_err(OperationError::server)
    }

    async fn power_levels(&self, room_id: &str) -> Result<PowerLevels, OperationError> {
        let levels = self
            .room(room_id)?
            .power_levels()
            .await
            .map_err(OperationError::server)?;
        Ok(PowerLevels {
            users: levels
                .users
                .iter()
                .map(|(user, level)| (user.to_string(), i64::from(*level)))
                .collect(),
            users_default: i64::from(levels.users_default),
        })
    }

    async fn set_power_level(
        &self,
        room_id: &str,
        user_id: &str,
        level: i64,
        current: &PowerLevels,
    ) -> Result<(), OperationError> {
        if current.level_of(user_id) == level {
            debug!(%room_id, %user_id, level, "Power level already set");
            return Ok(());
        }
        let user = UserId::parse(user_id).map_err(|e| OperationError::invalid_id(user_id, e))?;
        let level = Int::new(level)
            .ok_or_else(|| OperationError::invalid_id(user_id, "power level out of range"))?;
        self.room(room_id)?
            .update_power_levels(vec![(&*user, level)])
            .await
            .map(|_| ())
            .map_err(OperationError::server)
    }

    async fn send_text_message(&self, room_id: &str, text: &str) -> Result<(), OperationError> {
        self.room(room_id)?
            .send(RoomMessageEventContent::text_plain(text))
            .await
            .map(|_| ())
            .map_err(OperationError::server)
    }

    async fn send_html_message(
        &self,
        room_id: &str,
        text: &str,
        html: &str,
    ) -> Result<(), OperationError> {
        self.room(room_id)?
            .send(RoomMessageEventContent::text_html(text, html))
            .await
            .map(|_| ())
            .map_err(OperationError::server)
    }

    async fn delete_alias(&self, alias: &str) -> Result<(), OperationError> {
        let alias_id = RoomAliasId::parse(alias).map_err(|e| OperationError::invalid_id(alias, e))?;
        self.client
            .send(delete_alias::v3::Request::new(alias_id))
            .await
            .map(|_| ())
            .map_err(OperationError::server)
    }

    async fn room_id_for_alias(&self, alias: &str) -> Result<String, OperationError> {
        let alias_id = RoomAliasId::parse(alias).map_err(|e| OperationError::invalid_id(alias, e))?;
        self.client
            .resolve_room_alias(&alias_id)
            .await
            .map(|response| response.room_id.to_string())
            .map_err(|_| OperationError::AliasNotFound(alias.to_owned()))
    }

    async fn stop(&self) {
        info!(user_id = %self.user_id, "Session closed");
    }
}
