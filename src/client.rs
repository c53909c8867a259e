/// The chat server operations the bulk engine relies on.
///
/// `sdk::MatrixChatClient` implements this over matrix-sdk; tests plug in an
/// in-memory fake.
use async_trait::async_trait;
use thiserror::Error;

use crate::room::{PowerLevels, RawRoom, RoomRef, UserProfile};

/// Failure of a single server call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperationError {
    /// An id or alias could not be parsed.
    #[error("invalid identifier {id}: {reason}")]
    InvalidId { id: String, reason: String },

    /// The client does not know the room.
    #[error("room {0} not found")]
    RoomNotFound(String),

    /// The alias does not resolve to a room.
    #[error("alias {0} not found")]
    AliasNotFound(String),

    /// The homeserver rejected the request.
    #[error("server rejected request: {0}")]
    Server(String),
}

impl OperationError {
    pub fn server(err: impl std::fmt::Display) -> Self {
        Self::Server(err.to_string())
    }

    pub fn invalid_id(id: &str, err: impl std::fmt::Display) -> Self {
        Self::InvalidId {
            id: id.to_owned(),
            reason: err.to_string(),
        }
    }
}

/// Authenticated, synced session with a chat server.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Joined rooms with members and the synced part of their timeline.
    async fn rooms(&self) -> Vec<RawRoom>;

    /// Rooms the user has a pending invite for.
    async fn invited_rooms(&self) -> Vec<RoomRef>;

    /// Users seen in any joined room.
    async fn users(&self) -> Vec<UserProfile>;

    async fn user(&self, user_id: &str) -> Option<UserProfile> {
        self.users().await.into_iter().find(|u| u.user_id == user_id)
    }

    async fn leave(&self, room_id: &str) -> Result<(), OperationError>;

    async fn invite(&self, room_id: &str, user_id: &str) -> Result<(), OperationError>;

    async fn join_room(&self, room_id: &str) -> Result<(), OperationError>;

    /// Current `m.room.power_levels` content of a room.
    async fn power_levels(&self, room_id: &str) -> Result<PowerLevels, OperationError>;

    /// Writes `level` for `user_id`, starting from the `current` state.
    async fn set_power_level(
        &self,
        room_id: &str,
        user_id: &str,
        level: i64,
        current: &PowerLevels,
    ) -> Result<(), OperationError>;

    async fn send_text_message(&self, room_id: &str, text: &str) -> Result<(), OperationError>;

    async fn send_html_message(
        &self,
        room_id: &str,
        text: &str,
        html: &str,
    ) -> Result<(), OperationError>;

    async fn delete_alias(&self, alias: &str) -> Result<(), OperationError>;

    async fn room_id_for_alias(&self, alias: &str) -> Result<String, OperationError>;

    /// Stops background work; the session is unusable afterwards.
    async fn stop(&self) {}
}
