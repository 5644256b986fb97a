use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, LiveMember, RoomTheme};

/// Identifies one physical gateway connection. A user may hold several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorSelection {
    pub start: u32,
    pub end: u32,
}

/// Events sent FROM server TO client over the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Handshake accepted
    Connected {
        user_id: Uuid,
        username: String,
        timestamp: DateTime<Utc>,
    },

    /// Live members of a room, sent to a connection right after it joins
    RoomMembers {
        room_id: Uuid,
        members: Vec<LiveMember>,
        count: usize,
    },

    UserJoined {
        user_id: Uuid,
        username: String,
        room_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    UserLeft {
        user_id: Uuid,
        username: String,
        room_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A message was durably stored
    MessageSent {
        message: ChatMessage,
        timestamp: DateTime<Utc>,
    },

    MessageDeleted {
        room_id: Uuid,
        message_id: Uuid,
        deleted_by: Uuid,
        timestamp: DateTime<Utc>,
    },

    ReactionAdded {
        room_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        username: String,
        emoji: String,
        timestamp: DateTime<Utc>,
    },

    ReactionRemoved {
        room_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
        timestamp: DateTime<Utc>,
    },

    MessagePinned {
        room_id: Uuid,
        message_id: Uuid,
        pinned_by: Uuid,
        timestamp: DateTime<Utc>,
    },

    MessageUnpinned {
        room_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    MessageRead {
        room_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    CursorPosition {
        room_id: Uuid,
        user_id: Uuid,
        username: String,
        position: u32,
        selection: Option<CursorSelection>,
        timestamp: DateTime<Utc>,
    },

    Typing {
        room_id: Uuid,
        user_id: Uuid,
        username: String,
        timestamp: DateTime<Utc>,
    },

    RoomDeleted {
        room_id: Uuid,
        deleted_by: Uuid,
        timestamp: DateTime<Utc>,
    },

    RoomThemeUpdated {
        room_id: Uuid,
        theme: RoomTheme,
        updated_by: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A client command was rejected; the connection stays open
    Error { message: String },
}

impl ServerEvent {
    /// Returns the room this event is scoped to, if any.
    pub fn room_id(&self) -> Option<Uuid> {
        match self {
            Self::RoomMembers { room_id, .. }
            | Self::UserJoined { room_id, .. }
            | Self::UserLeft { room_id, .. }
            | Self::MessageDeleted { room_id, .. }
            | Self::ReactionAdded { room_id, .. }
            | Self::ReactionRemoved { room_id, .. }
            | Self::MessagePinned { room_id, .. }
            | Self::MessageUnpinned { room_id, .. }
            | Self::MessageRead { room_id, .. }
            | Self::CursorPosition { room_id, .. }
            | Self::Typing { room_id, .. }
            | Self::RoomDeleted { room_id, .. }
            | Self::RoomThemeUpdated { room_id, .. } => Some(*room_id),
            Self::MessageSent { message, .. } => Some(message.room_id),
            Self::Connected { .. } | Self::Error { .. } => None,
        }
    }

    /// Wire name of the event, as it appears in the `type` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::RoomMembers { .. } => "room-members",
            Self::UserJoined { .. } => "user-joined",
            Self::UserLeft { .. } => "user-left",
            Self::MessageSent { .. } => "message-sent",
            Self::MessageDeleted { .. } => "message-deleted",
            Self::ReactionAdded { .. } => "reaction-added",
            Self::ReactionRemoved { .. } => "reaction-removed",
            Self::MessagePinned { .. } => "message-pinned",
            Self::MessageUnpinned { .. } => "message-unpinned",
            Self::MessageRead { .. } => "message-read",
            Self::CursorPosition { .. } => "cursor-position",
            Self::Typing { .. } => "typing",
            Self::RoomDeleted { .. } => "room-deleted",
            Self::RoomThemeUpdated { .. } => "room-theme-updated",
            Self::Error { .. } => "error",
        }
    }
}

/// Commands sent FROM client TO server over the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    JoinRoom { room_id: Uuid },

    LeaveRoom { room_id: Uuid },

    CursorPosition {
        room_id: Uuid,
        position: u32,
        #[serde(default)]
        selection: Option<CursorSelection>,
    },

    Typing { room_id: Uuid },

    /// Same path as the REST send; the stored message comes back as a reply.
    SendMessage {
        room_id: Uuid,
        body: String,
        #[serde(default)]
        photo_url: Option<String>,
    },
}
