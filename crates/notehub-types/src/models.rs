use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A verified caller, as handed to the core by the external auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

impl Identity {
    pub fn new(user_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomTheme {
    #[default]
    Default,
    Ocean,
    Forest,
    Sunset,
    Midnight,
}

impl RoomTheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Ocean => "ocean",
            Self::Forest => "forest",
            Self::Sunset => "sunset",
            Self::Midnight => "midnight",
        }
    }
}

impl fmt::Display for RoomTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTheme(pub String);

impl fmt::Display for UnknownTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown room theme '{}'", self.0)
    }
}

impl std::error::Error for UnknownTheme {}

impl FromStr for RoomTheme {
    type Err = UnknownTheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "ocean" => Ok(Self::Ocean),
            "forest" => Ok(Self::Forest),
            "sunset" => Ok(Self::Sunset),
            "midnight" => Ok(Self::Midnight),
            other => Err(UnknownTheme(other.to_string())),
        }
    }
}

/// Room as exposed to clients. The encryption salt never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: Uuid,
    pub is_group: bool,
    pub name: Option<String>,
    pub created_by: Uuid,
    pub theme: RoomTheme,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub user_id: Uuid,
    pub username: String,
    pub joined_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

/// A message with its body already decrypted (or replaced by a placeholder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub body: String,
    pub photo_url: Option<String>,
    pub is_encrypted: bool,
    pub is_pinned: bool,
    pub pinned_by: Option<Uuid>,
    pub pinned_at: Option<DateTime<Utc>>,
    pub sent_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub reactions: Vec<ReactionGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room: ChatRoom,
    pub participants: Vec<ParticipantProfile>,
    pub last_message: Option<ChatMessage>,
    pub unread_count: u64,
}

impl RoomSummary {
    /// Time of the latest activity, used to order room listings.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.room.updated_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDetail {
    pub room: ChatRoom,
    pub participants: Vec<ParticipantProfile>,
}

/// A user currently connected to a room over the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveMember {
    pub user_id: Uuid,
    pub username: String,
}
