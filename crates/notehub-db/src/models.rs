//! Database row types. These map directly to SQLite rows.
//! Distinct from notehub-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct RoomRow {
    pub id: String,
    pub is_group: bool,
    pub name: Option<String>,
    pub created_by: String,
    pub encryption_salt: Option<Vec<u8>>,
    pub theme: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewRoom<'a> {
    pub id: &'a str,
    pub is_group: bool,
    pub name: Option<&'a str>,
    pub created_by: &'a str,
    pub encryption_salt: &'a [u8],
    pub created_at: &'a str,
}

#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub room_id: String,
    pub user_id: String,
    pub username: Option<String>,
    pub joined_at: String,
    pub last_read_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_username: Option<String>,
    pub ciphertext: String,
    pub photo_url: Option<String>,
    pub is_encrypted: bool,
    pub is_pinned: bool,
    pub pinned_by: Option<String>,
    pub pinned_at: Option<String>,
    pub sent_at: String,
    pub delivered_at: Option<String>,
    pub created_at: String,
}

pub struct NewMessage<'a> {
    pub id: &'a str,
    pub room_id: &'a str,
    pub sender_id: &'a str,
    pub ciphertext: &'a str,
    pub photo_url: Option<&'a str>,
    pub is_encrypted: bool,
    /// `None` stamps the row while the write holds the connection.
    pub created_at: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ReadReceiptRow {
    pub message_id: String,
    pub user_id: String,
    pub read_at: String,
}
