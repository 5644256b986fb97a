//! Conversions from storage rows to client-facing models.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use notehub_crypto::{ChatSecret, decrypt_message};
use notehub_db::models::{MessageRow, ParticipantRow, ReactionRow, RoomRow};
use notehub_db::{Database, parse_timestamp};
use notehub_types::models::{ChatMessage, ChatRoom, ParticipantProfile, ReactionGroup, RoomTheme};
use tracing::warn;
use uuid::Uuid;

use crate::error::ChatResult;

/// Body shown in place of a message that can no longer be decrypted.
pub const UNDECRYPTABLE_PLACEHOLDER: &str = "[unable to decrypt message]";

const UNKNOWN_USERNAME: &str = "unknown";

pub(crate) fn parse_id(raw: &str, field: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", field, raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_time(raw: &str, field: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|| {
        warn!("Corrupt {} '{}'", field, raw);
        DateTime::default()
    })
}

fn parse_optional_time(raw: Option<&str>, field: &str) -> Option<DateTime<Utc>> {
    raw.map(|r| parse_time(r, field))
}

pub(crate) fn room(row: &RoomRow) -> ChatRoom {
    ChatRoom {
        id: parse_id(&row.id, "room id"),
        is_group: row.is_group,
        name: row.name.clone(),
        created_by: parse_id(&row.created_by, "room created_by"),
        theme: row.theme.parse().unwrap_or_else(|e| {
            warn!("Room {}: {}", row.id, e);
            RoomTheme::Default
        }),
        created_at: parse_time(&row.created_at, "room created_at"),
        updated_at: parse_time(&row.updated_at, "room updated_at"),
    }
}

pub(crate) fn participant(row: ParticipantRow) -> ParticipantProfile {
    ParticipantProfile {
        user_id: parse_id(&row.user_id, "participant user_id"),
        username: row.username.unwrap_or_else(|| UNKNOWN_USERNAME.to_string()),
        joined_at: parse_time(&row.joined_at, "participant joined_at"),
        last_read_at: parse_optional_time(row.last_read_at.as_deref(), "participant last_read_at"),
    }
}

/// Decrypt a stored body. `None` means the row is unreadable.
/// Legacy rows written before encryption are returned verbatim.
pub(crate) fn decode_body(
    row: &MessageRow,
    secret: &ChatSecret,
    salt: Option<&[u8]>,
) -> Option<String> {
    if !row.is_encrypted {
        return Some(row.ciphertext.clone());
    }

    let Some(salt) = salt else {
        warn!("Message {} is encrypted but room {} has no salt", row.id, row.room_id);
        return None;
    };

    match decrypt_message(&row.ciphertext, secret, salt) {
        Ok(body) => Some(body),
        Err(e) => {
            warn!("Failed to decrypt message {} in room {}: {}", row.id, row.room_id, e);
            None
        }
    }
}

pub(crate) fn message(row: MessageRow, body: String, reactions: Vec<ReactionGroup>) -> ChatMessage {
    ChatMessage {
        id: parse_id(&row.id, "message id"),
        room_id: parse_id(&row.room_id, "message room_id"),
        sender_id: parse_id(&row.sender_id, "message sender_id"),
        sender_username: row.sender_username.unwrap_or_else(|| UNKNOWN_USERNAME.to_string()),
        body,
        photo_url: row.photo_url,
        is_encrypted: row.is_encrypted,
        is_pinned: row.is_pinned,
        pinned_by: row.pinned_by.as_deref().map(|id| parse_id(id, "message pinned_by")),
        pinned_at: parse_optional_time(row.pinned_at.as_deref(), "message pinned_at"),
        sent_at: parse_time(&row.sent_at, "message sent_at"),
        delivered_at: parse_optional_time(row.delivered_at.as_deref(), "message delivered_at"),
        created_at: parse_time(&row.created_at, "message created_at"),
        reactions,
    }
}

/// Group reaction rows per message, then per emoji in first-seen order.
pub(crate) fn group_reactions(rows: Vec<ReactionRow>) -> HashMap<String, Vec<ReactionGroup>> {
    let mut by_message: HashMap<String, Vec<ReactionGroup>> = HashMap::new();

    for r in rows {
        let user_id = parse_id(&r.user_id, "reaction user_id");
        let groups = by_message.entry(r.message_id).or_default();
        match groups.iter_mut().find(|g| g.emoji == r.emoji) {
            Some(group) => {
                group.user_ids.push(user_id);
                group.count = group.user_ids.len();
            }
            None => groups.push(ReactionGroup {
                emoji: r.emoji,
                count: 1,
                user_ids: vec![user_id],
            }),
        }
    }

    by_message
}

/// Render rows with their reactions, substituting the placeholder for
/// anything that fails to decrypt. Preserves row order.
pub(crate) fn render_messages(
    db: &Database,
    rows: Vec<MessageRow>,
    secret: &ChatSecret,
    salt: Option<&[u8]>,
) -> ChatResult<Vec<ChatMessage>> {
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let mut reactions = group_reactions(db.get_reactions_for_messages(&ids)?);

    Ok(rows
        .into_iter()
        .map(|row| {
            let body = decode_body(&row, secret, salt)
                .unwrap_or_else(|| UNDECRYPTABLE_PLACEHOLDER.to_string());
            let groups = reactions.remove(&row.id).unwrap_or_default();
            message(row, body, groups)
        })
        .collect())
}
