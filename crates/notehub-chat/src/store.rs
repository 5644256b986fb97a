use std::sync::Arc;

use chrono::Utc;
use notehub_crypto::{ChatSecret, encrypt_message, generate_salt};
use notehub_db::models::{MessageRow, NewMessage};
use notehub_db::{Database, timestamp};
use notehub_types::events::ServerEvent;
use notehub_types::models::ChatMessage;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::notify::RoomNotifier;
use crate::{Actor, require_participant, run_blocking, view};

pub const MAX_PAGE_SIZE: u32 = 200;

/// How far back a search looks. Ciphertext can't be indexed, so every
/// candidate has to be decrypted.
pub const SEARCH_WINDOW: u32 = 500;

pub const MAX_SEARCH_RESULTS: u32 = 100;

pub const MAX_BODY_LEN: usize = 4000;

pub const MAX_EMOJI_LEN: usize = 32;

/// Messages, reactions, pins and read receipts.
#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
    secret: Arc<ChatSecret>,
    notifier: Arc<dyn RoomNotifier>,
}

impl MessageStore {
    pub fn new(
        db: Arc<Database>,
        secret: Arc<ChatSecret>,
        notifier: Arc<dyn RoomNotifier>,
    ) -> Self {
        Self { db, secret, notifier }
    }

    /// Encrypt and store a message, then broadcast it to the room.
    /// The returned message carries the plaintext body.
    pub async fn send(
        &self,
        actor: &Actor,
        room_id: Uuid,
        body: &str,
        photo_url: Option<String>,
    ) -> ChatResult<ChatMessage> {
        let photo_url = photo_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        if body.trim().is_empty() && photo_url.is_none() {
            return Err(ChatError::validation("message body must not be empty"));
        }
        if body.chars().count() > MAX_BODY_LEN {
            return Err(ChatError::validation(format!(
                "message body must be at most {} characters",
                MAX_BODY_LEN
            )));
        }

        let message_id = Uuid::new_v4();
        let mid = message_id.to_string();
        let rid = room_id.to_string();
        let uid = actor.user_id().to_string();
        let plaintext = body.to_string();
        let stored_photo_url = photo_url.clone();
        let secret = self.secret.clone();

        let stored_at = run_blocking(&self.db, move |db| {
            require_participant(db, &rid, &uid)?;
            let room = db.get_room(&rid)?.ok_or(ChatError::NotAuthorized)?;

            let salt = match room.encryption_salt.filter(|s| !s.is_empty()) {
                Some(salt) => salt,
                None => {
                    let claimed = db.claim_room_salt(&rid, &generate_salt())?;
                    debug!("Claimed encryption salt for room {}", rid);
                    claimed.ok_or(ChatError::NotAuthorized)?
                }
            };

            let ciphertext = encrypt_message(&plaintext, &secret, &salt)?;
            // Stamped under the connection lock so a concurrent mark-read
            // can never get a later watermark than a message it didn't see.
            let created_at = db.insert_message(&NewMessage {
                id: &mid,
                room_id: &rid,
                sender_id: &uid,
                ciphertext: &ciphertext,
                photo_url: stored_photo_url.as_deref(),
                is_encrypted: true,
                created_at: None,
            })?;
            Ok(created_at)
        })
        .await?;
        let sent_at = view::parse_time(&stored_at, "message created_at");

        let message = ChatMessage {
            id: message_id,
            room_id,
            sender_id: actor.user_id(),
            sender_username: actor.identity.username.clone(),
            body: body.to_string(),
            photo_url,
            is_encrypted: true,
            is_pinned: false,
            pinned_by: None,
            pinned_at: None,
            sent_at,
            delivered_at: None,
            created_at: sent_at,
            reactions: Vec::new(),
        };

        let delivered = self.notifier.emit_to_room(
            room_id,
            ServerEvent::MessageSent {
                message: message.clone(),
                timestamp: Utc::now(),
            },
            actor.connection_id,
        );
        debug!("Message {} sent to room {} ({} live recipients)", message_id, room_id, delivered);

        Ok(message)
    }

    /// A page of messages in chronological order. `offset` counts back from
    /// the newest message.
    pub async fn get_messages(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> ChatResult<Vec<ChatMessage>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let rid = room_id.to_string();
        let uid = user_id.to_string();
        let secret = self.secret.clone();

        run_blocking(&self.db, move |db| {
            require_participant(db, &rid, &uid)?;
            let salt = db.get_room(&rid)?.and_then(|r| r.encryption_salt);

            let rows = db.get_messages(&rid, limit, offset)?;
            let mut messages = view::render_messages(db, rows, &secret, salt.as_deref())?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }

    /// Case-insensitive substring search over the most recent
    /// [`SEARCH_WINDOW`] messages. Returns the newest `limit` matches in
    /// chronological order.
    pub async fn search_messages(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        query: &str,
        limit: u32,
    ) -> ChatResult<Vec<ChatMessage>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(ChatError::validation("search query must not be empty"));
        }

        let limit = limit.clamp(1, MAX_SEARCH_RESULTS) as usize;
        let rid = room_id.to_string();
        let uid = user_id.to_string();
        let secret = self.secret.clone();

        run_blocking(&self.db, move |db| {
            require_participant(db, &rid, &uid)?;
            let salt = db.get_room(&rid)?.and_then(|r| r.encryption_salt);

            let mut matches: Vec<(MessageRow, String)> = Vec::new();
            for row in db.get_messages(&rid, SEARCH_WINDOW, 0)? {
                let Some(body) = view::decode_body(&row, &secret, salt.as_deref()) else {
                    continue;
                };
                if body.to_lowercase().contains(&needle) {
                    matches.push((row, body));
                    if matches.len() >= limit {
                        break;
                    }
                }
            }
            matches.reverse();

            let ids: Vec<String> = matches.iter().map(|(row, _)| row.id.clone()).collect();
            let mut reactions = view::group_reactions(db.get_reactions_for_messages(&ids)?);

            Ok(matches
                .into_iter()
                .map(|(row, body)| {
                    let groups = reactions.remove(&row.id).unwrap_or_default();
                    view::message(row, body, groups)
                })
                .collect())
        })
        .await
    }

    /// Sender or room creator only.
    pub async fn delete_message(
        &self,
        actor: &Actor,
        room_id: Uuid,
        message_id: Uuid,
    ) -> ChatResult<()> {
        let rid = room_id.to_string();
        let mid = message_id.to_string();
        let uid = actor.user_id().to_string();

        run_blocking(&self.db, move |db| {
            let message = message_in_room(db, &rid, &mid, &uid)?;
            let room = db.get_room(&rid)?.ok_or(ChatError::NotAuthorized)?;

            if message.sender_id != uid && room.created_by != uid {
                return Err(ChatError::NotAuthorized);
            }

            db.delete_message(&mid)?;
            Ok(())
        })
        .await?;

        info!("Message {} in room {} deleted by {}", message_id, room_id, actor.user_id());
        self.notifier.emit_to_room(
            room_id,
            ServerEvent::MessageDeleted {
                room_id,
                message_id,
                deleted_by: actor.user_id(),
                timestamp: Utc::now(),
            },
            actor.connection_id,
        );
        Ok(())
    }

    /// Any participant of a direct room; only the creator of a group.
    pub async fn delete_room(&self, actor: &Actor, room_id: Uuid) -> ChatResult<()> {
        let rid = room_id.to_string();
        let uid = actor.user_id().to_string();

        run_blocking(&self.db, move |db| {
            require_participant(db, &rid, &uid)?;
            let room = db.get_room(&rid)?.ok_or(ChatError::NotAuthorized)?;

            if room.is_group && room.created_by != uid {
                return Err(ChatError::NotAuthorized);
            }

            db.delete_room(&rid)?;
            Ok(())
        })
        .await?;

        info!("Room {} deleted by {}", room_id, actor.user_id());
        self.notifier.emit_to_room(
            room_id,
            ServerEvent::RoomDeleted {
                room_id,
                deleted_by: actor.user_id(),
                timestamp: Utc::now(),
            },
            actor.connection_id,
        );
        Ok(())
    }

    // -- Reactions --

    /// Returns true if the reaction was new.
    pub async fn add_reaction(
        &self,
        actor: &Actor,
        room_id: Uuid,
        message_id: Uuid,
        emoji: &str,
    ) -> ChatResult<bool> {
        let emoji = validate_emoji(emoji)?;
        let rid = room_id.to_string();
        let mid = message_id.to_string();
        let uid = actor.user_id().to_string();
        let stored = emoji.clone();

        let added = run_blocking(&self.db, move |db| {
            message_in_room(db, &rid, &mid, &uid)?;
            Ok(db.add_reaction(&mid, &uid, &stored, &timestamp(Utc::now()))?)
        })
        .await?;

        if added {
            self.notifier.emit_to_room(
                room_id,
                ServerEvent::ReactionAdded {
                    room_id,
                    message_id,
                    user_id: actor.user_id(),
                    username: actor.identity.username.clone(),
                    emoji,
                    timestamp: Utc::now(),
                },
                actor.connection_id,
            );
        }
        Ok(added)
    }

    /// Returns true if a reaction was actually removed.
    pub async fn remove_reaction(
        &self,
        actor: &Actor,
        room_id: Uuid,
        message_id: Uuid,
        emoji: &str,
    ) -> ChatResult<bool> {
        let emoji = validate_emoji(emoji)?;
        let rid = room_id.to_string();
        let mid = message_id.to_string();
        let uid = actor.user_id().to_string();
        let stored = emoji.clone();

        let removed = run_blocking(&self.db, move |db| {
            message_in_room(db, &rid, &mid, &uid)?;
            Ok(db.remove_reaction(&mid, &uid, &stored)?)
        })
        .await?;

        if removed {
            self.notifier.emit_to_room(
                room_id,
                ServerEvent::ReactionRemoved {
                    room_id,
                    message_id,
                    user_id: actor.user_id(),
                    emoji,
                    timestamp: Utc::now(),
                },
                actor.connection_id,
            );
        }
        Ok(removed)
    }

    // -- Pins --

    pub async fn pin_message(
        &self,
        actor: &Actor,
        room_id: Uuid,
        message_id: Uuid,
    ) -> ChatResult<ChatMessage> {
        let message = self.set_pinned(actor, room_id, message_id, true).await?;
        self.notifier.emit_to_room(
            room_id,
            ServerEvent::MessagePinned {
                room_id,
                message_id,
                pinned_by: actor.user_id(),
                timestamp: Utc::now(),
            },
            actor.connection_id,
        );
        Ok(message)
    }

    pub async fn unpin_message(
        &self,
        actor: &Actor,
        room_id: Uuid,
        message_id: Uuid,
    ) -> ChatResult<ChatMessage> {
        let message = self.set_pinned(actor, room_id, message_id, false).await?;
        self.notifier.emit_to_room(
            room_id,
            ServerEvent::MessageUnpinned {
                room_id,
                message_id,
                user_id: actor.user_id(),
                timestamp: Utc::now(),
            },
            actor.connection_id,
        );
        Ok(message)
    }

    async fn set_pinned(
        &self,
        actor: &Actor,
        room_id: Uuid,
        message_id: Uuid,
        pinned: bool,
    ) -> ChatResult<ChatMessage> {
        let rid = room_id.to_string();
        let mid = message_id.to_string();
        let uid = actor.user_id().to_string();
        let secret = self.secret.clone();

        run_blocking(&self.db, move |db| {
            message_in_room(db, &rid, &mid, &uid)?;

            let pinned_at = timestamp(Utc::now());
            let pin = pinned.then(|| (uid.as_str(), pinned_at.as_str()));
            db.set_pinned(&mid, pin)?;

            let row = db.get_message(&mid)?.ok_or(ChatError::NotFound("message"))?;
            let salt = db.get_room(&rid)?.and_then(|r| r.encryption_salt);
            view::render_messages(db, vec![row], &secret, salt.as_deref())?
                .pop()
                .ok_or(ChatError::NotFound("message"))
        })
        .await
    }

    pub async fn pinned_messages(
        &self,
        room_id: Uuid,
        user_id: Uuid,
    ) -> ChatResult<Vec<ChatMessage>> {
        let rid = room_id.to_string();
        let uid = user_id.to_string();
        let secret = self.secret.clone();

        run_blocking(&self.db, move |db| {
            require_participant(db, &rid, &uid)?;
            let salt = db.get_room(&rid)?.and_then(|r| r.encryption_salt);
            let rows = db.pinned_messages(&rid)?;
            view::render_messages(db, rows, &secret, salt.as_deref())
        })
        .await
    }

    // -- Read receipts --

    /// Record that the caller read a message. Returns false (and does
    /// nothing) when the caller is the sender.
    pub async fn mark_message_read(&self, actor: &Actor, message_id: Uuid) -> ChatResult<bool> {
        let mid = message_id.to_string();
        let uid = actor.user_id().to_string();

        let room = run_blocking(&self.db, move |db| {
            // Unknown message and foreign room look the same to the caller.
            let message = db.get_message(&mid)?.ok_or(ChatError::NotAuthorized)?;
            require_participant(db, &message.room_id, &uid)?;

            if message.sender_id == uid {
                return Ok(None);
            }

            db.record_read_receipt(&mid, &uid, &timestamp(Utc::now()))?;
            Ok(Some(message.room_id))
        })
        .await?;

        let Some(room_id) = room else {
            return Ok(false);
        };

        let room_id = view::parse_id(&room_id, "message room_id");
        self.notifier.emit_to_room(
            room_id,
            ServerEvent::MessageRead {
                room_id,
                message_id,
                user_id: actor.user_id(),
                timestamp: Utc::now(),
            },
            actor.connection_id,
        );
        Ok(true)
    }
}

/// Load a message for a room-scoped operation. Membership is checked before
/// existence so outsiders never learn which ids are real.
fn message_in_room(
    db: &Database,
    room_id: &str,
    message_id: &str,
    user_id: &str,
) -> ChatResult<MessageRow> {
    require_participant(db, room_id, user_id)?;
    db.get_message(message_id)?
        .filter(|m| m.room_id == room_id)
        .ok_or(ChatError::NotFound("message"))
}

fn validate_emoji(emoji: &str) -> ChatResult<String> {
    let emoji = emoji.trim();
    if emoji.is_empty() {
        return Err(ChatError::validation("emoji must not be empty"));
    }
    if emoji.len() > MAX_EMOJI_LEN {
        return Err(ChatError::validation("emoji is too long"));
    }
    Ok(emoji.to_string())
}
