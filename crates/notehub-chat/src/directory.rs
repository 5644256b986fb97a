use std::sync::Arc;

use chrono::Utc;
use notehub_crypto::{ChatSecret, generate_salt};
use notehub_db::models::NewRoom;
use notehub_db::{Database, timestamp};
use notehub_types::events::ServerEvent;
use notehub_types::models::{ChatRoom, Identity, RoomDetail, RoomSummary, RoomTheme};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::notify::RoomNotifier;
use crate::{Actor, require_participant, run_blocking, view};

/// Smallest group, creator included.
pub const MIN_GROUP_PARTICIPANTS: usize = 3;

pub const MAX_ROOM_NAME_LEN: usize = 100;

/// Rooms, membership and per-user listings.
#[derive(Clone)]
pub struct RoomDirectory {
    db: Arc<Database>,
    secret: Arc<ChatSecret>,
    notifier: Arc<dyn RoomNotifier>,
}

impl RoomDirectory {
    pub fn new(
        db: Arc<Database>,
        secret: Arc<ChatSecret>,
        notifier: Arc<dyn RoomNotifier>,
    ) -> Self {
        Self { db, secret, notifier }
    }

    /// Cache the caller's username so other participants can see it.
    pub async fn remember_identity(&self, identity: &Identity) -> ChatResult<()> {
        let id = identity.user_id.to_string();
        let username = identity.username.clone();
        run_blocking(&self.db, move |db| {
            db.upsert_user(&id, &username, &timestamp(Utc::now()))?;
            Ok(())
        })
        .await
    }

    /// Find the direct room between the two users, or create it.
    /// Lookup and creation share one transaction, so both users opening the
    /// chat at the same moment end up in the same room.
    pub async fn get_or_create_direct_chat(
        &self,
        requester: &Identity,
        other_user: Uuid,
    ) -> ChatResult<ChatRoom> {
        if requester.user_id == other_user {
            return Err(ChatError::validation("cannot open a direct chat with yourself"));
        }

        let room_id = Uuid::new_v4().to_string();
        let user_a = requester.user_id.to_string();
        let user_b = other_user.to_string();

        let (row, created) = run_blocking(&self.db, move |db| {
            let salt = generate_salt();
            let created_at = timestamp(Utc::now());
            let new_room = NewRoom {
                id: &room_id,
                is_group: false,
                name: None,
                created_by: &user_a,
                encryption_salt: &salt,
                created_at: &created_at,
            };
            Ok(db.find_or_create_direct_room(&new_room, &user_a, &user_b)?)
        })
        .await?;

        if created {
            info!("Direct room {} created for {} and {}", row.id, requester.user_id, other_user);
        }
        Ok(view::room(&row))
    }

    pub async fn create_group_chat(
        &self,
        creator: &Identity,
        name: &str,
        participant_ids: &[Uuid],
    ) -> ChatResult<ChatRoom> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ChatError::validation("group name must not be empty"));
        }
        if name.chars().count() > MAX_ROOM_NAME_LEN {
            return Err(ChatError::validation(format!(
                "group name must be at most {} characters",
                MAX_ROOM_NAME_LEN
            )));
        }

        let mut members = vec![creator.user_id];
        for id in participant_ids {
            if !members.contains(id) {
                members.push(*id);
            }
        }
        if members.len() < MIN_GROUP_PARTICIPANTS {
            return Err(ChatError::validation(format!(
                "a group needs at least {} participants including the creator",
                MIN_GROUP_PARTICIPANTS
            )));
        }

        let room_id = Uuid::new_v4().to_string();
        let created_by = creator.user_id.to_string();
        let member_ids: Vec<String> = members.iter().map(Uuid::to_string).collect();
        let count = member_ids.len();

        let row = run_blocking(&self.db, move |db| {
            let salt = generate_salt();
            let created_at = timestamp(Utc::now());
            let new_room = NewRoom {
                id: &room_id,
                is_group: true,
                name: Some(name.as_str()),
                created_by: &created_by,
                encryption_salt: &salt,
                created_at: &created_at,
            };
            Ok(db.create_group_room(&new_room, &member_ids)?)
        })
        .await?;

        info!("Group room {} created by {} with {} participants", row.id, creator.user_id, count);
        Ok(view::room(&row))
    }

    /// Every room the user belongs to, with participants, the latest message
    /// and the unread count. Most recently active first.
    pub async fn list_rooms_for_user(&self, user_id: Uuid) -> ChatResult<Vec<RoomSummary>> {
        let uid = user_id.to_string();
        let secret = self.secret.clone();

        let mut summaries = run_blocking(&self.db, move |db| {
            let rooms = db.list_rooms_for_user(&uid)?;
            let mut summaries = Vec::with_capacity(rooms.len());

            for row in rooms {
                let participants = db
                    .get_participants(&row.id)?
                    .into_iter()
                    .map(view::participant)
                    .collect();

                let latest: Vec<_> = db.latest_message(&row.id)?.into_iter().collect();
                let salt = row.encryption_salt.as_deref();
                let last_message = view::render_messages(db, latest, &secret, salt)?.pop();

                let unread_count = db.unread_count(&row.id, &uid)?;

                summaries.push(RoomSummary {
                    room: view::room(&row),
                    participants,
                    last_message,
                    unread_count,
                });
            }

            Ok(summaries)
        })
        .await?;

        summaries.sort_by_key(|s| std::cmp::Reverse(s.last_activity()));
        Ok(summaries)
    }

    /// Room and participants, for participants only.
    pub async fn get_room(&self, room_id: Uuid, user_id: Uuid) -> ChatResult<RoomDetail> {
        let rid = room_id.to_string();
        let uid = user_id.to_string();
        run_blocking(&self.db, move |db| {
            require_participant(db, &rid, &uid)?;
            let row = db.get_room(&rid)?.ok_or(ChatError::NotAuthorized)?;
            let participants = db
                .get_participants(&rid)?
                .into_iter()
                .map(view::participant)
                .collect();
            Ok(RoomDetail {
                room: view::room(&row),
                participants,
            })
        })
        .await
    }

    /// Unread messages for a participant; 0 for anyone else.
    pub async fn get_unread_count(&self, room_id: Uuid, user_id: Uuid) -> ChatResult<u64> {
        let rid = room_id.to_string();
        let uid = user_id.to_string();
        run_blocking(&self.db, move |db| Ok(db.unread_count(&rid, &uid)?)).await
    }

    /// Move the user's read watermark to now.
    pub async fn mark_read(&self, room_id: Uuid, user_id: Uuid) -> ChatResult<()> {
        let rid = room_id.to_string();
        let uid = user_id.to_string();
        let updated = run_blocking(&self.db, move |db| {
            Ok(db.mark_room_read(&rid, &uid, None)?)
        })
        .await?;

        if !updated {
            return Err(ChatError::NotAuthorized);
        }
        debug!("{} marked room {} as read", user_id, room_id);
        Ok(())
    }

    pub async fn check_access(&self, room_id: Uuid, user_id: Uuid) -> ChatResult<bool> {
        let rid = room_id.to_string();
        let uid = user_id.to_string();
        run_blocking(&self.db, move |db| Ok(db.is_participant(&rid, &uid)?)).await
    }

    pub async fn update_theme(
        &self,
        actor: &Actor,
        room_id: Uuid,
        theme: RoomTheme,
    ) -> ChatResult<ChatRoom> {
        let rid = room_id.to_string();
        let uid = actor.user_id().to_string();

        let row = run_blocking(&self.db, move |db| {
            require_participant(db, &rid, &uid)?;
            db.set_room_theme(&rid, theme.as_str(), &timestamp(Utc::now()))?;
            db.get_room(&rid)?.ok_or(ChatError::NotAuthorized)
        })
        .await?;

        self.notifier.emit_to_room(
            room_id,
            ServerEvent::RoomThemeUpdated {
                room_id,
                theme,
                updated_by: actor.user_id(),
                timestamp: Utc::now(),
            },
            actor.connection_id,
        );

        Ok(view::room(&row))
    }
}
