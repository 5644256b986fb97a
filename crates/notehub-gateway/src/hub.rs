use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use notehub_types::events::{ConnectionId, ServerEvent};
use notehub_types::models::{Identity, LiveMember};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Outbound queue of one connection. Drained by the connection's send task.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
}

struct ConnectionEntry {
    identity: Identity,
    tx: EventSender,
    rooms: HashSet<Uuid>,
}

struct RoomMember {
    identity: Identity,
    tx: EventSender,
}

/// Registry of live connections and the rooms they are watching.
///
/// Three maps, each sharded: connection -> entry, user -> connections and
/// room -> members. Empty user and room entries are pruned on every removal.
/// Lock order is connections, then users, then rooms. Fan-out only reads
/// the room map, so a busy room never blocks joins elsewhere.
#[derive(Clone, Default)]
pub struct PresenceHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    users: DashMap<Uuid, HashSet<ConnectionId>>,
    rooms: DashMap<Uuid, HashMap<ConnectionId, RoomMember>>,
}

impl PresenceHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection and greet it with `connected`.
    pub fn connect(&self, identity: Identity, tx: EventSender) -> ConnectionId {
        let connection_id = ConnectionId::new();

        let _ = tx.send(ServerEvent::Connected {
            user_id: identity.user_id,
            username: identity.username.clone(),
            timestamp: Utc::now(),
        });

        self.inner.connections.insert(
            connection_id,
            ConnectionEntry {
                identity: identity.clone(),
                tx,
                rooms: HashSet::new(),
            },
        );
        self.inner
            .users
            .entry(identity.user_id)
            .or_default()
            .insert(connection_id);

        debug!(
            "{} ({}) registered connection {}",
            identity.username, identity.user_id, connection_id
        );
        connection_id
    }

    /// Add the connection to the room's live set. The joiner always gets the
    /// current member list; the others hear `user-joined` only on a fresh
    /// join. Returns whether the join was fresh.
    pub fn join_room(
        &self,
        connection_id: ConnectionId,
        room_id: Uuid,
    ) -> Result<bool, PresenceError> {
        let (identity, tx, fresh) = {
            let mut entry = self
                .inner
                .connections
                .get_mut(&connection_id)
                .ok_or(PresenceError::UnknownConnection(connection_id))?;

            let fresh = entry.rooms.insert(room_id);
            if fresh {
                self.inner.rooms.entry(room_id).or_default().insert(
                    connection_id,
                    RoomMember {
                        identity: entry.identity.clone(),
                        tx: entry.tx.clone(),
                    },
                );
            }
            (entry.identity.clone(), entry.tx.clone(), fresh)
        };

        let members = self.live_members(room_id);
        let _ = tx.send(ServerEvent::RoomMembers {
            room_id,
            count: members.len(),
            members,
        });

        if fresh {
            self.fan_out(
                room_id,
                ServerEvent::UserJoined {
                    user_id: identity.user_id,
                    username: identity.username,
                    room_id,
                    timestamp: Utc::now(),
                },
                Some(connection_id),
            );
        }
        Ok(fresh)
    }

    /// Returns whether the connection had actually joined the room.
    pub fn leave_room(
        &self,
        connection_id: ConnectionId,
        room_id: Uuid,
    ) -> Result<bool, PresenceError> {
        let (identity, left) = {
            let mut entry = self
                .inner
                .connections
                .get_mut(&connection_id)
                .ok_or(PresenceError::UnknownConnection(connection_id))?;

            let left = entry.rooms.remove(&room_id);
            if left {
                self.remove_member(room_id, connection_id);
            }
            (entry.identity.clone(), left)
        };

        if left {
            self.announce_left(&identity, room_id);
        }
        Ok(left)
    }

    /// Tear down a connection. Safe to call any number of times; only the
    /// first call does anything. Returns the rooms the connection had joined,
    /// each of which got exactly one `user-left`.
    pub fn disconnect(&self, connection_id: ConnectionId) -> Vec<Uuid> {
        let Some((_, entry)) = self.inner.connections.remove(&connection_id) else {
            return Vec::new();
        };

        let user_id = entry.identity.user_id;
        if let Some(mut conns) = self.inner.users.get_mut(&user_id) {
            conns.remove(&connection_id);
        }
        self.inner.users.remove_if(&user_id, |_, conns| conns.is_empty());

        let rooms: Vec<Uuid> = entry.rooms.into_iter().collect();
        for room_id in &rooms {
            self.remove_member(*room_id, connection_id);
            self.announce_left(&entry.identity, *room_id);
        }

        info!(
            "{} ({}) connection {} closed, left {} room(s)",
            entry.identity.username,
            user_id,
            connection_id,
            rooms.len()
        );
        rooms
    }

    /// Distinct users with at least one live connection in the room.
    pub fn live_members(&self, room_id: Uuid) -> Vec<LiveMember> {
        let Some(room) = self.inner.rooms.get(&room_id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut members: Vec<LiveMember> = room
            .values()
            .filter(|m| seen.insert(m.identity.user_id))
            .map(|m| LiveMember {
                user_id: m.identity.user_id,
                username: m.identity.username.clone(),
            })
            .collect();
        members.sort_by(|a, b| a.username.cmp(&b.username));
        members
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.users.contains_key(&user_id)
    }

    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner.users.get(&user_id).map_or(0, |c| c.len())
    }

    pub fn is_joined(&self, connection_id: ConnectionId, room_id: Uuid) -> bool {
        self.inner
            .connections
            .get(&connection_id)
            .is_some_and(|e| e.rooms.contains(&room_id))
    }

    /// Rooms with at least one live connection.
    pub fn live_room_count(&self) -> usize {
        self.inner.rooms.len()
    }

    /// Queue an event for a single connection. False if it is gone.
    pub fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        self.inner
            .connections
            .get(&connection_id)
            .is_some_and(|e| e.tx.send(event).is_ok())
    }

    /// Hand the event to every live connection in the room but `exclude`.
    pub(crate) fn fan_out(
        &self,
        room_id: Uuid,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let Some(room) = self.inner.rooms.get(&room_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, member) in room.iter() {
            if Some(*id) == exclude {
                continue;
            }
            // A closed receiver means the connection is mid-teardown.
            if member.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn remove_member(&self, room_id: Uuid, connection_id: ConnectionId) {
        if let Some(mut members) = self.inner.rooms.get_mut(&room_id) {
            members.remove(&connection_id);
        }
        self.inner.rooms.remove_if(&room_id, |_, members| members.is_empty());
    }

    fn announce_left(&self, identity: &Identity, room_id: Uuid) {
        self.fan_out(
            room_id,
            ServerEvent::UserLeft {
                user_id: identity.user_id,
                username: identity.username.clone(),
                room_id,
                timestamp: Utc::now(),
            },
            None,
        );
    }
}
