use chrono::Utc;
use notehub_chat::{Actor, ChatError, ChatService};
use notehub_types::events::{ClientCommand, ConnectionId, ServerEvent};
use notehub_types::models::Identity;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::hub::{EventSender, PresenceError, PresenceHub};
use crate::router::BroadcastRouter;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("session is already {0}")]
    InvalidTransition(&'static str),

    #[error("join the room first")]
    NotJoined,

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Presence(#[from] PresenceError),
}

impl SessionError {
    /// Text safe to show the client. Storage and crypto details stay in logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::Chat(ChatError::Persistence(_)) | Self::Chat(ChatError::Encryption(_)) => {
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Lifecycle of one physical connection.
#[derive(Debug, Clone)]
pub enum ConnectionState {
    Connecting,
    Authenticated {
        connection_id: ConnectionId,
        identity: Identity,
    },
    Disconnected,
}

impl ConnectionState {
    fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Authenticated { .. } => "authenticated",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Per-connection state machine. Owns the connection's registration with
/// the hub and releases it on [`Session::disconnect`] or drop, so a task
/// cancelled mid-command never leaves a ghost member behind.
pub struct Session {
    hub: PresenceHub,
    router: BroadcastRouter,
    chat: ChatService,
    state: ConnectionState,
}

impl Session {
    pub fn new(hub: PresenceHub, router: BroadcastRouter, chat: ChatService) -> Self {
        Self {
            hub,
            router,
            chat,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// `Connecting -> Authenticated`. The identity must already be verified.
    pub fn attach(
        &mut self,
        identity: Identity,
        tx: EventSender,
    ) -> Result<ConnectionId, SessionError> {
        if !matches!(self.state, ConnectionState::Connecting) {
            return Err(SessionError::InvalidTransition(self.state.label()));
        }

        let connection_id = self.hub.connect(identity.clone(), tx);
        self.state = ConnectionState::Authenticated {
            connection_id,
            identity,
        };
        Ok(connection_id)
    }

    pub async fn handle(&mut self, command: ClientCommand) -> Result<(), SessionError> {
        let ConnectionState::Authenticated {
            connection_id,
            identity,
        } = &self.state
        else {
            return Err(SessionError::NotAuthenticated);
        };
        let (connection_id, identity) = (*connection_id, identity.clone());

        match command {
            ClientCommand::JoinRoom { room_id } => {
                // The live map is for notifications only; access comes from
                // the durable participant rows.
                if !self.chat.directory().check_access(room_id, identity.user_id).await? {
                    return Err(ChatError::NotAuthorized.into());
                }
                self.hub.join_room(connection_id, room_id)?;
                debug!("{} joined room {}", identity.username, room_id);
            }

            ClientCommand::LeaveRoom { room_id } => {
                self.hub.leave_room(connection_id, room_id)?;
            }

            ClientCommand::CursorPosition {
                room_id,
                position,
                selection,
            } => {
                self.require_joined(connection_id, room_id)?;
                self.router.emit_to_room(
                    room_id,
                    ServerEvent::CursorPosition {
                        room_id,
                        user_id: identity.user_id,
                        username: identity.username,
                        position,
                        selection,
                        timestamp: Utc::now(),
                    },
                    Some(connection_id),
                );
            }

            ClientCommand::Typing { room_id } => {
                self.require_joined(connection_id, room_id)?;
                self.router.emit_to_room(
                    room_id,
                    ServerEvent::Typing {
                        room_id,
                        user_id: identity.user_id,
                        username: identity.username,
                        timestamp: Utc::now(),
                    },
                    Some(connection_id),
                );
            }

            ClientCommand::SendMessage {
                room_id,
                body,
                photo_url,
            } => {
                let actor = Actor::on_connection(identity, connection_id);
                let message = self.chat.messages().send(&actor, room_id, &body, photo_url).await?;
                // The broadcast skipped this connection; hand it its own copy.
                self.hub.send_to(
                    connection_id,
                    ServerEvent::MessageSent {
                        message,
                        timestamp: Utc::now(),
                    },
                );
            }
        }

        Ok(())
    }

    /// Queue an event for this connection only.
    pub fn reply(&self, event: ServerEvent) -> bool {
        match &self.state {
            ConnectionState::Authenticated { connection_id, .. } => {
                self.hub.send_to(*connection_id, event)
            }
            _ => false,
        }
    }

    /// `* -> Disconnected`. Idempotent. Returns the rooms that were left.
    pub fn disconnect(&mut self) -> Vec<Uuid> {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Disconnected);
        match previous {
            ConnectionState::Authenticated { connection_id, .. } => {
                self.hub.disconnect(connection_id)
            }
            _ => Vec::new(),
        }
    }

    fn require_joined(
        &self,
        connection_id: ConnectionId,
        room_id: Uuid,
    ) -> Result<(), SessionError> {
        if self.hub.is_joined(connection_id, room_id) {
            Ok(())
        } else {
            Err(SessionError::NotJoined)
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}
