//! Chat core: rooms, participants and encrypted messages.
//!
//! Both the REST adapter and the gateway session go through [`ChatService`].
//! Every durable operation runs on the blocking pool; live fan-out happens
//! through a [`RoomNotifier`] only after the write has committed.

pub mod directory;
pub mod error;
pub mod notify;
pub mod store;
pub mod view;

use std::sync::Arc;

use anyhow::anyhow;
use notehub_crypto::ChatSecret;
use notehub_db::Database;
use notehub_types::events::ConnectionId;
use notehub_types::models::Identity;
use tracing::error;
use uuid::Uuid;

pub use directory::RoomDirectory;
pub use error::{ChatError, ChatResult};
pub use notify::{NoopNotifier, RoomNotifier};
pub use store::MessageStore;
pub use view::UNDECRYPTABLE_PLACEHOLDER;

/// Who is performing an operation, and from which gateway connection if any.
/// The connection is excluded from the resulting broadcast.
#[derive(Debug, Clone)]
pub struct Actor {
    pub identity: Identity,
    pub connection_id: Option<ConnectionId>,
}

impl Actor {
    /// A caller coming in over REST.
    pub fn rest(identity: Identity) -> Self {
        Self {
            identity,
            connection_id: None,
        }
    }

    pub fn on_connection(identity: Identity, connection_id: ConnectionId) -> Self {
        Self {
            identity,
            connection_id: Some(connection_id),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.identity.user_id
    }
}

#[derive(Clone)]
pub struct ChatService {
    directory: RoomDirectory,
    messages: MessageStore,
}

impl ChatService {
    pub fn new(db: Arc<Database>, secret: ChatSecret, notifier: Arc<dyn RoomNotifier>) -> Self {
        let secret = Arc::new(secret);
        Self {
            directory: RoomDirectory::new(db.clone(), secret.clone(), notifier.clone()),
            messages: MessageStore::new(db, secret, notifier),
        }
    }

    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }
}

/// Run a storage closure off the async runtime.
pub(crate) async fn run_blocking<F, T>(db: &Arc<Database>, f: F) -> ChatResult<T>
where
    F: FnOnce(&Database) -> ChatResult<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ChatError::Persistence(anyhow!("blocking task failed: {}", e))
        })?
}

pub(crate) fn require_participant(db: &Database, room_id: &str, user_id: &str) -> ChatResult<()> {
    if db.is_participant(room_id, user_id)? {
        Ok(())
    } else {
        Err(ChatError::NotAuthorized)
    }
}
