use notehub_types::events::{ConnectionId, ServerEvent};
use uuid::Uuid;

/// Fan-out hook invoked after a write has committed.
///
/// Implementations deliver at most once to each live connection in the room
/// and never block on slow clients.
pub trait RoomNotifier: Send + Sync {
    /// Returns the number of connections the event was handed to.
    fn emit_to_room(
        &self,
        room_id: Uuid,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize;
}

/// Notifier for contexts without a gateway (CLI tools, some tests).
pub struct NoopNotifier;

impl RoomNotifier for NoopNotifier {
    fn emit_to_room(
        &self,
        _room_id: Uuid,
        _event: ServerEvent,
        _exclude: Option<ConnectionId>,
    ) -> usize {
        0
    }
}
