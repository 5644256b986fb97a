use notehub_chat::RoomNotifier;
use notehub_types::events::{ConnectionId, ServerEvent};
use tracing::{trace, warn};
use uuid::Uuid;

use crate::hub::PresenceHub;

/// Room-scoped fan-out over the hub's live membership.
///
/// Best effort and at most once: there is no queue and no retry. A client
/// that misses an event catches up through the message history on reconnect.
#[derive(Clone)]
pub struct BroadcastRouter {
    hub: PresenceHub,
}

impl BroadcastRouter {
    pub fn new(hub: PresenceHub) -> Self {
        Self { hub }
    }

    /// Events that name a different room are dropped rather than leaked
    /// into this one.
    pub fn emit_to_room(
        &self,
        room_id: Uuid,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let name = event.name();
        if let Some(event_room) = event.room_id().filter(|r| *r != room_id) {
            warn!("Dropping {} for room {}: event belongs to room {}", name, room_id, event_room);
            return 0;
        }

        let delivered = self.hub.fan_out(room_id, event, exclude);
        trace!("{} -> room {} ({} connections)", name, room_id, delivered);
        delivered
    }
}

impl RoomNotifier for BroadcastRouter {
    fn emit_to_room(
        &self,
        room_id: Uuid,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        BroadcastRouter::emit_to_room(self, room_id, event, exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notehub_types::models::Identity;
    use tokio::sync::mpsc;

    #[test]
    fn sender_does_not_get_an_echo() {
        let hub = PresenceHub::new();
        let router = BroadcastRouter::new(hub.clone());
        let room = Uuid::new_v4();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = hub.connect(Identity::new(Uuid::new_v4(), "alice"), tx_a);
        let b = hub.connect(Identity::new(Uuid::new_v4(), "bob"), tx_b);
        hub.join_room(a, room).unwrap();
        hub.join_room(b, room).unwrap();
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        let event = ServerEvent::Typing {
            room_id: room,
            user_id: Uuid::new_v4(),
            username: "alice".into(),
            timestamp: chrono::Utc::now(),
        };
        let notifier: &dyn RoomNotifier = &router;
        assert_eq!(notifier.emit_to_room(room, event, Some(a)), 1);

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().name(), "typing");
    }

    #[test]
    fn events_for_another_room_are_not_delivered() {
        let hub = PresenceHub::new();
        let router = BroadcastRouter::new(hub.clone());
        let room = Uuid::new_v4();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = hub.connect(Identity::new(Uuid::new_v4(), "alice"), tx);
        hub.join_room(conn, room).unwrap();
        while rx.try_recv().is_ok() {}

        let stray = ServerEvent::Typing {
            room_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            username: "bob".into(),
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(router.emit_to_room(room, stray, None), 0);
        assert!(rx.try_recv().is_err());
    }
}
