use std::sync::{Arc, Mutex};
use std::time::Duration;

use notehub_chat::{
    Actor, ChatError, ChatService, NoopNotifier, RoomNotifier, UNDECRYPTABLE_PLACEHOLDER,
};
use notehub_crypto::ChatSecret;
use notehub_db::Database;
use notehub_types::events::{ConnectionId, ServerEvent};
use notehub_types::models::{Identity, RoomTheme};
use uuid::Uuid;

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<(Uuid, ServerEvent, Option<ConnectionId>)>>,
}

impl RecordingNotifier {
    fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|(_, e, _)| e.name()).collect()
    }

    fn last(&self) -> (Uuid, ServerEvent, Option<ConnectionId>) {
        self.events.lock().unwrap().last().cloned().expect("no events recorded")
    }
}

impl RoomNotifier for RecordingNotifier {
    fn emit_to_room(
        &self,
        room_id: Uuid,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        self.events.lock().unwrap().push((room_id, event, exclude));
        1
    }
}

struct Harness {
    db: Arc<Database>,
    chat: ChatService,
    notifier: Arc<RecordingNotifier>,
}

fn harness() -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let notifier = Arc::new(RecordingNotifier::default());
    let chat = ChatService::new(db.clone(), ChatSecret::new("test-secret"), notifier.clone());
    Harness { db, chat, notifier }
}

fn user(name: &str) -> Identity {
    Identity::new(Uuid::new_v4(), name)
}

async fn known(chat: &ChatService, name: &str) -> Identity {
    let identity = user(name);
    chat.directory().remember_identity(&identity).await.unwrap();
    identity
}

#[tokio::test]
async fn direct_chat_is_deduplicated_in_either_order() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));

    let first = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
    let second = h.chat.directory().get_or_create_direct_chat(&bob, alice.user_id).await.unwrap();
    let third = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.id, third.id);
    assert!(!first.is_group);
    assert_eq!(h.chat.directory().list_rooms_for_user(alice.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_direct_chat_creation_yields_one_room() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let chat = h.chat.clone();
        let (me, other) = if i % 2 == 0 {
            (alice.clone(), bob.user_id)
        } else {
            (bob.clone(), alice.user_id)
        };
        tasks.push(tokio::spawn(async move {
            chat.directory().get_or_create_direct_chat(&me, other).await.unwrap().id
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn direct_chat_with_yourself_is_rejected() {
    let h = harness();
    let alice = user("alice");
    let err = h
        .chat
        .directory()
        .get_or_create_direct_chat(&alice, alice.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

#[tokio::test]
async fn group_needs_three_unique_participants() {
    let h = harness();
    let (alice, bob, carol) = (user("alice"), user("bob"), user("carol"));

    // Creator listed again and a duplicate do not count.
    let err = h
        .chat
        .directory()
        .create_group_chat(&alice, "pair", &[bob.user_id, bob.user_id, alice.user_id])
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));

    let room = h
        .chat
        .directory()
        .create_group_chat(&alice, "  trio  ", &[bob.user_id, carol.user_id])
        .await
        .unwrap();
    assert!(room.is_group);
    assert_eq!(room.name.as_deref(), Some("trio"));
    assert_eq!(room.created_by, alice.user_id);

    let detail = h.chat.directory().get_room(room.id, carol.user_id).await.unwrap();
    assert_eq!(detail.participants.len(), 3);
}

#[tokio::test]
async fn group_name_is_validated() {
    let h = harness();
    let (alice, bob, carol) = (user("alice"), user("bob"), user("carol"));
    let members = [bob.user_id, carol.user_id];

    let blank = h.chat.directory().create_group_chat(&alice, "   ", &members).await;
    assert!(matches!(blank, Err(ChatError::Validation(_))));

    let long = "x".repeat(101);
    let too_long = h.chat.directory().create_group_chat(&alice, &long, &members).await;
    assert!(matches!(too_long, Err(ChatError::Validation(_))));
}

#[tokio::test]
async fn hello_hi_conversation() {
    let h = harness();
    let alice = known(&h.chat, "alice").await;
    let bob = known(&h.chat, "bob").await;
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();

    h.chat.messages().send(&Actor::rest(alice.clone()), room.id, "hello", None).await.unwrap();
    assert_eq!(h.chat.directory().get_unread_count(room.id, alice.user_id).await.unwrap(), 0);

    h.chat.messages().send(&Actor::rest(bob.clone()), room.id, "hi", None).await.unwrap();

    for reader in [alice.user_id, bob.user_id] {
        let page = h.chat.messages().get_messages(room.id, reader, 50, 0).await.unwrap();
        let bodies: Vec<_> = page.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["hello", "hi"]);
        assert_eq!(page[0].sender_id, alice.user_id);
        assert_eq!(page[0].sender_username, "alice");
        assert_eq!(page[1].sender_id, bob.user_id);
    }

    assert_eq!(h.chat.directory().get_unread_count(room.id, alice.user_id).await.unwrap(), 1);
    h.chat.directory().mark_read(room.id, alice.user_id).await.unwrap();
    assert_eq!(h.chat.directory().get_unread_count(room.id, alice.user_id).await.unwrap(), 0);
}

#[tokio::test]
async fn unread_count_tracks_messages_from_others() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
    let bob_actor = Actor::rest(bob.clone());

    for i in 0..5 {
        h.chat.messages().send(&bob_actor, room.id, &format!("msg {}", i), None).await.unwrap();
    }

    assert_eq!(h.chat.directory().get_unread_count(room.id, alice.user_id).await.unwrap(), 5);
    assert_eq!(h.chat.directory().get_unread_count(room.id, bob.user_id).await.unwrap(), 0);

    h.chat.directory().mark_read(room.id, alice.user_id).await.unwrap();
    h.chat.directory().mark_read(room.id, alice.user_id).await.unwrap();
    assert_eq!(h.chat.directory().get_unread_count(room.id, alice.user_id).await.unwrap(), 0);

    h.chat.messages().send(&bob_actor, room.id, "one more", None).await.unwrap();
    assert_eq!(h.chat.directory().get_unread_count(room.id, alice.user_id).await.unwrap(), 1);
}

/// Log the order in which message inserts and read watermarks reach the
/// database.
fn record_commit_order(db: &Database) {
    db.with_conn(|conn| {
        conn.execute_batch(
            "CREATE TABLE commit_log (seq INTEGER PRIMARY KEY AUTOINCREMENT, kind TEXT NOT NULL);
             CREATE TRIGGER log_insert AFTER INSERT ON chat_messages
             BEGIN INSERT INTO commit_log (kind) VALUES ('insert'); END;
             CREATE TRIGGER log_read AFTER UPDATE OF last_read_at ON chat_participants
             BEGIN INSERT INTO commit_log (kind) VALUES ('read'); END;",
        )?;
        Ok(())
    })
    .unwrap();
}

fn commit_order(db: &Database) -> Vec<String> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT kind FROM commit_log ORDER BY seq")?;
        let kinds = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(kinds)
    })
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unread_count_follows_commit_order_under_contention() {
    for _ in 0..20 {
        let h = harness();
        let (alice, bob) = (user("alice"), user("bob"));
        let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
        record_commit_order(&h.db);

        // Keep the connection busy so the send and the reads queue up on it.
        let db = h.db.clone();
        let hold = tokio::task::spawn_blocking(move || {
            db.with_conn(|_| {
                std::thread::sleep(Duration::from_millis(30));
                Ok(())
            })
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let chat = h.chat.clone();
        let sender = Actor::rest(bob.clone());
        let send = tokio::spawn(async move {
            chat.messages().send(&sender, room.id, "late", None).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(1)).await;

        let mut reads = Vec::new();
        for _ in 0..4 {
            let chat = h.chat.clone();
            let reader = alice.user_id;
            reads.push(tokio::spawn(async move {
                chat.directory().mark_read(room.id, reader).await.unwrap();
            }));
        }

        hold.await.unwrap().unwrap();
        send.await.unwrap();
        for read in reads {
            read.await.unwrap();
        }

        let order = commit_order(&h.db);
        let expected = if order.last().map(String::as_str) == Some("insert") { 1 } else { 0 };
        let unread = h.chat.directory().get_unread_count(room.id, alice.user_id).await.unwrap();
        assert_eq!(unread, expected, "commit order {:?}", order);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rooms_without_a_salt_claim_one_on_first_send() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();

    h.db.with_conn(|conn| {
        conn.execute(
            "UPDATE chat_rooms SET encryption_salt = NULL WHERE id = ?1",
            [room.id.to_string()],
        )?;
        Ok(())
    })
    .unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let chat = h.chat.clone();
        let sender = if i % 2 == 0 { alice.clone() } else { bob.clone() };
        tasks.push(tokio::spawn(async move {
            chat.messages()
                .send(&Actor::rest(sender), room.id, &format!("msg {}", i), None)
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stored = h.db.get_room(&room.id.to_string()).unwrap().unwrap();
    assert!(stored.encryption_salt.is_some_and(|salt| !salt.is_empty()));

    let page = h.chat.messages().get_messages(room.id, alice.user_id, 50, 0).await.unwrap();
    assert_eq!(page.len(), 16);
    let mut bodies: Vec<_> = page.iter().map(|m| m.body.clone()).collect();
    bodies.sort();
    let mut expected: Vec<_> = (0..16).map(|i| format!("msg {}", i)).collect();
    expected.sort();
    assert_eq!(bodies, expected);
}

#[tokio::test]
async fn outsiders_are_rejected_whether_or_not_the_room_exists() {
    let h = harness();
    let (alice, bob, mallory) = (user("alice"), user("bob"), user("mallory"));
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
    let sent = h
        .chat
        .messages()
        .send(&Actor::rest(alice.clone()), room.id, "secret", None)
        .await
        .unwrap();

    let outsider = Actor::rest(mallory.clone());
    for room_id in [room.id, Uuid::new_v4()] {
        let send = h.chat.messages().send(&outsider, room_id, "hi", None).await;
        assert!(matches!(send, Err(ChatError::NotAuthorized)));

        let read = h.chat.messages().get_messages(room_id, mallory.user_id, 50, 0).await;
        assert!(matches!(read, Err(ChatError::NotAuthorized)));

        let delete = h.chat.messages().delete_message(&outsider, room_id, sent.id).await;
        assert!(matches!(delete, Err(ChatError::NotAuthorized)));

        let react = h.chat.messages().add_reaction(&outsider, room_id, sent.id, "👍").await;
        assert!(matches!(react, Err(ChatError::NotAuthorized)));

        let detail = h.chat.directory().get_room(room_id, mallory.user_id).await;
        assert!(matches!(detail, Err(ChatError::NotAuthorized)));

        let mark = h.chat.directory().mark_read(room_id, mallory.user_id).await;
        assert!(matches!(mark, Err(ChatError::NotAuthorized)));
    }

    assert!(!h.chat.directory().check_access(room.id, mallory.user_id).await.unwrap());
    assert_eq!(h.chat.directory().get_unread_count(room.id, mallory.user_id).await.unwrap(), 0);

    let receipt = h.chat.messages().mark_message_read(&outsider, sent.id).await;
    assert!(matches!(receipt, Err(ChatError::NotAuthorized)));
}

#[tokio::test]
async fn send_broadcasts_excluding_the_origin_connection() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();

    let conn = ConnectionId::new();
    let sent = h
        .chat
        .messages()
        .send(&Actor::on_connection(alice.clone(), conn), room.id, "over the socket", None)
        .await
        .unwrap();

    let (room_id, event, exclude) = h.notifier.last();
    assert_eq!(room_id, room.id);
    assert_eq!(exclude, Some(conn));
    match event {
        ServerEvent::MessageSent { message, .. } => {
            assert_eq!(message.id, sent.id);
            assert_eq!(message.body, "over the socket");
        }
        other => panic!("unexpected event {:?}", other),
    }

    h.chat.messages().send(&Actor::rest(alice.clone()), room.id, "over rest", None).await.unwrap();
    assert_eq!(h.notifier.last().2, None);
}

#[tokio::test]
async fn empty_messages_are_rejected() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
    let actor = Actor::rest(alice);

    let err = h.chat.messages().send(&actor, room.id, "   ", None).await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
    assert!(h.notifier.names().is_empty());

    // A photo on its own is a valid message.
    let photo = h
        .chat
        .messages()
        .send(&actor, room.id, "", Some("https://cdn.example/p.png".into()))
        .await
        .unwrap();
    assert_eq!(photo.photo_url.as_deref(), Some("https://cdn.example/p.png"));
}

#[tokio::test]
async fn delete_message_requires_sender_or_creator() {
    let h = harness();
    let (alice, bob, carol) = (user("alice"), user("bob"), user("carol"));
    let room = h
        .chat
        .directory()
        .create_group_chat(&alice, "team", &[bob.user_id, carol.user_id])
        .await
        .unwrap();

    let bobs = h
        .chat
        .messages()
        .send(&Actor::rest(bob.clone()), room.id, "from bob", None)
        .await
        .unwrap();

    let carol_try = h
        .chat
        .messages()
        .delete_message(&Actor::rest(carol.clone()), room.id, bobs.id)
        .await;
    assert!(matches!(carol_try, Err(ChatError::NotAuthorized)));

    h.chat.messages().delete_message(&Actor::rest(alice.clone()), room.id, bobs.id).await.unwrap();
    assert_eq!(h.notifier.last().1.name(), "message-deleted");

    let again = h
        .chat
        .messages()
        .delete_message(&Actor::rest(alice.clone()), room.id, bobs.id)
        .await;
    assert!(matches!(again, Err(ChatError::NotFound(_))));

    let own = h
        .chat
        .messages()
        .send(&Actor::rest(carol.clone()), room.id, "mine", None)
        .await
        .unwrap();
    h.chat.messages().delete_message(&Actor::rest(carol.clone()), room.id, own.id).await.unwrap();

    let remaining = h.chat.messages().get_messages(room.id, alice.user_id, 50, 0).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn room_deletion_rules() {
    let h = harness();
    let (alice, bob, carol) = (user("alice"), user("bob"), user("carol"));

    let direct = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
    h.chat.messages().send(&Actor::rest(alice.clone()), direct.id, "bye", None).await.unwrap();
    h.chat.messages().delete_room(&Actor::rest(bob.clone()), direct.id).await.unwrap();
    assert!(!h.chat.directory().check_access(direct.id, alice.user_id).await.unwrap());
    assert_eq!(h.notifier.last().1.name(), "room-deleted");

    let group = h
        .chat
        .directory()
        .create_group_chat(&alice, "team", &[bob.user_id, carol.user_id])
        .await
        .unwrap();
    let by_member = h.chat.messages().delete_room(&Actor::rest(bob.clone()), group.id).await;
    assert!(matches!(by_member, Err(ChatError::NotAuthorized)));
    h.chat.messages().delete_room(&Actor::rest(alice.clone()), group.id).await.unwrap();
    assert!(h.chat.directory().list_rooms_for_user(carol.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn reactions_are_idempotent_and_grouped() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
    let msg = h
        .chat
        .messages()
        .send(&Actor::rest(alice.clone()), room.id, "party", None)
        .await
        .unwrap();

    let (a, b) = (Actor::rest(alice.clone()), Actor::rest(bob.clone()));
    assert!(h.chat.messages().add_reaction(&a, room.id, msg.id, "🎉").await.unwrap());
    assert!(!h.chat.messages().add_reaction(&a, room.id, msg.id, "🎉").await.unwrap());
    assert!(h.chat.messages().add_reaction(&b, room.id, msg.id, "🎉").await.unwrap());
    assert!(h.chat.messages().add_reaction(&b, room.id, msg.id, "👍").await.unwrap());

    let added = h.notifier.names().iter().filter(|n| **n == "reaction-added").count();
    assert_eq!(added, 3);

    let page = h.chat.messages().get_messages(room.id, alice.user_id, 50, 0).await.unwrap();
    let reactions = &page[0].reactions;
    assert_eq!(reactions.len(), 2);
    assert_eq!(reactions[0].emoji, "🎉");
    assert_eq!(reactions[0].count, 2);

    assert!(h.chat.messages().remove_reaction(&b, room.id, msg.id, "👍").await.unwrap());
    assert!(!h.chat.messages().remove_reaction(&b, room.id, msg.id, "👍").await.unwrap());

    let blank = h.chat.messages().add_reaction(&a, room.id, msg.id, " ").await;
    assert!(matches!(blank, Err(ChatError::Validation(_))));

    let missing = h.chat.messages().add_reaction(&a, room.id, Uuid::new_v4(), "🎉").await;
    assert!(matches!(missing, Err(ChatError::NotFound(_))));
}

#[tokio::test]
async fn pins_round_trip() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
    let actor = Actor::rest(bob.clone());
    let msg = h
        .chat
        .messages()
        .send(&Actor::rest(alice.clone()), room.id, "remember this", None)
        .await
        .unwrap();

    let pinned = h.chat.messages().pin_message(&actor, room.id, msg.id).await.unwrap();
    assert!(pinned.is_pinned);
    assert_eq!(pinned.pinned_by, Some(bob.user_id));
    assert_eq!(pinned.body, "remember this");

    let pins = h.chat.messages().pinned_messages(room.id, alice.user_id).await.unwrap();
    assert_eq!(pins.len(), 1);

    let unpinned = h.chat.messages().unpin_message(&actor, room.id, msg.id).await.unwrap();
    assert!(!unpinned.is_pinned);
    assert!(unpinned.pinned_by.is_none());
    assert!(h.chat.messages().pinned_messages(room.id, alice.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn read_receipts_skip_the_sender() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
    let msg = h
        .chat
        .messages()
        .send(&Actor::rest(alice.clone()), room.id, "seen?", None)
        .await
        .unwrap();

    let own_read = h.chat.messages().mark_message_read(&Actor::rest(alice.clone()), msg.id).await;
    assert!(!own_read.unwrap());
    assert_ne!(h.notifier.last().1.name(), "message-read");

    assert!(h.chat.messages().mark_message_read(&Actor::rest(bob.clone()), msg.id).await.unwrap());
    assert_eq!(h.notifier.last().1.name(), "message-read");

    let receipts = h.db.read_receipts(&msg.id.to_string()).unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].user_id, bob.user_id.to_string());

    let page = h.chat.messages().get_messages(room.id, alice.user_id, 50, 0).await.unwrap();
    assert!(page[0].delivered_at.is_some());
}

#[tokio::test]
async fn messages_under_another_secret_show_a_placeholder() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();

    let rotated = ChatService::new(
        h.db.clone(),
        ChatSecret::new("old-secret"),
        Arc::new(NoopNotifier),
    );
    rotated.messages().send(&Actor::rest(alice.clone()), room.id, "lost", None).await.unwrap();
    h.chat.messages().send(&Actor::rest(bob.clone()), room.id, "kept", None).await.unwrap();

    let page = h.chat.messages().get_messages(room.id, alice.user_id, 50, 0).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].body, UNDECRYPTABLE_PLACEHOLDER);
    assert_eq!(page[1].body, "kept");

    let found = h
        .chat
        .messages()
        .search_messages(room.id, alice.user_id, "lost", 20)
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn search_is_case_insensitive_and_chronological() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
    let actor = Actor::rest(alice.clone());

    for body in ["Lunch at noon?", "no thanks", "LUNCH tomorrow then", "ok"] {
        h.chat.messages().send(&actor, room.id, body, None).await.unwrap();
    }

    let found = h.chat.messages().search_messages(room.id, bob.user_id, "lunch", 20).await.unwrap();
    let bodies: Vec<_> = found.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["Lunch at noon?", "LUNCH tomorrow then"]);

    let newest = h.chat.messages().search_messages(room.id, bob.user_id, "lunch", 1).await.unwrap();
    assert_eq!(newest[0].body, "LUNCH tomorrow then");

    let blank = h.chat.messages().search_messages(room.id, bob.user_id, "  ", 20).await;
    assert!(matches!(blank, Err(ChatError::Validation(_))));
}

#[tokio::test]
async fn pagination_counts_back_from_newest() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
    let actor = Actor::rest(alice.clone());

    for i in 0..5 {
        h.chat.messages().send(&actor, room.id, &format!("m{}", i), None).await.unwrap();
    }

    let latest = h.chat.messages().get_messages(room.id, bob.user_id, 2, 0).await.unwrap();
    let bodies: Vec<_> = latest.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["m3", "m4"]);

    let older = h.chat.messages().get_messages(room.id, bob.user_id, 2, 2).await.unwrap();
    let bodies: Vec<_> = older.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["m1", "m2"]);

    // Zero is clamped up to one.
    assert_eq!(h.chat.messages().get_messages(room.id, bob.user_id, 0, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn room_listing_orders_by_activity_and_carries_previews() {
    let h = harness();
    let alice = known(&h.chat, "alice").await;
    let bob = known(&h.chat, "bob").await;
    let carol = known(&h.chat, "carol").await;

    let with_bob = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
    let with_carol = h
        .chat
        .directory()
        .get_or_create_direct_chat(&alice, carol.user_id)
        .await
        .unwrap();

    h
        .chat
        .messages()
        .send(&Actor::rest(carol.clone()), with_carol.id, "first", None)
        .await
        .unwrap();
    h.chat.messages().send(&Actor::rest(bob.clone()), with_bob.id, "latest", None).await.unwrap();

    let rooms = h.chat.directory().list_rooms_for_user(alice.user_id).await.unwrap();
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0].room.id, with_bob.id);
    assert_eq!(rooms[0].last_message.as_ref().map(|m| m.body.as_str()), Some("latest"));
    assert_eq!(rooms[0].unread_count, 1);
    assert!(rooms[0].participants.iter().any(|p| p.username == "bob"));
    assert_eq!(rooms[1].room.id, with_carol.id);
}

#[tokio::test]
async fn theme_updates_are_broadcast() {
    let h = harness();
    let (alice, bob) = (user("alice"), user("bob"));
    let room = h.chat.directory().get_or_create_direct_chat(&alice, bob.user_id).await.unwrap();
    assert_eq!(room.theme, RoomTheme::Default);

    let updated = h
        .chat
        .directory()
        .update_theme(&Actor::rest(bob.clone()), room.id, RoomTheme::Ocean)
        .await
        .unwrap();
    assert_eq!(updated.theme, RoomTheme::Ocean);

    match h.notifier.last().1 {
        ServerEvent::RoomThemeUpdated { theme, updated_by, .. } => {
            assert_eq!(theme, RoomTheme::Ocean);
            assert_eq!(updated_by, bob.user_id);
        }
        other => panic!("unexpected event {:?}", other),
    }
}
