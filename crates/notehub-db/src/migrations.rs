use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (chat schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE chat_rooms (
                id               TEXT PRIMARY KEY,
                is_group         INTEGER NOT NULL DEFAULT 0,
                name             TEXT,
                created_by       TEXT NOT NULL,
                encryption_salt  BLOB,
                theme            TEXT NOT NULL DEFAULT 'default',
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL
            );

            CREATE TABLE chat_participants (
                room_id       TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
                user_id       TEXT NOT NULL,
                joined_at     TEXT NOT NULL,
                last_read_at  TEXT,
                PRIMARY KEY (room_id, user_id)
            );

            CREATE INDEX idx_chat_participants_user
                ON chat_participants(user_id);

            CREATE TABLE chat_messages (
                id            TEXT PRIMARY KEY,
                room_id       TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
                sender_id     TEXT NOT NULL,
                ciphertext    TEXT NOT NULL,
                photo_url     TEXT,
                is_encrypted  INTEGER NOT NULL DEFAULT 1,
                is_pinned     INTEGER NOT NULL DEFAULT 0,
                pinned_by     TEXT,
                pinned_at     TEXT,
                sent_at       TEXT NOT NULL,
                delivered_at  TEXT,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_chat_messages_room
                ON chat_messages(room_id, created_at);

            CREATE TABLE chat_reactions (
                message_id  TEXT NOT NULL REFERENCES chat_messages(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                emoji       TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id, emoji)
            );

            CREATE TABLE chat_read_receipts (
                message_id  TEXT NOT NULL REFERENCES chat_messages(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                read_at     TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
