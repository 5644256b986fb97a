use crate::{Database, now_timestamp};
use crate::models::{NewRoom, ParticipantRow, RoomRow};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};

const ROOM_COLUMNS: &str =
    "id, is_group, name, created_by, encryption_salt, theme, created_at, updated_at";

impl Database {
    // -- Users --

    /// Remember the username last seen for a verified identity.
    pub fn upsert_user(&self, id: &str, username: &str, at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET username = excluded.username, updated_at = excluded.updated_at",
                params![id, username, at],
            )?;
            Ok(())
        })
    }

    // -- Rooms --

    /// Return the direct room whose participants are exactly `{user_a, user_b}`,
    /// creating it (with both participants) if there is none.
    /// Returns (room, created).
    pub fn find_or_create_direct_room(
        &self,
        room: &NewRoom<'_>,
        user_a: &str,
        user_b: &str,
    ) -> Result<(RoomRow, bool)> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT r.id
                     FROM chat_participants pa
                     JOIN chat_rooms r ON r.id = pa.room_id
                     WHERE pa.user_id = ?1
                       AND r.is_group = 0
                       AND EXISTS (SELECT 1 FROM chat_participants pb
                                   WHERE pb.room_id = r.id AND pb.user_id = ?2)
                       AND (SELECT COUNT(*) FROM chat_participants pc
                            WHERE pc.room_id = r.id) = 2
                     ORDER BY r.created_at ASC
                     LIMIT 1",
                    params![user_a, user_b],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(room_id) = existing {
                let row = query_room(&tx, &room_id)?
                    .ok_or_else(|| anyhow!("Room vanished during lookup: {}", room_id))?;
                tx.commit()?;
                return Ok((row, false));
            }

            insert_room(&tx, room)?;
            insert_participant(&tx, room.id, user_a, room.created_at)?;
            insert_participant(&tx, room.id, user_b, room.created_at)?;

            let row = query_room(&tx, room.id)?
                .ok_or_else(|| anyhow!("Room missing after insert: {}", room.id))?;
            tx.commit()?;
            Ok((row, true))
        })
    }

    /// Insert a group room and all its participants atomically.
    pub fn create_group_room(
        &self,
        room: &NewRoom<'_>,
        participant_ids: &[String],
    ) -> Result<RoomRow> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            insert_room(&tx, room)?;
            for user_id in participant_ids {
                insert_participant(&tx, room.id, user_id, room.created_at)?;
            }

            let row = query_room(&tx, room.id)?
                .ok_or_else(|| anyhow!("Room missing after insert: {}", room.id))?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_room(&self, id: &str) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| query_room(conn, id))
    }

    pub fn list_rooms_for_user(&self, user_id: &str) -> Result<Vec<RoomRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ROOM_COLUMNS} FROM chat_rooms
                 WHERE id IN (SELECT room_id FROM chat_participants WHERE user_id = ?1)
                 ORDER BY updated_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], room_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Set the room salt only if it has none yet, then return whichever salt
    /// the room ends up with. Concurrent callers all get the same value.
    /// Returns `None` if the room does not exist.
    pub fn claim_room_salt(&self, room_id: &str, candidate: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chat_rooms SET encryption_salt = ?1
                 WHERE id = ?2 AND (encryption_salt IS NULL OR length(encryption_salt) = 0)",
                params![candidate, room_id],
            )?;

            let salt = conn
                .query_row(
                    "SELECT encryption_salt FROM chat_rooms WHERE id = ?1",
                    [room_id],
                    |row| row.get::<_, Option<Vec<u8>>>(0),
                )
                .optional()?;

            Ok(salt.flatten())
        })
    }

    pub fn set_room_theme(&self, room_id: &str, theme: &str, at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE chat_rooms SET theme = ?1, updated_at = ?2 WHERE id = ?3",
                params![theme, at, room_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete a room and everything scoped to it, children first.
    pub fn delete_room(&self, room_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            tx.execute(
                "DELETE FROM chat_read_receipts
                 WHERE message_id IN (SELECT id FROM chat_messages WHERE room_id = ?1)",
                [room_id],
            )?;
            tx.execute(
                "DELETE FROM chat_reactions
                 WHERE message_id IN (SELECT id FROM chat_messages WHERE room_id = ?1)",
                [room_id],
            )?;
            tx.execute("DELETE FROM chat_messages WHERE room_id = ?1", [room_id])?;
            tx.execute("DELETE FROM chat_participants WHERE room_id = ?1", [room_id])?;
            let deleted = tx.execute("DELETE FROM chat_rooms WHERE id = ?1", [room_id])?;

            tx.commit()?;
            Ok(deleted > 0)
        })
    }

    // -- Participants --

    pub fn is_participant(&self, room_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM chat_participants WHERE room_id = ?1 AND user_id = ?2",
                    params![room_id, user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_participants(&self, room_id: &str) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.room_id, p.user_id, u.username, p.joined_at, p.last_read_at
                 FROM chat_participants p
                 LEFT JOIN users u ON u.id = p.user_id
                 WHERE p.room_id = ?1
                 ORDER BY p.joined_at ASC, p.user_id ASC",
            )?;

            let rows = stmt
                .query_map([room_id], |row| {
                    Ok(ParticipantRow {
                        room_id: row.get(0)?,
                        user_id: row.get(1)?,
                        username: row.get(2)?,
                        joined_at: row.get(3)?,
                        last_read_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Messages from others newer than the user's watermark
    /// (`max(last_read_at, joined_at)`). Zero for non-participants.
    pub fn unread_count(&self, room_id: &str, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*)
                 FROM chat_messages m
                 JOIN chat_participants p ON p.room_id = m.room_id AND p.user_id = ?2
                 WHERE m.room_id = ?1
                   AND m.sender_id <> ?2
                   AND m.created_at > MAX(COALESCE(p.last_read_at, p.joined_at), p.joined_at)",
                params![room_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
    }

    /// Move the participant's read watermark. `None` stamps it while the
    /// write holds the connection. Returns false if there is no such
    /// participant.
    pub fn mark_room_read(&self, room_id: &str, user_id: &str, at: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let at = at.map_or_else(now_timestamp, str::to_string);
            let changed = conn.execute(
                "UPDATE chat_participants SET last_read_at = ?1 WHERE room_id = ?2 AND user_id = ?3",
                params![at, room_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }
}

fn insert_room(conn: &Connection, room: &NewRoom<'_>) -> Result<()> {
    conn.execute(
        "INSERT INTO chat_rooms (id, is_group, name, created_by, encryption_salt, theme, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'default', ?6, ?6)",
        params![
            room.id,
            room.is_group,
            room.name,
            room.created_by,
            room.encryption_salt,
            room.created_at
        ],
    )?;
    Ok(())
}

fn insert_participant(
    conn: &Connection,
    room_id: &str,
    user_id: &str,
    joined_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO chat_participants (room_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
        params![room_id, user_id, joined_at],
    )?;
    Ok(())
}

fn query_room(conn: &Connection, id: &str) -> Result<Option<RoomRow>> {
    let sql = format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = ?1");
    let row = conn.query_row(&sql, [id], room_from_row).optional()?;
    Ok(row)
}

fn room_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoomRow> {
    Ok(RoomRow {
        id: row.get(0)?,
        is_group: row.get(1)?,
        name: row.get(2)?,
        created_by: row.get(3)?,
        encryption_salt: row.get(4)?,
        theme: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
