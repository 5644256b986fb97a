use crate::models::{MessageRow, NewMessage, ReactionRow, ReadReceiptRow};
use crate::{Database, now_timestamp};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

// JOIN users to fetch sender_username in the same query
const MESSAGE_SELECT: &str = "SELECT m.id, m.room_id, m.sender_id, u.username, m.ciphertext, m.photo_url,
            m.is_encrypted, m.is_pinned, m.pinned_by, m.pinned_at, m.sent_at, m.delivered_at, m.created_at
     FROM chat_messages m
     LEFT JOIN users u ON u.id = m.sender_id";

impl Database {
    // -- Messages --

    /// Insert a message and bump the room's `updated_at` in one transaction.
    /// Returns the stored `created_at`.
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<String> {
        self.with_conn(|conn| {
            let created_at = msg.created_at.map_or_else(now_timestamp, str::to_string);
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO chat_messages (id, room_id, sender_id, ciphertext, photo_url, is_encrypted, sent_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    msg.id,
                    msg.room_id,
                    msg.sender_id,
                    msg.ciphertext,
                    msg.photo_url,
                    msg.is_encrypted,
                    created_at
                ],
            )?;
            tx.execute(
                "UPDATE chat_rooms SET updated_at = ?1 WHERE id = ?2",
                params![created_at, msg.room_id],
            )?;
            tx.commit()?;
            Ok(created_at)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// A page of messages, newest first. Ties on `created_at` fall back to
    /// insertion order.
    pub fn get_messages(&self, room_id: &str, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.room_id = ?1
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![room_id, limit, offset], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn latest_message(&self, room_id: &str) -> Result<Option<MessageRow>> {
        Ok(self.get_messages(room_id, 1, 0)?.into_iter().next())
    }

    /// Pinned messages of a room, oldest first.
    pub fn pinned_messages(&self, room_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.room_id = ?1 AND m.is_pinned = 1
                 ORDER BY m.created_at ASC, m.rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([room_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Hard delete. Reactions and receipts go with it.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM chat_read_receipts WHERE message_id = ?1", [id])?;
            tx.execute("DELETE FROM chat_reactions WHERE message_id = ?1", [id])?;
            let deleted = tx.execute("DELETE FROM chat_messages WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(deleted > 0)
        })
    }

    /// Set or clear the pin. `pin` is `(pinned_by, pinned_at)`.
    pub fn set_pinned(&self, message_id: &str, pin: Option<(&str, &str)>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = match pin {
                Some((pinned_by, pinned_at)) => conn.execute(
                    "UPDATE chat_messages SET is_pinned = 1, pinned_by = ?1, pinned_at = ?2 WHERE id = ?3",
                    params![pinned_by, pinned_at, message_id],
                )?,
                None => conn.execute(
                    "UPDATE chat_messages SET is_pinned = 0, pinned_by = NULL, pinned_at = NULL WHERE id = ?1",
                    [message_id],
                )?,
            };
            Ok(changed > 0)
        })
    }

    // -- Reactions --

    /// Returns true if the reaction was new.
    pub fn add_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        emoji: &str,
        at: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO chat_reactions (message_id, user_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![message_id, user_id, emoji, at],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Returns true if a reaction was actually removed.
    pub fn remove_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM chat_reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                params![message_id, user_id, emoji],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Batch-fetch reactions for a set of message IDs.
    pub fn get_reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, user_id, emoji, created_at FROM chat_reactions
                 WHERE message_id IN ({})
                 ORDER BY created_at ASC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        emoji: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Read receipts --

    /// Upsert the receipt and stamp `delivered_at` if it is still unset.
    pub fn record_read_receipt(&self, message_id: &str, user_id: &str, at: &str) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO chat_read_receipts (message_id, user_id, read_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(message_id, user_id) DO UPDATE SET read_at = excluded.read_at",
                params![message_id, user_id, at],
            )?;
            tx.execute(
                "UPDATE chat_messages SET delivered_at = ?1 WHERE id = ?2 AND delivered_at IS NULL",
                params![at, message_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn read_receipts(&self, message_id: &str) -> Result<Vec<ReadReceiptRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, user_id, read_at FROM chat_read_receipts
                 WHERE message_id = ?1
                 ORDER BY read_at ASC",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(ReadReceiptRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        read_at: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
    let row = conn.query_row(&sql, [id], message_from_row).optional()?;
    Ok(row)
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        room_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_username: row.get(3)?,
        ciphertext: row.get(4)?,
        photo_url: row.get(5)?,
        is_encrypted: row.get(6)?,
        is_pinned: row.get(7)?,
        pinned_by: row.get(8)?,
        pinned_at: row.get(9)?,
        sent_at: row.get(10)?,
        delivered_at: row.get(11)?,
        created_at: row.get(12)?,
    })
}
