use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{ChannelReadRow, uuid_at};
use crate::queries::{channel_exists, live_message, require_member};

/// Unread count for channel alias `c` and the user bound to `?1`: live
/// top-level messages after the read pointer. No pointer means every live
/// top-level message is unread.
pub(crate) const UNREAD_COUNT_SQL: &str = "(SELECT COUNT(*) FROM live_messages um
      WHERE um.channel_id = c.id
        AND um.thread_id IS NULL
        AND um.seq > COALESCE(
            (SELECT r.last_read_seq FROM channel_reads r
             WHERE r.user_id = ?1 AND r.channel_id = c.id), 0))";

impl Database {
    /// Move the caller's read pointer to `message_id`.
    ///
    /// The message must be live and belong to `channel_id`. Moving the pointer
    /// backward is accepted; concurrent calls resolve last-write-wins.
    pub fn mark_read(&self, user_id: Uuid, channel_id: Uuid, message_id: Uuid) -> StoreResult<ChannelReadRow> {
        self.with_conn(|conn| {
            if !channel_exists(conn, channel_id)? {
                return Err(StoreError::NotFound("channel"));
            }
            require_member(conn, channel_id, user_id)?;

            let message = live_message(conn, message_id)?
                .filter(|m| m.channel_id == channel_id)
                .ok_or(StoreError::NotFound("message"))?;

            upsert_pointer(conn, user_id, channel_id, message.id, message.seq)?;
            query_pointer(conn, user_id, channel_id)?.ok_or(StoreError::NotFound("read pointer"))
        })
    }

    pub fn read_pointer(&self, user_id: Uuid, channel_id: Uuid) -> StoreResult<Option<ChannelReadRow>> {
        self.with_conn(|conn| query_pointer(conn, user_id, channel_id))
    }

    /// Unread top-level messages for a member. Non-members get `NotMember`.
    pub fn unread_count(&self, user_id: Uuid, channel_id: Uuid) -> StoreResult<u64> {
        self.with_conn(|conn| {
            if !channel_exists(conn, channel_id)? {
                return Err(StoreError::NotFound("channel"));
            }
            require_member(conn, channel_id, user_id)?;
            let sql = format!("SELECT {} FROM channels c WHERE c.id = ?2", UNREAD_COUNT_SQL);
            let count: i64 = conn.query_row(
                &sql,
                (user_id.to_string(), channel_id.to_string()),
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

pub(crate) fn upsert_pointer(
    conn: &Connection,
    user_id: Uuid,
    channel_id: Uuid,
    message_id: Uuid,
    seq: i64,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO channel_reads (user_id, channel_id, last_read_message_id, last_read_seq, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, channel_id) DO UPDATE SET
            last_read_message_id = excluded.last_read_message_id,
            last_read_seq = excluded.last_read_seq,
            updated_at = excluded.updated_at",
        (
            user_id.to_string(),
            channel_id.to_string(),
            message_id.to_string(),
            seq,
            Utc::now(),
        ),
    )?;
    Ok(())
}

fn query_pointer(conn: &Connection, user_id: Uuid, channel_id: Uuid) -> StoreResult<Option<ChannelReadRow>> {
    let row = conn
        .query_row(
            "SELECT user_id, channel_id, last_read_message_id, last_read_seq, updated_at
             FROM channel_reads WHERE user_id = ?1 AND channel_id = ?2",
            (user_id.to_string(), channel_id.to_string()),
            |row| {
                Ok(ChannelReadRow {
                    user_id: uuid_at(row, 0)?,
                    channel_id: uuid_at(row, 1)?,
                    last_read_message_id: uuid_at(row, 2)?,
                    last_read_seq: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}
