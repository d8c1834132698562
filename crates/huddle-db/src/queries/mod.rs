//! Store operations, grouped by entity. Each submodule adds methods to
//! [`Database`](crate::Database).

mod channels;
mod direct;
pub mod files;
mod messages;
mod reactions;
mod read_state;
mod users;

#[cfg(test)]
mod tests;

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::MessageRow;

pub(crate) fn is_member(conn: &Connection, channel_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
            (channel_id.to_string(), user_id.to_string()),
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn require_member(conn: &Connection, channel_id: Uuid, user_id: Uuid) -> StoreResult<()> {
    if is_member(conn, channel_id, user_id)? {
        Ok(())
    } else {
        Err(StoreError::NotMember)
    }
}

pub(crate) fn channel_exists(conn: &Connection, channel_id: Uuid) -> StoreResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM channels WHERE id = ?1",
            [channel_id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn user_exists(conn: &Connection, user_id: Uuid) -> StoreResult<bool> {
    let found = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", [user_id.to_string()], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// The only accessor for a single message. Tombstones read as absent.
pub(crate) fn live_message(conn: &Connection, id: Uuid) -> StoreResult<Option<MessageRow>> {
    let sql = format!(
        "SELECT {} FROM live_messages m LEFT JOIN users u ON u.id = m.author_id WHERE m.id = ?1",
        MessageRow::COLUMNS
    );
    let row = conn
        .query_row(&sql, [id.to_string()], MessageRow::from_row)
        .optional()?;
    Ok(row)
}

pub(crate) fn require_live_message(conn: &Connection, id: Uuid) -> StoreResult<MessageRow> {
    live_message(conn, id)?.ok_or(StoreError::NotFound("message"))
}

/// Channel of a message, tombstoned or not.
pub(crate) fn message_channel(conn: &Connection, message_id: Uuid) -> StoreResult<Uuid> {
    let channel: String = conn
        .query_row(
            "SELECT channel_id FROM messages WHERE id = ?1",
            [message_id.to_string()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(StoreError::NotFound("message"))?;
    channel
        .parse()
        .map_err(|e| StoreError::Internal(format!("corrupt channel id '{}': {}", channel, e)))
}

/// Resolve a pagination cursor (an entity id) to its ordering key.
pub(crate) fn cursor_key<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StoreResult<i64> {
    conn.query_row(sql, params, |row| row.get(0))
        .optional()?
        .ok_or_else(|| StoreError::invalid("unknown cursor"))
}

/// Collect rows from a prepared query into a Vec.
pub(crate) fn collect_rows<T, P, F>(conn: &Connection, sql: &str, params: P, f: F) -> StoreResult<Vec<T>>
where
    P: rusqlite::Params,
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, f)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Expand `?N` placeholders for an `IN (...)` list starting at index 1.
pub(crate) fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
