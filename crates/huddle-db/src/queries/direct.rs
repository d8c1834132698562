use chrono::Utc;
use huddle_types::pagination::{Page, PageQuery};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::DirectMessageRow;
use crate::queries::{collect_rows, cursor_key, user_exists};
use crate::validate;

impl Database {
    /// Direct messages need no shared channel, only an existing recipient.
    pub fn send_direct_message(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        content: &str,
    ) -> StoreResult<DirectMessageRow> {
        let content = validate::content(content)?;
        let id = Uuid::new_v4();

        self.with_conn(|conn| {
            if !user_exists(conn, recipient_id)? {
                return Err(StoreError::NotFound("user"));
            }
            conn.execute(
                "INSERT INTO direct_messages (id, sender_id, recipient_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    id.to_string(),
                    sender_id.to_string(),
                    recipient_id.to_string(),
                    &content,
                    Utc::now(),
                ),
            )?;
            query_live_direct(conn, id)?.ok_or(StoreError::NotFound("direct message"))
        })
    }

    /// Both directions of a conversation, newest first.
    pub fn list_conversation(
        &self,
        user_id: Uuid,
        other_id: Uuid,
        page: &PageQuery,
    ) -> StoreResult<Page<DirectMessageRow>> {
        let limit = page.limit();
        self.with_conn(|conn| {
            if !user_exists(conn, other_id)? {
                return Err(StoreError::NotFound("user"));
            }
            let before = match page.cursor {
                Some(cursor) => cursor_key(
                    conn,
                    "SELECT seq FROM direct_messages
                     WHERE id = ?1
                       AND ((sender_id = ?2 AND recipient_id = ?3)
                         OR (sender_id = ?3 AND recipient_id = ?2))",
                    (cursor.to_string(), user_id.to_string(), other_id.to_string()),
                )?,
                None => i64::MAX,
            };
            let sql = format!(
                "SELECT {} FROM live_direct_messages
                 WHERE ((sender_id = ?1 AND recipient_id = ?2)
                     OR (sender_id = ?2 AND recipient_id = ?1))
                   AND seq < ?3
                 ORDER BY seq DESC
                 LIMIT ?4",
                DirectMessageRow::COLUMNS
            );
            let rows = collect_rows(
                conn,
                &sql,
                (
                    user_id.to_string(),
                    other_id.to_string(),
                    before,
                    (limit + 1) as i64,
                ),
                DirectMessageRow::from_row,
            )?;
            Ok(Page::from_overfetch(rows, limit, |m| m.id))
        })
    }

    /// Stamp `read_at` on every unread live message `other_id` sent to
    /// `user_id`. Returns how many were marked.
    pub fn mark_conversation_read(&self, user_id: Uuid, other_id: Uuid) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let marked = conn.execute(
                "UPDATE direct_messages SET read_at = ?3
                 WHERE sender_id = ?1 AND recipient_id = ?2
                   AND read_at IS NULL AND deleted_at IS NULL",
                (other_id.to_string(), user_id.to_string(), Utc::now()),
            )?;
            Ok(marked)
        })
    }

    pub fn unread_direct_count(&self, user_id: Uuid, from_id: Uuid) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM live_direct_messages
                 WHERE sender_id = ?1 AND recipient_id = ?2 AND read_at IS NULL",
                (from_id.to_string(), user_id.to_string()),
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Only the sender may delete. Returns the message as it was.
    pub fn delete_direct_message(&self, id: Uuid, requester: Uuid) -> StoreResult<DirectMessageRow> {
        self.with_conn(|conn| {
            let row = query_live_direct(conn, id)?.ok_or(StoreError::NotFound("direct message"))?;
            if row.sender_id != requester {
                return Err(StoreError::Forbidden("only the sender can delete a direct message"));
            }
            conn.execute(
                "UPDATE direct_messages SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                (id.to_string(), Utc::now()),
            )?;
            Ok(row)
        })
    }
}

fn query_live_direct(conn: &Connection, id: Uuid) -> StoreResult<Option<DirectMessageRow>> {
    let sql = format!(
        "SELECT {} FROM live_direct_messages WHERE id = ?1",
        DirectMessageRow::COLUMNS
    );
    Ok(conn.query_row(&sql, [id.to_string()], DirectMessageRow::from_row).optional()?)
}
