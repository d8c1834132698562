use chrono::{DateTime, Utc};
use huddle_types::pagination::{Page, PageQuery};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::MessageRow;
use crate::queries::files::attach_files;
use crate::queries::read_state::upsert_pointer;
use crate::queries::{
    channel_exists, collect_rows, cursor_key, live_message, require_live_message, require_member,
};
use crate::validate;

fn select_live() -> String {
    format!(
        "SELECT {} FROM live_messages m LEFT JOIN users u ON u.id = m.author_id",
        MessageRow::COLUMNS
    )
}

impl Database {
    /// Post a top-level message. Attached files must belong to the author and
    /// not already be attached elsewhere. The author's read pointer moves to
    /// the new message.
    pub fn create_message(
        &self,
        channel_id: Uuid,
        author_id: Uuid,
        content: &str,
        file_ids: &[Uuid],
    ) -> StoreResult<MessageRow> {
        let content = validate::content(content)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !channel_exists(&tx, channel_id)? {
                return Err(StoreError::NotFound("channel"));
            }
            require_member(&tx, channel_id, author_id)?;

            let row = insert_message(&tx, channel_id, author_id, &content, None)?;
            attach_files(&tx, row.id, author_id, file_ids)?;
            upsert_pointer(&tx, author_id, channel_id, row.id, row.seq)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Reply to a top-level message. Only one level of nesting exists: a
    /// reply can never be the parent of another reply.
    pub fn create_reply(
        &self,
        parent_id: Uuid,
        author_id: Uuid,
        content: &str,
        file_ids: &[Uuid],
    ) -> StoreResult<MessageRow> {
        let content = validate::content(content)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let parent = require_live_message(&tx, parent_id)?;
            if parent.is_reply() {
                return Err(StoreError::NestedThread);
            }
            require_member(&tx, parent.channel_id, author_id)?;

            let row = insert_message(&tx, parent.channel_id, author_id, &content, Some(parent.id))?;
            attach_files(&tx, row.id, author_id, file_ids)?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_message(&self, id: Uuid, viewer: Uuid) -> StoreResult<MessageRow> {
        self.with_conn(|conn| {
            let row = require_live_message(conn, id)?;
            require_member(conn, row.channel_id, viewer)?;
            Ok(row)
        })
    }

    /// A live message regardless of who is asking. Used to republish a
    /// message after a change someone else made to it.
    pub fn get_live_message(&self, id: Uuid) -> StoreResult<Option<MessageRow>> {
        self.with_conn(|conn| live_message(conn, id))
    }

    /// Top-level messages, newest first. Fetching the newest page (no cursor)
    /// counts as viewing the channel and advances the viewer's read pointer.
    pub fn list_channel_messages(
        &self,
        channel_id: Uuid,
        viewer: Uuid,
        page: &PageQuery,
    ) -> StoreResult<Page<MessageRow>> {
        let limit = page.limit();
        self.with_conn(|conn| {
            if !channel_exists(conn, channel_id)? {
                return Err(StoreError::NotFound("channel"));
            }
            require_member(conn, channel_id, viewer)?;

            let before = match page.cursor {
                Some(cursor) => cursor_key(
                    conn,
                    "SELECT seq FROM messages WHERE id = ?1 AND channel_id = ?2",
                    (cursor.to_string(), channel_id.to_string()),
                )?,
                None => i64::MAX,
            };
            let sql = format!(
                "{} WHERE m.channel_id = ?1 AND m.thread_id IS NULL AND m.seq < ?2
                 ORDER BY m.seq DESC
                 LIMIT ?3",
                select_live()
            );
            let rows = collect_rows(
                conn,
                &sql,
                (channel_id.to_string(), before, (limit + 1) as i64),
                MessageRow::from_row,
            )?;

            if page.cursor.is_none() {
                if let Some(newest) = rows.first() {
                    upsert_pointer(conn, viewer, channel_id, newest.id, newest.seq)?;
                }
            }

            Ok(Page::from_overfetch(rows, limit, |m| m.id))
        })
    }

    /// A thread: its parent plus live replies, oldest first.
    pub fn list_thread(
        &self,
        parent_id: Uuid,
        viewer: Uuid,
        page: &PageQuery,
    ) -> StoreResult<(MessageRow, Page<MessageRow>)> {
        let limit = page.limit();
        self.with_conn(|conn| {
            let parent = require_live_message(conn, parent_id)?;
            require_member(conn, parent.channel_id, viewer)?;

            let after = match page.cursor {
                Some(cursor) => cursor_key(
                    conn,
                    "SELECT seq FROM messages WHERE id = ?1 AND thread_id = ?2",
                    (cursor.to_string(), parent_id.to_string()),
                )?,
                None => 0,
            };
            let sql = format!(
                "{} WHERE m.thread_id = ?1 AND m.seq > ?2
                 ORDER BY m.seq ASC
                 LIMIT ?3",
                select_live()
            );
            let rows = collect_rows(
                conn,
                &sql,
                (parent_id.to_string(), after, (limit + 1) as i64),
                MessageRow::from_row,
            )?;
            Ok((parent, Page::from_overfetch(rows, limit, |m| m.id)))
        })
    }

    /// Only the author may edit; tombstones read as missing.
    pub fn edit_message(&self, id: Uuid, requester: Uuid, content: &str) -> StoreResult<MessageRow> {
        let content = validate::content(content)?;
        self.with_conn(|conn| {
            let row = require_live_message(conn, id)?;
            if row.author_id != requester {
                return Err(StoreError::Forbidden("only the author can edit a message"));
            }
            conn.execute(
                "UPDATE messages SET content = ?2, edited_at = ?3 WHERE id = ?1 AND deleted_at IS NULL",
                (id.to_string(), &content, Utc::now()),
            )?;
            require_live_message(conn, id)
        })
    }

    /// Tombstone a message. Reactions and files stay in place; every read
    /// path stops seeing the message. Returns the message as it was.
    pub fn delete_message(&self, id: Uuid, requester: Uuid) -> StoreResult<MessageRow> {
        self.with_conn(|conn| {
            let row = require_live_message(conn, id)?;
            if row.author_id != requester {
                return Err(StoreError::Forbidden("only the author can delete a message"));
            }
            conn.execute(
                "UPDATE messages SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                (id.to_string(), Utc::now()),
            )?;
            Ok(row)
        })
    }

    /// Idempotent: pinning a pinned message keeps the original pin.
    pub fn pin_message(&self, id: Uuid, user_id: Uuid) -> StoreResult<MessageRow> {
        self.with_conn(|conn| {
            let row = require_live_message(conn, id)?;
            require_member(conn, row.channel_id, user_id)?;
            if row.pinned_at.is_none() {
                conn.execute(
                    "UPDATE messages SET pinned_by = ?2, pinned_at = ?3 WHERE id = ?1",
                    (id.to_string(), user_id.to_string(), Utc::now()),
                )?;
            }
            require_live_message(conn, id)
        })
    }

    /// Idempotent: unpinning an unpinned message is a no-op.
    pub fn unpin_message(&self, id: Uuid, user_id: Uuid) -> StoreResult<MessageRow> {
        self.with_conn(|conn| {
            let row = require_live_message(conn, id)?;
            require_member(conn, row.channel_id, user_id)?;
            conn.execute(
                "UPDATE messages SET pinned_by = NULL, pinned_at = NULL WHERE id = ?1",
                [id.to_string()],
            )?;
            require_live_message(conn, id)
        })
    }

    /// Pinned live messages, most recently posted first.
    pub fn list_pinned(&self, channel_id: Uuid, viewer: Uuid, page: &PageQuery) -> StoreResult<Page<MessageRow>> {
        let limit = page.limit();
        self.with_conn(|conn| {
            if !channel_exists(conn, channel_id)? {
                return Err(StoreError::NotFound("channel"));
            }
            require_member(conn, channel_id, viewer)?;

            let before = match page.cursor {
                Some(cursor) => cursor_key(
                    conn,
                    "SELECT seq FROM messages WHERE id = ?1 AND channel_id = ?2",
                    (cursor.to_string(), channel_id.to_string()),
                )?,
                None => i64::MAX,
            };
            let sql = format!(
                "{} WHERE m.channel_id = ?1 AND m.pinned_at IS NOT NULL AND m.seq < ?2
                 ORDER BY m.seq DESC
                 LIMIT ?3",
                select_live()
            );
            let rows = collect_rows(
                conn,
                &sql,
                (channel_id.to_string(), before, (limit + 1) as i64),
                MessageRow::from_row,
            )?;
            Ok(Page::from_overfetch(rows, limit, |m| m.id))
        })
    }

    /// Hard-delete tombstones older than `cutoff`. A tombstone that still has
    /// replies (live or not yet purged) is kept so no reply loses its parent.
    /// Reactions and attachment rows cascade.
    pub fn purge_tombstones(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut total = 0;
            // Replies go first, which can free their parents on the next pass.
            loop {
                let purged = tx.execute(
                    "DELETE FROM messages
                     WHERE deleted_at IS NOT NULL
                       AND deleted_at < ?1
                       AND NOT EXISTS (SELECT 1 FROM messages r WHERE r.thread_id = messages.id)",
                    [cutoff],
                )?;
                if purged == 0 {
                    break;
                }
                total += purged;
            }
            tx.execute(
                "DELETE FROM direct_messages WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
                [cutoff],
            )?;
            tx.commit()?;

            if total > 0 {
                info!("Purged {} message tombstones", total);
            }
            Ok(total)
        })
    }
}

fn insert_message(
    conn: &Connection,
    channel_id: Uuid,
    author_id: Uuid,
    content: &str,
    thread_id: Option<Uuid>,
) -> StoreResult<MessageRow> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO messages (id, channel_id, author_id, content, thread_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            id.to_string(),
            channel_id.to_string(),
            author_id.to_string(),
            content,
            thread_id.map(|t| t.to_string()),
            Utc::now(),
        ),
    )?;
    live_message(conn, id)?.ok_or(StoreError::NotFound("message"))
}
