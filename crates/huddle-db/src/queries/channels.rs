use chrono::Utc;
use huddle_types::pagination::{Page, PageQuery};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{ChannelRow, ChannelUnreadRow, MemberRow, uuid_at};
use crate::queries::read_state::UNREAD_COUNT_SQL;
use crate::queries::{channel_exists, collect_rows, cursor_key, require_member, user_exists};
use crate::validate;

impl Database {
    /// Create a channel; the creator becomes its first member.
    pub fn create_channel(&self, creator: Uuid, name: &str, is_private: bool) -> StoreResult<ChannelRow> {
        let name = validate::channel_name(name)?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO channels (id, name, is_private, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id.to_string(), &name, is_private, creator.to_string(), now),
            )
            .map_err(|e| StoreError::from_insert(e, "channel"))?;
            tx.execute(
                "INSERT INTO channel_members (channel_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                (id.to_string(), creator.to_string(), now),
            )?;
            let row = query_channel(&tx, id)?.ok_or(StoreError::NotFound("channel"))?;
            tx.commit()?;

            info!("Channel '{}' ({}) created by {}", name, id, creator);
            Ok(row)
        })
    }

    /// Channel details, visible to members only.
    pub fn get_channel(&self, channel_id: Uuid, viewer: Uuid) -> StoreResult<ChannelRow> {
        self.with_conn(|conn| {
            let row = query_channel(conn, channel_id)?.ok_or(StoreError::NotFound("channel"))?;
            require_member(conn, channel_id, viewer)?;
            Ok(row)
        })
    }

    pub fn is_member(&self, channel_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        self.with_conn(|conn| crate::queries::is_member(conn, channel_id, user_id))
    }

    /// The caller's channels in creation order, each with its unread count.
    pub fn list_user_channels(&self, user_id: Uuid, page: &PageQuery) -> StoreResult<Page<ChannelUnreadRow>> {
        let limit = page.limit();
        self.with_conn(|conn| {
            let after = match page.cursor {
                Some(cursor) => cursor_key(
                    conn,
                    "SELECT c.rowid FROM channels c
                     JOIN channel_members cm ON cm.channel_id = c.id AND cm.user_id = ?2
                     WHERE c.id = ?1",
                    (cursor.to_string(), user_id.to_string()),
                )?,
                None => 0,
            };
            let sql = format!(
                "SELECT {}, {} FROM channels c
                 JOIN channel_members cm ON cm.channel_id = c.id AND cm.user_id = ?1
                 WHERE c.rowid > ?2
                 ORDER BY c.rowid
                 LIMIT ?3",
                ChannelRow::COLUMNS,
                UNREAD_COUNT_SQL
            );
            let rows = collect_rows(
                conn,
                &sql,
                (user_id.to_string(), after, (limit + 1) as i64),
                |row| {
                    Ok(ChannelUnreadRow {
                        channel: ChannelRow::from_row(row)?,
                        unread_count: row.get::<_, i64>(6)? as u64,
                    })
                },
            )?;
            Ok(Page::from_overfetch(rows, limit, |r| r.channel.id))
        })
    }

    /// Public channels anyone can join.
    pub fn browse_channels(&self, page: &PageQuery) -> StoreResult<Page<ChannelRow>> {
        let limit = page.limit();
        self.with_conn(|conn| {
            let after = match page.cursor {
                Some(cursor) => cursor_key(
                    conn,
                    "SELECT rowid FROM channels WHERE id = ?1 AND is_private = 0",
                    [cursor.to_string()],
                )?,
                None => 0,
            };
            let sql = format!(
                "SELECT {} FROM channels c
                 WHERE c.is_private = 0 AND c.rowid > ?1
                 ORDER BY c.rowid
                 LIMIT ?2",
                ChannelRow::COLUMNS
            );
            let rows = collect_rows(conn, &sql, (after, (limit + 1) as i64), ChannelRow::from_row)?;
            Ok(Page::from_overfetch(rows, limit, |r| r.id))
        })
    }

    /// Self-service join. Private channels need an existing member to add you.
    pub fn join_channel(&self, channel_id: Uuid, user_id: Uuid) -> StoreResult<ChannelRow> {
        self.with_conn(|conn| {
            let channel = query_channel(conn, channel_id)?.ok_or(StoreError::NotFound("channel"))?;
            if channel.is_private {
                return Err(StoreError::Forbidden("channel is private"));
            }
            insert_member(conn, channel_id, user_id)?;
            query_channel(conn, channel_id)?.ok_or(StoreError::NotFound("channel"))
        })
    }

    /// A member adds another user, private channels included.
    pub fn add_member(&self, channel_id: Uuid, actor: Uuid, user_id: Uuid) -> StoreResult<ChannelRow> {
        self.with_conn(|conn| {
            if !channel_exists(conn, channel_id)? {
                return Err(StoreError::NotFound("channel"));
            }
            require_member(conn, channel_id, actor)?;
            if !user_exists(conn, user_id)? {
                return Err(StoreError::NotFound("user"));
            }
            insert_member(conn, channel_id, user_id)?;
            query_channel(conn, channel_id)?.ok_or(StoreError::NotFound("channel"))
        })
    }

    /// Leave a channel. The last member is refused so a channel never ends
    /// up empty; the count check and the delete share one transaction.
    pub fn leave_channel(&self, channel_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            if !channel_exists(&tx, channel_id)? {
                return Err(StoreError::NotFound("channel"));
            }
            require_member(&tx, channel_id, user_id)?;

            let members: i64 = tx.query_row(
                "SELECT COUNT(*) FROM channel_members WHERE channel_id = ?1",
                [channel_id.to_string()],
                |row| row.get(0),
            )?;
            if members <= 1 {
                return Err(StoreError::Forbidden("the last member cannot leave"));
            }

            tx.execute(
                "DELETE FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                (channel_id.to_string(), user_id.to_string()),
            )?;
            tx.execute(
                "DELETE FROM channel_reads WHERE channel_id = ?1 AND user_id = ?2",
                (channel_id.to_string(), user_id.to_string()),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn list_members(&self, channel_id: Uuid, viewer: Uuid, page: &PageQuery) -> StoreResult<Page<MemberRow>> {
        let limit = page.limit();
        self.with_conn(|conn| {
            if !channel_exists(conn, channel_id)? {
                return Err(StoreError::NotFound("channel"));
            }
            require_member(conn, channel_id, viewer)?;

            let after = match page.cursor {
                Some(cursor) => cursor_key(
                    conn,
                    "SELECT rowid FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                    (channel_id.to_string(), cursor.to_string()),
                )?,
                None => 0,
            };
            let rows = collect_rows(
                conn,
                "SELECT cm.user_id, u.name, u.status, cm.joined_at
                 FROM channel_members cm
                 JOIN users u ON u.id = cm.user_id
                 WHERE cm.channel_id = ?1 AND cm.rowid > ?2
                 ORDER BY cm.rowid
                 LIMIT ?3",
                (channel_id.to_string(), after, (limit + 1) as i64),
                |row| {
                    let status: String = row.get(2)?;
                    Ok(MemberRow {
                        user_id: uuid_at(row, 0)?,
                        name: row.get(1)?,
                        status: status.parse().map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                2,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?,
                        joined_at: row.get(3)?,
                    })
                },
            )?;
            Ok(Page::from_overfetch(rows, limit, |m| m.user_id))
        })
    }
}

fn insert_member(conn: &Connection, channel_id: Uuid, user_id: Uuid) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO channel_members (channel_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
        (channel_id.to_string(), user_id.to_string(), Utc::now()),
    )
    .map_err(|e| StoreError::from_insert(e, "membership"))?;
    Ok(())
}

fn query_channel(conn: &Connection, id: Uuid) -> StoreResult<Option<ChannelRow>> {
    let sql = format!("SELECT {} FROM channels c WHERE c.id = ?1", ChannelRow::COLUMNS);
    Ok(conn.query_row(&sql, [id.to_string()], ChannelRow::from_row).optional()?)
}
