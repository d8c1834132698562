use chrono::Utc;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{ReactionRow, uuid_at};
use crate::queries::{
    collect_rows, message_channel, placeholders, require_live_message, require_member,
};
use crate::validate;

const REACTION_COLUMNS: &str = "id, message_id, user_id, emoji, created_at";

fn reaction_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        id: uuid_at(row, 0)?,
        message_id: uuid_at(row, 1)?,
        user_id: uuid_at(row, 2)?,
        emoji: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl Database {
    /// React to a live message. The (message, user, emoji) triple is unique,
    /// so a repeat fails with `AlreadyExists`. Returns the message's channel
    /// alongside the new row.
    pub fn add_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> StoreResult<(Uuid, ReactionRow)> {
        let emoji = validate::emoji(emoji)?;
        let id = Uuid::new_v4();

        self.with_conn(|conn| {
            let message = require_live_message(conn, message_id)?;
            require_member(conn, message.channel_id, user_id)?;

            conn.execute(
                "INSERT INTO reactions (id, message_id, user_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    id.to_string(),
                    message_id.to_string(),
                    user_id.to_string(),
                    &emoji,
                    Utc::now(),
                ),
            )
            .map_err(|e| StoreError::from_insert(e, "reaction"))?;

            let sql = format!("SELECT {} FROM reactions WHERE id = ?1", REACTION_COLUMNS);
            let row = conn.query_row(&sql, [id.to_string()], reaction_from_row)?;
            Ok((message.channel_id, row))
        })
    }

    /// Remove the caller's own reaction. Returns the message's channel.
    pub fn remove_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> StoreResult<Uuid> {
        self.with_conn(|conn| {
            let message = require_live_message(conn, message_id)?;
            require_member(conn, message.channel_id, user_id)?;

            let removed = conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                (message_id.to_string(), user_id.to_string(), emoji.trim()),
            )?;
            if removed == 0 {
                return Err(StoreError::NotFound("reaction"));
            }
            Ok(message.channel_id)
        })
    }

    /// Reaction by id, whether or not its message has been tombstoned.
    /// Visible to members of the message's channel.
    pub fn get_reaction(&self, id: Uuid, viewer: Uuid) -> StoreResult<ReactionRow> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM reactions WHERE id = ?1", REACTION_COLUMNS);
            let row = conn
                .query_row(&sql, [id.to_string()], reaction_from_row)
                .optional()?
                .ok_or(StoreError::NotFound("reaction"))?;
            require_member(conn, message_channel(conn, row.message_id)?, viewer)?;
            Ok(row)
        })
    }

    /// Batch-fetch reactions for a set of message IDs.
    pub fn get_reactions_for_messages(&self, message_ids: &[Uuid]) -> StoreResult<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM reactions WHERE message_id IN ({}) ORDER BY created_at, rowid",
                REACTION_COLUMNS,
                placeholders(message_ids.len())
            );
            let ids: Vec<String> = message_ids.iter().map(Uuid::to_string).collect();
            collect_rows(
                conn,
                &sql,
                rusqlite::params_from_iter(ids.iter()),
                reaction_from_row,
            )
        })
    }
}
