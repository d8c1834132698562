use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::FileRow;
use crate::queries::{collect_rows, message_channel, placeholders, require_member};
use crate::validate;

/// Attachment metadata as supplied by the uploader.
#[derive(Debug, Clone)]
pub struct NewFile<'a> {
    pub name: &'a str,
    pub mime_type: &'a str,
    pub size: u64,
    pub locator: &'a str,
    pub url: &'a str,
}

impl Database {
    pub fn register_file(&self, uploader_id: Uuid, file: NewFile<'_>) -> StoreResult<FileRow> {
        let name = file.name.trim();
        if name.is_empty() || name.len() > 255 {
            return Err(StoreError::invalid("file name must be 1-255 bytes"));
        }
        if file.mime_type.trim().is_empty() || !file.mime_type.contains('/') {
            return Err(StoreError::invalid("invalid mime type"));
        }
        let size = validate::file_size(file.size)?;
        let locator = file.locator.trim();
        if locator.is_empty() {
            return Err(StoreError::invalid("locator must not be empty"));
        }
        let url = validate::url(file.url)?;
        let id = Uuid::new_v4();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (id, uploader_id, name, mime_type, size, locator, url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                (
                    id.to_string(),
                    uploader_id.to_string(),
                    name,
                    file.mime_type.trim(),
                    size,
                    locator,
                    &url,
                    Utc::now(),
                ),
            )?;
            query_file(conn, id)?.ok_or(StoreError::NotFound("file"))
        })
    }

    /// File metadata as seen by `viewer`: the uploader always, channel
    /// members once it is attached. Unattached files of other users read as
    /// missing. Still served after the owning message was tombstoned.
    pub fn get_file_for(&self, id: Uuid, viewer: Uuid) -> StoreResult<FileRow> {
        self.with_conn(|conn| {
            let file = query_file(conn, id)?.ok_or(StoreError::NotFound("file"))?;
            if file.uploader_id == viewer {
                return Ok(file);
            }
            let Some(message_id) = file.message_id else {
                return Err(StoreError::NotFound("file"));
            };
            require_member(conn, message_channel(conn, message_id)?, viewer)?;
            Ok(file)
        })
    }

    /// Batch-fetch attachments for a set of message IDs.
    pub fn get_files_for_messages(&self, message_ids: &[Uuid]) -> StoreResult<Vec<FileRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM files WHERE message_id IN ({}) ORDER BY rowid",
                FileRow::COLUMNS,
                placeholders(message_ids.len())
            );
            let ids: Vec<String> = message_ids.iter().map(Uuid::to_string).collect();
            collect_rows(
                conn,
                &sql,
                rusqlite::params_from_iter(ids.iter()),
                FileRow::from_row,
            )
        })
    }
}

/// One-shot association of uploaded files with a freshly inserted message.
pub(crate) fn attach_files(
    conn: &Connection,
    message_id: Uuid,
    uploader_id: Uuid,
    file_ids: &[Uuid],
) -> StoreResult<()> {
    for file_id in file_ids {
        let file = query_file(conn, *file_id)?.ok_or(StoreError::NotFound("file"))?;
        if file.uploader_id != uploader_id {
            return Err(StoreError::Forbidden("files can only be attached by their uploader"));
        }
        if file.message_id.is_some() {
            return Err(StoreError::AlreadyExists("file attachment"));
        }
        conn.execute(
            "UPDATE files SET message_id = ?2 WHERE id = ?1 AND message_id IS NULL",
            (file_id.to_string(), message_id.to_string()),
        )?;
    }
    Ok(())
}

fn query_file(conn: &Connection, id: Uuid) -> StoreResult<Option<FileRow>> {
    let sql = format!("SELECT {} FROM files WHERE id = ?1", FileRow::COLUMNS);
    Ok(conn.query_row(&sql, [id.to_string()], FileRow::from_row).optional()?)
}
