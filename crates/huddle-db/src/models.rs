//! Database row types. These map directly to SQLite rows.
//! Distinct from huddle-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};
use huddle_types::api::{
    ChannelResponse, ChannelSummary, DirectMessageResponse, FileResponse, MemberResponse,
    PublicUserResponse, ReactionResponse, UserResponse,
};
use huddle_types::models::PresenceStatus;
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw.parse().map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        }),
        None => Ok(None),
    }
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub status: PresenceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub(crate) const COLUMNS: &'static str =
        "id, email, password, name, avatar_url, bio, status, last_seen, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(6)?;
        Ok(Self {
            id: uuid_at(row, 0)?,
            email: row.get(1)?,
            password: row.get(2)?,
            name: row.get(3)?,
            avatar_url: row.get(4)?,
            bio: row.get(5)?,
            status: status.parse().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e))
            })?,
            last_seen: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChannelRow {
    pub id: Uuid,
    pub name: String,
    pub is_private: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub member_count: u64,
}

impl ChannelRow {
    pub(crate) const COLUMNS: &'static str = "c.id, c.name, c.is_private, c.created_by, c.created_at,
         (SELECT COUNT(*) FROM channel_members cm2 WHERE cm2.channel_id = c.id)";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            name: row.get(1)?,
            is_private: row.get(2)?,
            created_by: uuid_at(row, 3)?,
            created_at: row.get(4)?,
            member_count: row.get::<_, i64>(5)? as u64,
        })
    }
}

/// A channel as seen by one member, with its unread count.
#[derive(Debug, Clone)]
pub struct ChannelUnreadRow {
    pub channel: ChannelRow,
    pub unread_count: u64,
}

#[derive(Debug, Clone)]
pub struct MemberRow {
    pub user_id: Uuid,
    pub name: String,
    pub status: PresenceStatus,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub seq: i64,
    pub id: Uuid,
    pub channel_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub content: String,
    pub thread_id: Option<Uuid>,
    pub reply_count: u64,
    pub pinned_by: Option<Uuid>,
    pub pinned_at: Option<DateTime<Utc>>,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    /// Selects from `live_messages m`; the reply count only sees live replies.
    pub(crate) const COLUMNS: &'static str = "m.seq, m.id, m.channel_id, m.author_id, u.name, m.content, m.thread_id,
         (SELECT COUNT(*) FROM live_messages r WHERE r.thread_id = m.id),
         m.pinned_by, m.pinned_at, m.edited_at, m.created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: uuid_at(row, 1)?,
            channel_id: uuid_at(row, 2)?,
            author_id: uuid_at(row, 3)?,
            author_name: row
                .get::<_, Option<String>>(4)?
                .unwrap_or_else(|| "unknown".to_string()),
            content: row.get(5)?,
            thread_id: opt_uuid_at(row, 6)?,
            reply_count: row.get::<_, i64>(7)? as u64,
            pinned_by: opt_uuid_at(row, 8)?,
            pinned_at: row.get(9)?,
            edited_at: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    pub fn is_reply(&self) -> bool {
        self.thread_id.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: Uuid,
    pub uploader_id: Uuid,
    pub message_id: Option<Uuid>,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub locator: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl FileRow {
    pub(crate) const COLUMNS: &'static str =
        "id, uploader_id, message_id, name, mime_type, size, locator, url, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            uploader_id: uuid_at(row, 1)?,
            message_id: opt_uuid_at(row, 2)?,
            name: row.get(3)?,
            mime_type: row.get(4)?,
            size: row.get::<_, i64>(5)? as u64,
            locator: row.get(6)?,
            url: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChannelReadRow {
    pub user_id: Uuid,
    pub channel_id: Uuid,
    pub last_read_message_id: Uuid,
    pub last_read_seq: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DirectMessageRow {
    pub seq: i64,
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DirectMessageRow {
    pub(crate) const COLUMNS: &'static str =
        "seq, id, sender_id, recipient_id, content, read_at, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: uuid_at(row, 1)?,
            sender_id: uuid_at(row, 2)?,
            recipient_id: uuid_at(row, 3)?,
            content: row.get(4)?,
            read_at: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

// -- API conversions --

impl From<UserRow> for UserResponse {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            avatar_url: row.avatar_url,
            bio: row.bio,
            status: row.status,
            last_seen: row.last_seen,
            created_at: row.created_at,
        }
    }
}

impl From<UserRow> for PublicUserResponse {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            avatar_url: row.avatar_url,
            bio: row.bio,
            status: row.status,
            last_seen: row.last_seen,
            created_at: row.created_at,
        }
    }
}

impl From<ReactionRow> for ReactionResponse {
    fn from(row: ReactionRow) -> Self {
        Self {
            id: row.id,
            message_id: row.message_id,
            user_id: row.user_id,
            emoji: row.emoji,
            created_at: row.created_at,
        }
    }
}

impl From<ChannelRow> for ChannelResponse {
    fn from(row: ChannelRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            is_private: row.is_private,
            created_by: row.created_by,
            created_at: row.created_at,
            member_count: row.member_count,
        }
    }
}

impl From<ChannelUnreadRow> for ChannelSummary {
    fn from(row: ChannelUnreadRow) -> Self {
        Self {
            channel: row.channel.into(),
            unread_count: row.unread_count,
        }
    }
}

impl From<MemberRow> for MemberResponse {
    fn from(row: MemberRow) -> Self {
        Self {
            user_id: row.user_id,
            name: row.name,
            status: row.status,
            joined_at: row.joined_at,
        }
    }
}

impl From<FileRow> for FileResponse {
    fn from(row: FileRow) -> Self {
        Self {
            id: row.id,
            uploader_id: row.uploader_id,
            message_id: row.message_id,
            name: row.name,
            mime_type: row.mime_type,
            size: row.size,
            locator: row.locator,
            url: row.url,
            created_at: row.created_at,
        }
    }
}

impl From<DirectMessageRow> for DirectMessageResponse {
    fn from(row: DirectMessageRow) -> Self {
        Self {
            id: row.id,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            content: row.content,
            read_at: row.read_at,
            created_at: row.created_at,
        }
    }
}
