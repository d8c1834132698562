use chrono::{DateTime, Utc};
use huddle_types::models::PresenceStatus;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::UserRow;
use crate::validate;

impl Database {
    pub fn create_user(&self, email: &str, password_hash: &str, name: &str) -> StoreResult<UserRow> {
        let email = validate::email(email)?;
        let name = validate::display_name(name)?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, name, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'offline', ?5)",
                (id.to_string(), &email, password_hash, &name, now),
            )
            .map_err(|e| StoreError::from_insert(e, "user"))?;

            query_user(conn, id)?.ok_or(StoreError::NotFound("user"))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<Option<UserRow>> {
        let email = email.trim().to_lowercase();
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE email = ?1", UserRow::COLUMNS);
            Ok(conn.query_row(&sql, [email], UserRow::from_row).optional()?)
        })
    }

    pub fn get_user(&self, id: Uuid) -> StoreResult<UserRow> {
        self.with_conn(|conn| query_user(conn, id)?.ok_or(StoreError::NotFound("user")))
    }

    pub fn update_profile(
        &self,
        id: Uuid,
        name: Option<&str>,
        avatar_url: Option<&str>,
        bio: Option<&str>,
    ) -> StoreResult<UserRow> {
        let name = name.map(validate::display_name).transpose()?;
        let avatar_url = avatar_url.map(validate::url).transpose()?;
        let bio = bio.map(validate::bio).transpose()?;

        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET
                    name = COALESCE(?2, name),
                    avatar_url = COALESCE(?3, avatar_url),
                    bio = COALESCE(?4, bio)
                 WHERE id = ?1",
                (id.to_string(), name, avatar_url, bio),
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound("user"));
            }
            query_user(conn, id)?.ok_or(StoreError::NotFound("user"))
        })
    }

    /// Persist a presence change. `last_seen` is left alone when `None`.
    pub fn set_presence(
        &self,
        id: Uuid,
        status: PresenceStatus,
        last_seen: Option<DateTime<Utc>>,
    ) -> StoreResult<UserRow> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET status = ?2, last_seen = COALESCE(?3, last_seen) WHERE id = ?1",
                (id.to_string(), status.as_str(), last_seen),
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound("user"));
            }
            query_user(conn, id)?.ok_or(StoreError::NotFound("user"))
        })
    }
}

fn query_user(conn: &Connection, id: Uuid) -> StoreResult<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", UserRow::COLUMNS);
    Ok(conn.query_row(&sql, [id.to_string()], UserRow::from_row).optional()?)
}
