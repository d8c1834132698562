use rusqlite::ErrorCode;
use thiserror::Error;

/// Failures surfaced by store operations. Every variant except `Sqlite` and
/// `Internal` is a recoverable condition the caller can act on.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not a member of this channel")]
    NotMember,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("replies cannot be replied to")]
    NestedThread,

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Map a UNIQUE / PRIMARY KEY violation to `AlreadyExists(what)`.
    /// Anything else stays a database error.
    pub fn from_insert(err: rusqlite::Error, what: &'static str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == ErrorCode::ConstraintViolation
                    && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
            {
                Self::AlreadyExists(what)
            }
            _ => Self::Sqlite(err),
        }
    }
}
