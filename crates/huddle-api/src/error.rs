use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use huddle_db::StoreError;
use huddle_types::api::ErrorBody;

/// Errors returned by REST handlers. Each kind has its own status code and a
/// stable machine-readable `error` code in the JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not a member of this channel")]
    NotMember,

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    #[error("replies cannot be replied to")]
    NestedThread,

    #[error("authentication required")]
    Unauthorized,

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotMember | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NestedThread => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotMember => "not_member",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::InvalidInput(_) => "invalid_input",
            Self::NestedThread => "nested_thread",
            Self::Unauthorized => "unauthorized",
            Self::Internal => "internal",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotMember => Self::NotMember,
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Forbidden(why) => Self::Forbidden(why),
            StoreError::AlreadyExists(what) => Self::AlreadyExists(what),
            StoreError::InvalidInput(msg) => Self::InvalidInput(msg),
            StoreError::NestedThread => Self::NestedThread,
            StoreError::Sqlite(e) => {
                error!("Database error: {}", e);
                Self::Internal
            }
            StoreError::Internal(msg) => {
                error!("Store error: {}", msg);
                Self::Internal
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
