use axum::{Extension, Json, extract::State, response::IntoResponse};
use uuid::Uuid;

use huddle_types::api::{Claims, MarkReadRequest, UnreadResponse};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::{AppState, run_db};

/// Move the caller's read pointer. Moving it backward is allowed.
pub async fn mark_read(
    State(state): State<AppState>,
    ApiPath(channel_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = run_db(&state, move |db| {
        let pointer = db.mark_read(claims.sub, channel_id, req.message_id)?;
        let unread_count = db.unread_count(claims.sub, channel_id)?;
        Ok(UnreadResponse {
            channel_id,
            unread_count,
            last_read_message_id: Some(pointer.last_read_message_id),
        })
    })
    .await?;
    Ok(Json(response))
}

pub async fn get_unread(
    State(state): State<AppState>,
    ApiPath(channel_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let response = run_db(&state, move |db| {
        let unread_count = db.unread_count(claims.sub, channel_id)?;
        let pointer = db.read_pointer(claims.sub, channel_id)?;
        Ok(UnreadResponse {
            channel_id,
            unread_count,
            last_read_message_id: pointer.map(|p| p.last_read_message_id),
        })
    })
    .await?;
    Ok(Json(response))
}
