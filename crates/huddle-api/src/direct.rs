use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use uuid::Uuid;

use huddle_types::api::{
    Claims, DirectMessageResponse, DirectReadResponse, DirectUnreadResponse, SendDirectMessageRequest,
};
use huddle_types::events::GatewayEvent;
use huddle_types::pagination::PageQuery;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::{AppState, run_db};

pub async fn list_conversation(
    State(state): State<AppState>,
    ApiPath(other_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = run_db(&state, move |db| db.list_conversation(claims.sub, other_id, &page)).await?;
    Ok(Json(rows.map(DirectMessageResponse::from)))
}

/// Delivered live to every connection of both participants.
pub async fn send_direct_message(
    State(state): State<AppState>,
    ApiPath(recipient_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendDirectMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = run_db(&state, move |db| {
        db.send_direct_message(claims.sub, recipient_id, &req.content)
    })
    .await?;
    let message = DirectMessageResponse::from(row);

    let event = GatewayEvent::DirectMessageCreated { message: message.clone() };
    state.dispatcher.send_to_user(recipient_id, event.clone()).await;
    if recipient_id != claims.sub {
        state.dispatcher.send_to_user(claims.sub, event).await;
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// Mark everything `other_id` sent the caller as read.
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    ApiPath(other_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let marked = run_db(&state, move |db| db.mark_conversation_read(claims.sub, other_id)).await?;
    Ok(Json(DirectReadResponse { marked }))
}

/// How many live messages from `other_id` the caller has not read yet.
pub async fn get_direct_unread(
    State(state): State<AppState>,
    ApiPath(other_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let unread_count = run_db(&state, move |db| db.unread_direct_count(claims.sub, other_id)).await?;
    Ok(Json(DirectUnreadResponse {
        user_id: other_id,
        unread_count,
    }))
}

pub async fn delete_direct_message(
    State(state): State<AppState>,
    ApiPath(dm_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    run_db(&state, move |db| db.delete_direct_message(dm_id, claims.sub)).await?;
    Ok(StatusCode::NO_CONTENT)
}
