use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use huddle_types::api::{
    AddMemberRequest, ChannelResponse, ChannelSummary, Claims, CreateChannelRequest, MemberResponse,
};
use huddle_types::pagination::PageQuery;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::{AppState, run_db};

/// The caller's channels, each with its unread count.
pub async fn list_channels(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = run_db(&state, move |db| db.list_user_channels(claims.sub, &page)).await?;
    Ok(Json(rows.map(ChannelSummary::from)))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = run_db(&state, move |db| {
        db.create_channel(claims.sub, &req.name, req.is_private)
    })
    .await?;

    info!("{} created channel #{} ({})", claims.sub, channel.name, channel.id);
    Ok((StatusCode::CREATED, Json(ChannelResponse::from(channel))))
}

/// Public channels anyone may join.
pub async fn browse_channels(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = run_db(&state, move |db| db.browse_channels(&page)).await?;
    Ok(Json(rows.map(ChannelResponse::from)))
}

pub async fn get_channel(
    State(state): State<AppState>,
    ApiPath(channel_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = run_db(&state, move |db| db.get_channel(channel_id, claims.sub)).await?;
    Ok(Json(ChannelResponse::from(channel)))
}

pub async fn join_channel(
    State(state): State<AppState>,
    ApiPath(channel_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = run_db(&state, move |db| db.join_channel(channel_id, claims.sub)).await?;
    Ok(Json(ChannelResponse::from(channel)))
}

/// Leave a channel. The user's live connections are evicted from its room.
pub async fn leave_channel(
    State(state): State<AppState>,
    ApiPath(channel_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    run_db(&state, move |db| db.leave_channel(channel_id, claims.sub)).await?;
    state.dispatcher.evict_user(claims.sub, channel_id).await;

    info!("{} left channel {}", claims.sub, channel_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<AppState>,
    ApiPath(channel_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = run_db(&state, move |db| db.list_members(channel_id, claims.sub, &page)).await?;
    Ok(Json(rows.map(MemberResponse::from)))
}

/// Add another user. Any current member may invite, private channel or not.
pub async fn add_member(
    State(state): State<AppState>,
    ApiPath(channel_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = run_db(&state, move |db| {
        db.add_member(channel_id, claims.sub, req.user_id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(ChannelResponse::from(channel))))
}
