use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use huddle_types::api::{
    Claims, PublicUserResponse, UpdateProfileRequest, UpdateStatusRequest, UserResponse,
};
use huddle_types::events::GatewayEvent;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::{AppState, run_db};

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_db(&state, move |db| db.get_user(claims.sub)).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Another user's public profile, without the email address.
pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_db(&state, move |db| db.get_user(user_id)).await?;
    Ok(Json(PublicUserResponse::from(user)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_db(&state, move |db| {
        db.update_profile(
            claims.sub,
            req.name.as_deref(),
            req.avatar_url.as_deref(),
            req.bio.as_deref(),
        )
    })
    .await?;
    Ok(Json(UserResponse::from(user)))
}

/// Set an explicit status (away, busy, ...). Connection-driven presence will
/// overwrite it on the next first-connect or last-disconnect.
pub async fn set_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status = req.status;
    let user = run_db(&state, move |db| db.set_presence(claims.sub, status, None)).await?;

    info!("{} set status to {}", user.id, user.status);
    state.dispatcher.broadcast(GatewayEvent::PresenceChanged {
        user_id: user.id,
        status: user.status,
        last_seen: user.last_seen,
    });

    Ok(Json(UserResponse::from(user)))
}
