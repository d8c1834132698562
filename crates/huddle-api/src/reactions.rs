use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use uuid::Uuid;

use huddle_types::api::{AddReactionRequest, Claims, ReactionAddedResponse, ReactionResponse};
use huddle_types::events::GatewayEvent;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::messages::hydrate_one;
use crate::{AppState, run_db};

/// React to a message. The same user may not add the same emoji twice.
/// Responds with the new reaction and the message's regrouped reactions.
pub async fn add_reaction(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<AddReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (channel_id, reaction, message) = run_db(&state, move |db| {
        let (channel_id, reaction) = db.add_reaction(message_id, claims.sub, &req.emoji)?;
        let row = db.get_message(message_id, claims.sub)?;
        Ok((channel_id, ReactionResponse::from(reaction), hydrate_one(db, row)?))
    })
    .await?;

    state
        .dispatcher
        .broadcast_to_room(
            channel_id,
            GatewayEvent::ReactionAdded {
                channel_id,
                message_id,
                user_id: claims.sub,
                emoji: reaction.emoji.clone(),
            },
            None,
        )
        .await;

    Ok((StatusCode::CREATED, Json(ReactionAddedResponse { reaction, message })))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    ApiPath((message_id, emoji)): ApiPath<(Uuid, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = emoji.clone();
    let channel_id = run_db(&state, move |db| {
        db.remove_reaction(message_id, claims.sub, &removed)
    })
    .await?;

    state
        .dispatcher
        .broadcast_to_room(
            channel_id,
            GatewayEvent::ReactionRemoved {
                channel_id,
                message_id,
                user_id: claims.sub,
                emoji,
            },
            None,
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// A single reaction by id. Stays readable after its message is deleted,
/// until the tombstone is purged.
pub async fn get_reaction(
    State(state): State<AppState>,
    ApiPath(reaction_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let reaction = run_db(&state, move |db| db.get_reaction(reaction_id, claims.sub)).await?;
    Ok(Json(ReactionResponse::from(reaction)))
}
