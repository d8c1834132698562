use std::collections::HashMap;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use huddle_db::models::MessageRow;
use huddle_db::{Database, StoreError, StoreResult};
use huddle_types::api::{
    Claims, EditMessageRequest, FileResponse, MessageResponse, ReactionGroup, SendMessageRequest,
    ThreadResponse,
};
use huddle_types::events::GatewayEvent;
use huddle_types::pagination::{Page, PageQuery};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::{AppState, run_db};

/// Attach grouped reactions and files to message rows, preserving order.
pub(crate) fn hydrate(db: &Database, rows: Vec<MessageRow>) -> StoreResult<Vec<MessageResponse>> {
    let message_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let reaction_rows = db.get_reactions_for_messages(&message_ids)?;
    let file_rows = db.get_files_for_messages(&message_ids)?;

    // Group reactions by message_id -> emoji, keeping first-use order
    let mut reaction_map: HashMap<Uuid, Vec<ReactionGroup>> = HashMap::new();
    for r in reaction_rows {
        let groups = reaction_map.entry(r.message_id).or_default();
        match groups.iter_mut().find(|g| g.emoji == r.emoji) {
            Some(group) => {
                group.count += 1;
                group.user_ids.push(r.user_id);
            }
            None => groups.push(ReactionGroup {
                emoji: r.emoji,
                count: 1,
                user_ids: vec![r.user_id],
            }),
        }
    }

    let mut file_map: HashMap<Uuid, Vec<FileResponse>> = HashMap::new();
    for f in file_rows {
        if let Some(message_id) = f.message_id {
            file_map.entry(message_id).or_default().push(f.into());
        }
    }

    Ok(rows
        .into_iter()
        .map(|row| MessageResponse {
            reactions: reaction_map.remove(&row.id).unwrap_or_default(),
            files: file_map.remove(&row.id).unwrap_or_default(),
            id: row.id,
            channel_id: row.channel_id,
            author_id: row.author_id,
            author_name: row.author_name,
            content: row.content,
            thread_id: row.thread_id,
            reply_count: row.reply_count,
            pinned_by: row.pinned_by,
            pinned_at: row.pinned_at,
            edited_at: row.edited_at,
            created_at: row.created_at,
        })
        .collect())
}

pub(crate) fn hydrate_one(db: &Database, row: MessageRow) -> StoreResult<MessageResponse> {
    hydrate(db, vec![row])?
        .pop()
        .ok_or_else(|| StoreError::Internal("hydrate dropped a message".into()))
}

fn hydrate_page(db: &Database, page: Page<MessageRow>) -> StoreResult<Page<MessageResponse>> {
    let Page {
        items,
        has_more,
        next_cursor,
    } = page;
    Ok(Page {
        items: hydrate(db, items)?,
        has_more,
        next_cursor,
    })
}

/// Fresh view of a thread parent after its reply set changed. A parent that
/// was deleted in the meantime has nothing left to update. Not gated on the
/// caller: an author who has left may still delete their reply.
fn refreshed_parent(db: &Database, parent_id: Uuid) -> StoreResult<Option<MessageResponse>> {
    db.get_live_message(parent_id)?
        .map(|row| hydrate_one(db, row))
        .transpose()
}

async fn publish(state: &AppState, event: GatewayEvent) {
    if let Some(channel_id) = event.channel_id() {
        state.dispatcher.broadcast_to_room(channel_id, event, None).await;
    }
}

/// Top-level messages, newest first. Fetching the newest page marks the
/// channel as read up to its newest message.
pub async fn list_messages(
    State(state): State<AppState>,
    ApiPath(channel_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = run_db(&state, move |db| {
        let rows = db.list_channel_messages(channel_id, claims.sub, &page)?;
        hydrate_page(db, rows)
    })
    .await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    ApiPath(channel_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_db(&state, move |db| {
        let row = db.create_message(channel_id, claims.sub, &req.content, &req.file_ids)?;
        hydrate_one(db, row)
    })
    .await?;

    publish(&state, GatewayEvent::MessageCreated { message: message.clone() }).await;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_message(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_db(&state, move |db| {
        let row = db.get_message(message_id, claims.sub)?;
        hydrate_one(db, row)
    })
    .await?;
    Ok(Json(message))
}

pub async fn edit_message(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<EditMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_db(&state, move |db| {
        let row = db.edit_message(message_id, claims.sub, &req.content)?;
        hydrate_one(db, row)
    })
    .await?;

    publish(&state, GatewayEvent::MessageUpdated { message: message.clone() }).await;
    Ok(Json(message))
}

/// Soft delete. Deleting a reply also republishes its parent, whose reply
/// count just dropped.
pub async fn delete_message(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (deleted, parent) = run_db(&state, move |db| {
        let row = db.delete_message(message_id, claims.sub)?;
        let parent = match row.thread_id {
            Some(parent_id) => refreshed_parent(db, parent_id)?,
            None => None,
        };
        Ok((row, parent))
    })
    .await?;

    info!("{} deleted message {}", claims.sub, deleted.id);
    publish(
        &state,
        GatewayEvent::MessageDeleted {
            id: deleted.id,
            channel_id: deleted.channel_id,
            thread_id: deleted.thread_id,
        },
    )
    .await;
    if let Some(parent) = parent {
        publish(&state, GatewayEvent::MessageUpdated { message: parent }).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// A thread parent and a page of its replies, oldest first.
pub async fn get_thread(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let thread = run_db(&state, move |db| {
        let (parent, replies) = db.list_thread(message_id, claims.sub, &page)?;
        Ok(ThreadResponse {
            parent: hydrate_one(db, parent)?,
            replies: hydrate_page(db, replies)?,
        })
    })
    .await?;
    Ok(Json(thread))
}

pub async fn send_reply(
    State(state): State<AppState>,
    ApiPath(parent_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (reply, parent) = run_db(&state, move |db| {
        let row = db.create_reply(parent_id, claims.sub, &req.content, &req.file_ids)?;
        let reply = hydrate_one(db, row)?;
        let parent = refreshed_parent(db, parent_id)?;
        Ok((reply, parent))
    })
    .await?;

    publish(&state, GatewayEvent::MessageCreated { message: reply.clone() }).await;
    if let Some(parent) = parent {
        publish(&state, GatewayEvent::MessageUpdated { message: parent }).await;
    }
    Ok((StatusCode::CREATED, Json(reply)))
}

pub async fn pin_message(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_db(&state, move |db| {
        let row = db.pin_message(message_id, claims.sub)?;
        hydrate_one(db, row)
    })
    .await?;

    publish(&state, GatewayEvent::MessageUpdated { message: message.clone() }).await;
    Ok(Json(message))
}

pub async fn unpin_message(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_db(&state, move |db| {
        let row = db.unpin_message(message_id, claims.sub)?;
        hydrate_one(db, row)
    })
    .await?;

    publish(&state, GatewayEvent::MessageUpdated { message: message.clone() }).await;
    Ok(Json(message))
}

pub async fn list_pins(
    State(state): State<AppState>,
    ApiPath(channel_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pins = run_db(&state, move |db| {
        let rows = db.list_pinned(channel_id, claims.sub, &page)?;
        hydrate_page(db, rows)
    })
    .await?;
    Ok(Json(pins))
}
