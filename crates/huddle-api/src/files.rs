use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use huddle_db::queries::files::NewFile;
use huddle_types::api::{Claims, FileResponse, RegisterFileRequest};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::{AppState, run_db};

/// POST /files: record metadata for an object the client already stored.
/// The returned id can be attached to one message via `file_ids`.
pub async fn register_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<RegisterFileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let file = run_db(&state, move |db| {
        db.register_file(
            claims.sub,
            NewFile {
                name: &req.name,
                mime_type: &req.mime_type,
                size: req.size,
                locator: &req.locator,
                url: &req.url,
            },
        )
    })
    .await?;

    info!("{} registered file {} ({} bytes)", claims.sub, file.id, file.size);
    Ok((StatusCode::CREATED, Json(FileResponse::from(file))))
}

/// GET /files/{id}: metadata stays readable after the message is deleted.
pub async fn get_file(
    State(state): State<AppState>,
    ApiPath(file_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let file = run_db(&state, move |db| db.get_file_for(file_id, claims.sub)).await?;
    Ok(Json(FileResponse::from(file)))
}
