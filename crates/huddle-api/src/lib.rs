pub mod auth;
pub mod channels;
pub mod direct;
pub mod error;
pub mod extract;
pub mod files;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod reads;
pub mod users;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use tracing::error;

use huddle_db::{Database, StoreResult};
use huddle_gateway::connection::GatewayState;
use huddle_gateway::dispatcher::Dispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: Arc<str>,
    pub token_ttl: chrono::Duration,
    pub dispatcher: Dispatcher,
}

impl AppStateInner {
    /// REST state sharing the gateway's database, secret and fan-out.
    pub fn new(gateway: &GatewayState, token_ttl: chrono::Duration) -> AppState {
        Arc::new(Self {
            db: gateway.db.clone(),
            jwt_secret: gateway.jwt_secret.clone(),
            token_ttl,
            dispatcher: gateway.dispatcher.clone(),
        })
    }
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    let result = tokio::task::spawn_blocking(move || f(&db)).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })?;
    Ok(result?)
}

/// Every REST route. `/auth/*` is public, the rest sits behind `require_auth`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/users/me", get(users::me).patch(users::update_me))
        .route("/users/me/status", put(users::set_status))
        .route("/users/{user_id}", get(users::get_user))
        .route("/channels", get(channels::list_channels).post(channels::create_channel))
        .route("/channels/browse", get(channels::browse_channels))
        .route("/channels/{channel_id}", get(channels::get_channel))
        .route("/channels/{channel_id}/join", post(channels::join_channel))
        .route("/channels/{channel_id}/leave", post(channels::leave_channel))
        .route(
            "/channels/{channel_id}/members",
            get(channels::list_members).post(channels::add_member),
        )
        .route("/channels/{channel_id}/read", post(reads::mark_read))
        .route("/channels/{channel_id}/unread", get(reads::get_unread))
        .route(
            "/channels/{channel_id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/channels/{channel_id}/pins", get(messages::list_pins))
        .route(
            "/messages/{message_id}",
            get(messages::get_message)
                .patch(messages::edit_message)
                .delete(messages::delete_message),
        )
        .route("/messages/{message_id}/thread", get(messages::get_thread))
        .route("/messages/{message_id}/replies", post(messages::send_reply))
        .route(
            "/messages/{message_id}/pin",
            post(messages::pin_message).delete(messages::unpin_message),
        )
        .route("/messages/{message_id}/reactions", post(reactions::add_reaction))
        .route(
            "/messages/{message_id}/reactions/{emoji}",
            delete(reactions::remove_reaction),
        )
        .route("/reactions/{reaction_id}", get(reactions::get_reaction))
        .route("/files", post(files::register_file))
        .route("/files/{file_id}", get(files::get_file))
        .route(
            "/dms/{user_id}",
            get(direct::list_conversation).post(direct::send_direct_message),
        )
        .route("/dms/{user_id}/read", post(direct::mark_conversation_read))
        .route("/dms/{user_id}/unread", get(direct::get_direct_unread))
        .route("/dms/messages/{dm_id}", delete(direct::delete_direct_message))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
