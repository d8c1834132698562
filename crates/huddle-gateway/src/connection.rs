use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use huddle_db::Database;
use huddle_types::events::{GatewayCommand, GatewayEvent};

use crate::auth::{AuthFailure, verify_token};
use crate::dispatcher::{ConnId, Dispatcher};
use crate::presence::PresenceTracker;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Everything a gateway connection needs, shared by all connections.
#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Dispatcher,
    pub presence: PresenceTracker,
    pub db: Arc<Database>,
    pub jwt_secret: Arc<str>,
}

impl GatewayState {
    pub fn new(db: Arc<Database>, jwt_secret: impl Into<Arc<str>>) -> Self {
        Self {
            dispatcher: Dispatcher::new(),
            presence: PresenceTracker::new(db.clone()),
            db,
            jwt_secret: jwt_secret.into(),
        }
    }
}

/// Handle a WebSocket connection. The token is checked once, before any
/// event flows; a bad token closes the socket with a typed reason.
pub async fn handle_connection(mut socket: WebSocket, state: GatewayState, token: Option<String>) {
    let claims = match token
        .as_deref()
        .ok_or(AuthFailure::MissingToken)
        .and_then(|t| verify_token(&state.jwt_secret, t))
    {
        Ok(claims) => claims,
        Err(failure) => {
            warn!("Gateway connection refused: {}", failure);
            let frame = CloseFrame {
                code: AuthFailure::CLOSE_CODE,
                reason: Utf8Bytes::from_static(failure.reason()),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let user_id = claims.sub;
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", claims.email, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        email: claims.email.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    let registration = state.dispatcher.register(user_id).await;
    let conn_id = registration.conn_id;
    let mut conn_rx = registration.rx;

    // Subscribe before announcing ourselves so our own presence event arrives too
    let mut broadcast_rx = state.dispatcher.subscribe();

    // Send existing online users to this client so they see who's already here
    for uid in state.presence.online_users().await {
        let event = GatewayEvent::PresenceChanged {
            user_id: uid,
            status: huddle_types::models::PresenceStatus::Online,
            last_seen: None,
        };
        if send_event(&mut sender, &event).await.is_err() {
            state.dispatcher.unregister(conn_id).await;
            return;
        }
    }

    if let Some(event) = state.presence.connect(user_id).await {
        state.dispatcher.broadcast(event);
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward global broadcasts + targeted/room events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                result = conn_rx.recv() => {
                    let Some(event) = result else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_state, conn_id, user_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        let event = GatewayEvent::Error {
                            code: "invalid_input".into(),
                            message: "malformed command".into(),
                        };
                        recv_state.dispatcher.send_to_connection(conn_id, event).await;
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.dispatcher.unregister(conn_id).await;
    if let Some(event) = state.presence.disconnect(user_id).await {
        state.dispatcher.broadcast(event);
    }
    info!("{} ({}) disconnected from gateway", claims.email, user_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

/// Apply one client command on behalf of connection `conn_id`.
pub async fn handle_command(state: &GatewayState, conn_id: ConnId, user_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::JoinChannel { channel_id } => {
            let reply = match check_member(state, channel_id, user_id).await {
                Ok(true) => enter_room(state, conn_id, user_id, channel_id).await,
                Ok(false) => not_member(channel_id),
                Err(reply) => reply,
            };
            state.dispatcher.send_to_connection(conn_id, reply).await;
        }

        GatewayCommand::LeaveChannel { channel_id } => {
            state.dispatcher.leave_room(conn_id, channel_id).await;
            state
                .dispatcher
                .send_to_connection(conn_id, GatewayEvent::RoomLeft { channel_id })
                .await;
        }

        GatewayCommand::StartTyping { channel_id } => {
            relay_typing(state, conn_id, channel_id, GatewayEvent::TypingStarted { channel_id, user_id }).await;
        }

        GatewayCommand::StopTyping { channel_id } => {
            relay_typing(state, conn_id, channel_id, GatewayEvent::TypingStopped { channel_id, user_id }).await;
        }
    }
}

/// Join the room, then confirm membership again: a REST leave may have
/// committed and evicted since the first check.
async fn enter_room(state: &GatewayState, conn_id: ConnId, user_id: Uuid, channel_id: Uuid) -> GatewayEvent {
    state.dispatcher.join_room(conn_id, channel_id).await;
    match check_member(state, channel_id, user_id).await {
        Ok(true) => {
            debug!("{} joined room {}", user_id, channel_id);
            GatewayEvent::RoomJoined { channel_id }
        }
        Ok(false) => {
            state.dispatcher.leave_room(conn_id, channel_id).await;
            not_member(channel_id)
        }
        Err(reply) => {
            state.dispatcher.leave_room(conn_id, channel_id).await;
            reply
        }
    }
}

/// Membership lookup off the runtime. Failures come back as the error event
/// to send.
async fn check_member(state: &GatewayState, channel_id: Uuid, user_id: Uuid) -> Result<bool, GatewayEvent> {
    let db = state.db.clone();
    let failed = || GatewayEvent::Error {
        code: "internal".into(),
        message: "membership check failed".into(),
    };
    match tokio::task::spawn_blocking(move || db.is_member(channel_id, user_id)).await {
        Ok(Ok(member)) => Ok(member),
        Ok(Err(e)) => {
            warn!("Membership check failed for {}: {}", user_id, e);
            Err(failed())
        }
        Err(e) => {
            warn!("spawn_blocking join error: {}", e);
            Err(failed())
        }
    }
}

fn not_member(channel_id: Uuid) -> GatewayEvent {
    GatewayEvent::Error {
        code: "not_member".into(),
        message: format!("not a member of channel {}", channel_id),
    }
}

/// Typing is best-effort and never persisted. Only connections inside the
/// room may signal it.
async fn relay_typing(state: &GatewayState, conn_id: ConnId, channel_id: Uuid, event: GatewayEvent) {
    if !state.dispatcher.in_room(conn_id, channel_id).await {
        trace!("Typing from {} ignored, not in room {}", conn_id, channel_id);
        return;
    }
    state
        .dispatcher
        .broadcast_to_room(channel_id, event, Some(conn_id))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GatewayState {
        GatewayState::new(Arc::new(Database::open_in_memory().unwrap()), "test-secret")
    }

    #[tokio::test]
    async fn join_requires_membership() {
        let state = state();
        let ada = state.db.create_user("ada@example.com", "hash", "Ada").unwrap();
        let eve = state.db.create_user("eve@example.com", "hash", "Eve").unwrap();
        let channel = state.db.create_channel(ada.id, "eng", false).unwrap();

        let mut member = state.dispatcher.register(ada.id).await;
        let mut outsider = state.dispatcher.register(eve.id).await;

        let join = GatewayCommand::JoinChannel { channel_id: channel.id };
        handle_command(&state, member.conn_id, ada.id, join.clone()).await;
        handle_command(&state, outsider.conn_id, eve.id, join).await;

        assert!(matches!(member.rx.try_recv(), Ok(GatewayEvent::RoomJoined { .. })));
        match outsider.rx.try_recv() {
            Ok(GatewayEvent::Error { code, .. }) => assert_eq!(code, "not_member"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(state.dispatcher.in_room(member.conn_id, channel.id).await);
        assert!(!state.dispatcher.in_room(outsider.conn_id, channel.id).await);
    }

    #[tokio::test]
    async fn room_entry_is_undone_when_membership_is_gone() {
        let state = state();
        let ada = state.db.create_user("ada@example.com", "hash", "Ada").unwrap();
        let bob = state.db.create_user("bob@example.com", "hash", "Bob").unwrap();
        let channel = state.db.create_channel(ada.id, "eng", false).unwrap();
        state.db.join_channel(channel.id, bob.id).unwrap();
        let b = state.dispatcher.register(bob.id).await;

        // Bob passed the first check, then left over REST before entering.
        state.db.leave_channel(channel.id, bob.id).unwrap();
        state.dispatcher.evict_user(bob.id, channel.id).await;

        match enter_room(&state, b.conn_id, bob.id, channel.id).await {
            GatewayEvent::Error { code, .. } => assert_eq!(code, "not_member"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!state.dispatcher.in_room(b.conn_id, channel.id).await);

        let delivered = state
            .dispatcher
            .broadcast_to_room(channel.id, GatewayEvent::TypingStarted { channel_id: channel.id, user_id: ada.id }, None)
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn typing_reaches_other_room_members_only() {
        let state = state();
        let ada = state.db.create_user("ada@example.com", "hash", "Ada").unwrap();
        let bob = state.db.create_user("bob@example.com", "hash", "Bob").unwrap();
        let channel = state.db.create_channel(ada.id, "eng", false).unwrap();
        state.db.join_channel(channel.id, bob.id).unwrap();

        let mut a = state.dispatcher.register(ada.id).await;
        let mut b = state.dispatcher.register(bob.id).await;
        for (conn, user) in [(a.conn_id, ada.id), (b.conn_id, bob.id)] {
            handle_command(&state, conn, user, GatewayCommand::JoinChannel { channel_id: channel.id }).await;
        }
        // Drain the RoomJoined acks.
        a.rx.try_recv().unwrap();
        b.rx.try_recv().unwrap();

        handle_command(&state, a.conn_id, ada.id, GatewayCommand::StartTyping { channel_id: channel.id }).await;
        assert!(a.rx.try_recv().is_err());
        match b.rx.try_recv() {
            Ok(GatewayEvent::TypingStarted { user_id, .. }) => assert_eq!(user_id, ada.id),
            other => panic!("unexpected {:?}", other),
        }

        handle_command(&state, b.conn_id, bob.id, GatewayCommand::LeaveChannel { channel_id: channel.id }).await;
        assert!(matches!(b.rx.try_recv(), Ok(GatewayEvent::RoomLeft { .. })));
        handle_command(&state, a.conn_id, ada.id, GatewayCommand::StopTyping { channel_id: channel.id }).await;
        assert!(b.rx.try_recv().is_err());
    }
}
