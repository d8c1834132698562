use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use huddle_db::Database;
use huddle_types::events::GatewayEvent;
use huddle_types::models::PresenceStatus;

/// Reference-counted presence. A user is online while at least one gateway
/// connection is open and goes offline only when the last one closes.
///
/// Transitions are persisted while the count lock is held, so the stored
/// status always agrees with the count even under connect/disconnect races.
#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    db: Arc<Database>,
    /// user_id -> open connections
    counts: Mutex<HashMap<Uuid, usize>>,
}

impl PresenceTracker {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            inner: Arc::new(PresenceInner {
                db,
                counts: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Count a new connection. Returns the `PresenceChanged` event to
    /// broadcast when this was the user's first one.
    pub async fn connect(&self, user_id: Uuid) -> Option<GatewayEvent> {
        let mut counts = self.inner.counts.lock().await;
        let count = counts.entry(user_id).or_insert(0);
        *count += 1;
        if *count > 1 {
            return None;
        }

        self.persist(user_id, PresenceStatus::Online, None).await;
        info!("{} is online", user_id);
        Some(GatewayEvent::PresenceChanged {
            user_id,
            status: PresenceStatus::Online,
            last_seen: None,
        })
    }

    /// Count a closed connection. Returns the `PresenceChanged` event to
    /// broadcast when it was the user's last one.
    pub async fn disconnect(&self, user_id: Uuid) -> Option<GatewayEvent> {
        let mut counts = self.inner.counts.lock().await;
        let count = counts.get_mut(&user_id)?;
        *count -= 1;
        if *count > 0 {
            return None;
        }
        counts.remove(&user_id);

        let now = Utc::now();
        self.persist(user_id, PresenceStatus::Offline, Some(now)).await;
        info!("{} is offline", user_id);
        Some(GatewayEvent::PresenceChanged {
            user_id,
            status: PresenceStatus::Offline,
            last_seen: Some(now),
        })
    }

    #[cfg(test)]
    pub(crate) async fn connections_of(&self, user_id: Uuid) -> usize {
        self.inner.counts.lock().await.get(&user_id).copied().unwrap_or(0)
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.counts.lock().await.keys().copied().collect()
    }

    async fn persist(&self, user_id: Uuid, status: PresenceStatus, last_seen: Option<DateTime<Utc>>) {
        let db = self.inner.db.clone();
        let result =
            tokio::task::spawn_blocking(move || db.set_presence(user_id, status, last_seen)).await;
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Failed to persist presence for {}: {}", user_id, e),
            Err(e) => error!("spawn_blocking join error: {}", e),
        }
    }
}
