use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use huddle_db::Database;

/// Background task that hard-deletes old message tombstones.
///
/// Runs on an interval. Tombstones older than `retention` are removed once
/// no reply row points at them anymore; reactions and file rows cascade.
pub async fn run_cleanup_loop(db: Arc<Database>, retention: chrono::Duration, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let cutoff = Utc::now() - retention;
        let db = db.clone();
        match tokio::task::spawn_blocking(move || db.purge_tombstones(cutoff)).await {
            Ok(Ok(count)) => {
                debug!("Cleanup pass done, {} tombstones purged", count);
            }
            Ok(Err(e)) => {
                warn!("Cleanup error: {}", e);
            }
            Err(e) => {
                warn!("Cleanup task failed: {}", e);
            }
        }
    }
}
