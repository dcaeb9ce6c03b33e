//! Expired Entry Sweep
//!
//! The in-process store expires keys lazily, on access. Keys written once and
//! never read again would stay in memory forever, so this task drops expired
//! entries on an interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::TaskHandle;
use crate::store::MemoryStore;

/// Spawns a task that calls [`MemoryStore::cleanup_expired`] every `interval`.
pub fn spawn_cleanup_task(store: Arc<MemoryStore>, interval: Duration) -> TaskHandle {
    TaskHandle::spawn("expired-sweep", move |mut shutdown| async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "Starting expired entry sweep"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let removed = store.cleanup_expired().await;
                    if removed > 0 {
                        info!(removed, "swept expired entries");
                    } else {
                        debug!("sweep: no expired entries");
                    }
                }
            }
        }

        info!("Expired entry sweep stopped");
    })
}
