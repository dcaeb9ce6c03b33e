//! Invalidation Sink
//!
//! Applies invalidation requests arriving on a channel. Producers are the
//! Redis pub/sub bridge and anything else in the process holding a sender.

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::TaskHandle;
use crate::cache::{CacheClient, InvalidationRequest};

/// Spawns a task applying every request received on `requests`.
///
/// The task ends when all senders are dropped or on shutdown.
pub fn spawn_invalidation_sink(
    client: CacheClient,
    mut requests: mpsc::Receiver<InvalidationRequest>,
) -> TaskHandle {
    TaskHandle::spawn("invalidation-sink", move |mut shutdown| async move {
        info!("Starting invalidation sink");

        loop {
            let request = tokio::select! {
                _ = &mut shutdown => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let removed = client.invalidate(&request).await;
            debug!(?request, removed, "invalidation applied");
        }

        info!("Invalidation sink stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SetOptions;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sink_applies_requests_until_senders_drop() {
        let cache = CacheClient::new(Arc::new(MemoryStore::new()), &Config::default());
        cache.set("menu:1", &1, SetOptions::new()).await;
        cache
            .set("menu:2", &2, SetOptions::new().tags(["restaurant:7"]))
            .await;
        cache.set("order:1", &3, SetOptions::new()).await;

        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_invalidation_sink(cache.clone(), rx);

        tx.send(InvalidationRequest::key("menu:1")).await.unwrap();
        tx.send(InvalidationRequest::tags(["restaurant:7"]))
            .await
            .unwrap();
        tx.send(InvalidationRequest::default()).await.unwrap();
        drop(tx);

        // Closing the channel ends the task once the queue is drained.
        while !handle.is_finished() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        handle.shutdown().await;

        assert!(!cache.has("menu:1").await);
        assert!(!cache.has("menu:2").await);
        assert!(cache.has("order:1").await);
    }
}
