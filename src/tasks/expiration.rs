//! Expiration Sweep Task
//!
//! Background task that periodically applies every partition's expiration
//! policy, so idle partitions shrink even when no request touches them.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns a background task that expires stale and overflowing entries in
/// every partition.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_expiration_task(store.clone(), 30);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_expiration_task(store: CacheStore, sweep_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(sweep_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiration sweep with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = store.expire_all().await;
            if removed > 0 {
                info!("Expiration sweep: removed {} entries", removed);
            } else {
                debug!("Expiration sweep: nothing to remove");
            }
        }
    })
}
