//! TTL Cleanup Task
//!
//! Background task that periodically reaps expired cache entries.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::error::CacheError;

/// Handle to a running cleanup task.
///
/// Dropping the handle also stops the task at its next wake-up.
#[derive(Debug)]
pub struct CleanupHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CleanupHandle {
    /// Signals the task to stop and waits until it has exited.
    ///
    /// A sweep already in progress runs to completion first.
    pub async fn shutdown(self) {
        // Err only means the task already exited
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!("TTL cleanup task ended abnormally: {}", e);
        }
        info!("TTL cleanup task stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Spawns a background task that periodically cleans up expired cache entries.
///
/// Each run calls [`Cache::delete_expired`] on the blocking pool, taking the
/// same lock as every other cache operation. The task exits when shut down
/// through its handle or once the cache has been closed.
///
/// # Arguments
/// * `cache` - Handle to the cache to sweep
/// * `interval` - Time between cleanup runs
///
/// # Example
/// ```ignore
/// let cache = Cache::new();
/// let cleanup = spawn_cleanup_task(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// cleanup.shutdown().await;
/// ```
pub fn spawn_cleanup_task(cache: Cache, interval: Duration) -> CleanupHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        info!("Starting TTL cleanup task with interval of {:?}", interval);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_rx.changed() => break,
            }

            let sweep = cache.clone();
            match tokio::task::spawn_blocking(move || sweep.delete_expired()).await {
                Ok(Ok(0)) => debug!("TTL cleanup: no expired entries found"),
                Ok(Ok(removed)) => info!("TTL cleanup: removed {} expired entries", removed),
                Ok(Err(CacheError::Closed)) => {
                    info!("Cache closed, stopping TTL cleanup task");
                    break;
                }
                Ok(Err(e)) => warn!("TTL cleanup failed: {}", e),
                Err(e) => {
                    warn!("TTL cleanup sweep panicked: {}", e);
                    break;
                }
            }
        }
    });

    CleanupHandle { shutdown, handle }
}
