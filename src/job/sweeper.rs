// Reclaims finished jobs whose client never came back for the file.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::JobStore;

/// Remove terminal jobs idle for at least `ttl`, deleting their work dirs.
pub fn sweep_once(store: &JobStore, ttl: Duration) -> usize {
    let expired = store.expired(ttl);
    let mut removed = 0;
    for id in expired {
        if let Some(job) = store.remove(&id) {
            debug!("sweeping abandoned job {} ({})", id, job.record.state);
            job.dispose();
            removed += 1;
        }
    }
    if removed > 0 {
        info!("swept {} abandoned jobs", removed);
    }
    removed
}

pub fn spawn_sweeper(
    store: Arc<JobStore>,
    ttl: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("sweeper stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let store = Arc::clone(&store);
                    if let Err(e) = tokio::task::spawn_blocking(move || sweep_once(&store, ttl)).await {
                        warn!("sweep failed: {}", e);
                    }
                }
            }
        }
    })
}
