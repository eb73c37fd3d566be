use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::engine::{Engine, today};

/// Complete every stay that checked out on or before `today`. Returns how many.
pub async fn sweep_elapsed(engine: &Engine, today: NaiveDate) -> usize {
    match engine.complete_elapsed_bookings(today).await {
        Ok(ids) if ids.is_empty() => {
            debug!("elapsed sweep: nothing due");
            0
        }
        Ok(ids) => {
            info!("elapsed sweep completed {} bookings: {ids:?}", ids.len());
            ids.len()
        }
        Err(e) => {
            warn!("elapsed sweep failed: {e}");
            0
        }
    }
}

/// Background task that periodically completes elapsed stays.
pub async fn run_reaper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        sweep_elapsed(&engine, today()).await;
    }
}

/// Compact the WAL once `threshold` appends have piled up since the last compaction.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that compacts the WAL when it has grown enough.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}
