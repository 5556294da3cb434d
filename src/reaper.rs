use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{now_ms, Engine, EngineError};
use crate::limits::DAY_MS;
use crate::model::Ms;

const RETENTION_SWEEP_EVERY: Duration = Duration::from_secs(60);
const COMPACTION_CHECK_EVERY: Duration = Duration::from_secs(30);

/// Drop intervals that ended more than `retention_days` ago, once a minute.
pub async fn run_retention(engine: Arc<Engine>, retention_days: u32) {
    let mut interval = tokio::time::interval(RETENTION_SWEEP_EVERY);
    loop {
        interval.tick().await;
        match sweep_once(&engine, now_ms(), retention_days).await {
            Ok(0) => tracing::debug!("retention sweep: nothing to remove"),
            Ok(n) => info!(removed = n, "retention sweep"),
            Err(e) => tracing::warn!(error = %e, "retention sweep failed"),
        }
    }
}

pub async fn sweep_once(engine: &Engine, now: Ms, retention_days: u32) -> Result<usize, EngineError> {
    let cutoff = now - Ms::from(retention_days) * DAY_MS;
    let removed = engine.remove_ended_before(cutoff).await?;
    metrics::counter!(crate::observability::RETENTION_REMOVED_TOTAL).increment(removed as u64);
    Ok(removed)
}

/// Rewrite the WAL whenever `threshold` events have been appended since the
/// last rewrite.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACTION_CHECK_EVERY);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&engine, threshold).await {
            tracing::warn!(error = %e, "WAL compaction failed");
        }
    }
}

pub async fn compact_if_due(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appended = engine.wal_appends_since_compact().await;
    if appended < threshold {
        return Ok(false);
    }
    tracing::debug!(appended, threshold, "compacting WAL");
    engine.compact_wal().await?;
    metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
    Ok(true)
}
