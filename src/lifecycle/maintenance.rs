//! Background maintenance sweep.
//!
//! Runs every `maintenance.interval_secs` until shutdown, then writes one
//! last snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::{CrmError, CrmResult};
use crate::model::now_millis;
use crate::services::Crm;
use crate::store::Store;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub sessions_purged: usize,
    pub cache_entries_purged: usize,
    pub quotes_expired: usize,
    pub rooms_pruned: usize,
    /// Generation written to disk, when a snapshot was flushed.
    pub snapshot_generation: Option<u64>,
}

/// Write a snapshot on the blocking pool if the store changed since the last
/// one.
pub async fn flush_snapshot(store: Arc<Store>, path: &Path) -> CrmResult<Option<u64>> {
    if !store.is_dirty() {
        return Ok(None);
    }
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || store.save_snapshot(&path))
        .await
        .map_err(|e| CrmError::Internal(format!("snapshot task failed: {e}")))?
        .map(Some)
}

pub struct Maintenance {
    crm: Crm,
    snapshot_path: Option<PathBuf>,
}

impl Maintenance {
    pub fn new(crm: Crm) -> Self {
        let snapshot_path = crm
            .config
            .load()
            .storage
            .snapshot_path
            .as_ref()
            .map(PathBuf::from);
        Self { crm, snapshot_path }
    }

    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport {
            sessions_purged: self.crm.sessions.purge_expired(),
            cache_entries_purged: self.crm.leads.purge_cache() + self.crm.tenants.purge_cache(),
            quotes_expired: self.crm.quotes.expire_due(now_millis()),
            rooms_pruned: self.crm.hub.prune(),
            snapshot_generation: None,
        };

        if let Some(path) = &self.snapshot_path {
            match flush_snapshot(self.crm.store.clone(), path).await {
                Ok(generation) => report.snapshot_generation = generation,
                Err(e) => tracing::error!(error = %e, "Snapshot flush failed"),
            }
        }
        self.crm.store.report_metrics();

        tracing::debug!(?report, "Maintenance sweep done");
        report
    }

    /// Sweep on every tick until shutdown fires, then flush a final snapshot.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let secs = self.crm.config.load().maintenance.interval_secs.max(1);
        let mut ticker = tokio::time::interval(Duration::from_secs(secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => break,
            }
        }

        if let Some(path) = &self.snapshot_path {
            match flush_snapshot(self.crm.store.clone(), path).await {
                Ok(Some(generation)) => tracing::info!(generation, "Final snapshot written"),
                Ok(None) => tracing::info!("Store unchanged, no final snapshot needed"),
                Err(e) => tracing::error!(error = %e, "Final snapshot failed"),
            }
        }
        tracing::info!("Maintenance stopped");
    }
}
