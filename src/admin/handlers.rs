use axum::{extract::State, Json};
use serde::Serialize;
use std::path::Path;

use crate::error::CrmError;
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::lifecycle::flush_snapshot;
use crate::store::StoreStats;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct Stats {
    pub store: StoreStats,
    pub sessions: usize,
    pub websocket_connections: usize,
    pub rooms: usize,
    pub dirty: bool,
}

#[derive(Serialize)]
pub struct SnapshotResult {
    pub path: String,
    /// `None` when nothing changed since the last snapshot.
    pub generation: Option<u64>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub async fn get_stats(State(state): State<AppState>) -> Json<Stats> {
    Json(Stats {
        store: state.crm.store.stats(),
        sessions: state.crm.sessions.len(),
        websocket_connections: state.connections.total(),
        rooms: state.crm.hub.room_count(),
        dirty: state.crm.store.is_dirty(),
    })
}

pub async fn post_snapshot(State(state): State<AppState>) -> ApiResult<Json<SnapshotResult>> {
    let path = state
        .config
        .load()
        .storage
        .snapshot_path
        .clone()
        .ok_or_else(|| CrmError::Conflict("no snapshot path configured".to_string()))?;

    let generation = flush_snapshot(state.crm.store.clone(), Path::new(&path)).await?;
    tracing::info!(path = %path, ?generation, "Snapshot requested by operator");
    Ok(Json(SnapshotResult { path, generation }))
}
