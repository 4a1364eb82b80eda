//! `GET /api/health` (§4.12): never fails; reports `degraded` instead.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct ExplorerHealth {
    #[serde(rename = "eventCount")]
    pub event_count: usize,
    #[serde(rename = "databaseSizeBytes")]
    pub database_size_bytes: u64,
    #[serde(rename = "wsConnections")]
    pub ws_connections: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(rename = "nodeId")]
    pub node_id: String,
    pub uptime: u64,
    pub explorer: ExplorerHealth,
    pub timestamp: DateTime<Utc>,
}

/// Tracks process start for `uptime` in the health report.
#[derive(Clone)]
pub struct StartedAt(Instant);

impl Default for StartedAt {
    fn default() -> Self {
        StartedAt(Instant::now())
    }
}

impl StartedAt {
    pub fn uptime_seconds(&self) -> u64 {
        self.0.elapsed().as_secs()
    }
}
