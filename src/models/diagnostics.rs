use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for diagnostics information
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    /// Rooms currently held in memory
    pub n_rooms: u32,
    /// Sessions registered in those rooms
    pub n_sessions: u32,
    /// Open sockets, including ones still syncing
    pub n_sockets: u32,
    /// Live awareness entries across all rooms
    pub n_awareness_peers: u32,
    pub room_eviction: String,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
