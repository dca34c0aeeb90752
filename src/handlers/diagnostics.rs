use std::sync::{Mutex, OnceLock};

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use sysinfo::System;
use tracing::info;

use crate::collab::EvictionPolicy;
use crate::models::DiagnosticsResponse;
use crate::AppState;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Relay and process statistics
pub async fn diagnostics(State(state): State<AppState>) -> (StatusCode, Json<DiagnosticsResponse>) {
    let stats = state.registry.stats().await;
    let n_sockets = state.sockets.get() as u32;

    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    let room_eviction = match state.registry.policy() {
        EvictionPolicy::OnIdle => "on-idle",
        EvictionPolicy::Never => "never",
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB, Rooms: {}, Sessions: {}, Sockets: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        stats.rooms,
        stats.sessions,
        n_sockets
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_rooms: stats.rooms as u32,
            n_sessions: stats.sessions as u32,
            n_sockets,
            n_awareness_peers: stats.awareness_peers as u32,
            room_eviction: room_eviction.to_string(),
            started_at: state.started_at,
            uptime_secs: (Utc::now() - state.started_at).num_seconds(),
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    )
}
