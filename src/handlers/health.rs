use axum::Json;
use chrono::Utc;
use tracing::debug;

use crate::models::HealthResponse;

fn health(message: &str) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: message.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    health("Server is running")
}

/// Readiness check endpoint
pub async fn ready_check() -> Json<HealthResponse> {
    debug!("Readiness check requested");
    // Rooms live in memory; there is nothing external to wait for.
    health("Collaboration relay is ready")
}
