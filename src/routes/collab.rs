use axum::{middleware, routing::get, Router};

use crate::collab::server::collaboration_handler;
use crate::routes::auth_middleware::auth_middleware;
use crate::AppState;

/// Upgrade routes under the configured prefix. The bare prefix is routed
/// too so a missing room id gets a proper rejection.
pub fn create_collab_routes(state: AppState) -> Router {
    let prefix = state.config.collab_path.clone();
    Router::new()
        .route(&prefix, get(collaboration_handler))
        .route(&format!("{prefix}/*room"), get(collaboration_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
