pub mod collab;
pub mod config;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod protocol;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{http::HeaderValue, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;

use collab::DocumentRegistry;
use config::Config;
use docs::ApiDoc;
use routes::{create_api_routes, create_collab_routes};
use utils::gauge::Gauge;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<DocumentRegistry>,
    pub sockets: Gauge,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(DocumentRegistry::new(config.room_eviction));
        Self {
            config: Arc::new(config),
            registry,
            sockets: Gauge::new(),
            started_at: Utc::now(),
        }
    }
}

/// Combine all routes
pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .nest("/api", create_api_routes(state.clone()))
        .merge(create_collab_routes(state))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origin_list()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
