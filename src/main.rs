use std::panic;

use notes_collab::config::Config;
use notes_collab::{build_app, AppState};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration before tracing so LOG_LEVEL can shape the filter
    let loaded = Config::load();
    let log_level = loaded
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("notes_collab=debug,tower_http=debug,{log_level}").into()
        }))
        .init();

    info!("Starting server...");

    let config = loaded.unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    if config.auth_jwt_secret.is_none() {
        warn!("AUTH_JWT_SECRET not set - collaboration channel accepts unauthenticated sockets");
    }
    info!(
        "Environment: {}, room eviction policy: {:?}, ping interval: {:?}",
        config.environment,
        config.room_eviction,
        config.ping_interval()
    );

    let address = config.server_address();
    let collab_path = config.collab_path.clone();
    let app = build_app(AppState::new(config));

    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", address, e);
            std::process::exit(1);
        }
    };

    info!("🚀 Server running on http://{}", address);
    info!("📡 Collaboration available at ws://{}{}/<note-id>", address, collab_path);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
