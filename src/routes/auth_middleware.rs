use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use tracing::{debug, warn};

use crate::models::ErrorResponse;
use crate::services::auth_service::authenticate;
use crate::AppState;

/// Verifies the bearer token once per request (for sockets: once at
/// upgrade). Passes everything through when no secret is configured.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let Some(secret) = state.config.auth_jwt_secret.as_deref() else {
        return Ok(next.run(req).await);
    };

    match authenticate(&req, secret) {
        Ok(user) => {
            debug!("Authenticated {} for {}", user.subject, req.uri().path());
            req.extensions_mut().insert(user);
            Ok(next.run(req).await)
        }
        Err(e) => {
            warn!("Rejected request to {}: {}", req.uri().path(), e);
            Err(ErrorResponse::reply(StatusCode::UNAUTHORIZED, e.to_string()))
        }
    }
}
