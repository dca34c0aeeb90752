use std::collections::HashMap;

use axum::extract::Query;
use axum::http::{self};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use thiserror::Error;

/// Name of the cookie the web client may carry the token in.
const AUTH_COOKIE: &str = "auth_token";
/// Query parameter y-websocket style clients put the token in.
const TOKEN_PARAM: &str = "token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no token in Authorization header, token query parameter or cookie")]
    MissingToken,
    #[error("invalid {0} header")]
    InvalidHeader(&'static str),
    #[error("token rejected: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("token has no 'sub' claim")]
    MissingSubject,
}

/// Identity attached to a request once its token checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub subject: String,
}

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, AuthError> {
    // 1. Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::InvalidHeader("Authorization"))?;
        return Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string());
    }

    // 2. Query parameter, since browsers cannot set headers on a WebSocket
    if let Ok(Query(params)) = Query::<HashMap<String, String>>::try_from_uri(req.uri()) {
        if let Some(token) = params.get(TOKEN_PARAM).filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }
    }

    // 3. Cookie
    let cookie_header = req
        .headers()
        .get(http::header::COOKIE)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader("Cookie"))?;
    cookie::Cookie::split_parse(cookie_header)
        .filter_map(Result::ok)
        .find(|c| c.name() == AUTH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AuthError::MissingToken)
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Extracts and verifies the request's token, returning its subject.
pub fn authenticate<B>(req: &http::Request<B>, secret: &str) -> Result<AuthenticatedUser, AuthError> {
    let token = get_auth_token(req)?;
    let token_data = validate_jwt(&token, secret)?;
    let subject = token_data
        .claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or(AuthError::MissingSubject)?;
    Ok(AuthenticatedUser {
        subject: subject.to_string(),
    })
}
