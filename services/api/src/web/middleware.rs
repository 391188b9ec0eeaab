//! services/api/src/web/middleware.rs
//!
//! The auth gate: resolves an `Authorization: Bearer` token to a user.
//!
//! `optional_auth` lets anonymous requests through and records who the caller
//! is when a token is presented; `require_auth` rejects anonymous requests.
//! In both cases a presented token that does not verify is a 401.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use oloy_core::domain::User;
use std::sync::Arc;
use tracing::{error, warn};

use crate::web::{error::HttpError, state::AppState};

const CREDENTIALS_ERROR: &str = "Could not validate credentials";

/// The caller of an endpoint where authentication is optional.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<User>);

/// Extracts the token from `Authorization: Bearer <token>`. Other schemes count as absent.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Resolves an optional token to a user.
///
/// No token resolves to `None`. A token that fails verification, or whose
/// subject no longer exists, is an error.
pub async fn resolve_user(state: &AppState, token: Option<&str>) -> Result<Option<User>, HttpError> {
    let Some(token) = token else {
        return Ok(None);
    };

    let username = state.tokens.verify(token).map_err(|e| {
        warn!("Rejected bearer token: {}", e);
        HttpError::unauthorized(CREDENTIALS_ERROR)
    })?;

    let credentials = state
        .db
        .get_user_by_username(&username)
        .await
        .map_err(|e| {
            error!("Failed to look up token subject: {:?}", e);
            HttpError::unauthorized(CREDENTIALS_ERROR)
        })?
        .ok_or_else(|| {
            warn!("Token subject '{}' no longer exists", username);
            HttpError::unauthorized(CREDENTIALS_ERROR)
        })?;

    Ok(Some(credentials.into_user()))
}

/// Like [`resolve_user`], but absence is also a 401.
pub async fn require_user(state: &AppState, token: Option<&str>) -> Result<User, HttpError> {
    resolve_user(state, token)
        .await?
        .ok_or_else(|| HttpError::unauthorized("Not authenticated"))
}

/// Middleware for endpoints that work with or without a caller.
/// Inserts a `CurrentUser` into request extensions.
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let user = resolve_user(&state, bearer_token(req.headers())).await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Middleware that rejects requests without a valid token.
/// Inserts the `User` into request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let user = require_user(&state, bearer_token(req.headers())).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
