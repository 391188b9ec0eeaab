//! services/api/src/web/auth.rs
//!
//! The token endpoint: exchanges a username and password for a bearer token.

use axum::{extract::State, Form, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::security::verify_password;
use crate::web::{error::HttpError, state::AppState};

/// Deliberately identical for unknown users and wrong passwords.
const LOGIN_ERROR: &str = "Incorrect username or password";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct TokenForm {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /token - Exchange credentials for a bearer token
#[utoipa::path(
    post,
    path = "/token",
    request_body(content = TokenForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Incorrect username or password"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn token_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<TokenForm>,
) -> Result<Json<TokenResponse>, HttpError> {
    // 1. Look the user up
    let credentials = state
        .db
        .get_user_by_username(&form.username)
        .await
        .map_err(|e| {
            error!("Failed to get user: {:?}", e);
            HttpError::internal("Authentication error")
        })?;

    // 2. Verify the password
    let credentials = match credentials {
        Some(credentials) if verify_password(&form.password, &credentials.hashed_password) => {
            credentials
        }
        _ => return Err(HttpError::unauthorized(LOGIN_ERROR)),
    };

    // 3. Issue the token
    let access_token = state.tokens.issue(&credentials.username, None).map_err(|e| {
        error!("Failed to issue token: {}", e);
        HttpError::internal("Failed to issue token")
    })?;

    info!("Issued token for user {}", credentials.id);
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}
