//! services/api/src/web/users.rs
//!
//! User registration and the caller's inference history.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use oloy_core::domain::{HistoryEntry, User};
use oloy_core::ports::PortError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::security::hash_password;
use crate::web::{error::HttpError, state::AppState};

const DEFAULT_HISTORY_LIMIT: i64 = 100;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct UserCreate {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// A user as returned to clients. Never carries the password hash.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct UserOut {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<User> for UserOut {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Entries to skip (default 0).
    pub skip: Option<i64>,
    /// Maximum entries to return (default 100).
    pub limit: Option<i64>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryOut {
    pub id: i64,
    pub user_id: i64,
    pub action_type: String,
    pub resource_path: String,
    pub timestamp: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub result_summary: serde_json::Value,
}

impl From<HistoryEntry> for HistoryEntryOut {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            id: entry.id,
            user_id: entry.user_id,
            action_type: entry.action.as_str().to_string(),
            resource_path: entry.resource_path,
            timestamp: entry.created_at,
            result_summary: entry.result_summary,
        }
    }
}

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

fn email_pattern() -> Result<&'static Regex, HttpError> {
    static EMAIL: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(EMAIL_PATTERN))
        .as_ref()
        .map_err(|e| {
            error!("Email pattern failed to compile: {}", e);
            HttpError::internal("Failed to validate email")
        })
}

fn validate_registration(req: &UserCreate) -> Result<(), HttpError> {
    if req.username.trim().is_empty() {
        return Err(HttpError::bad_request("Username must not be empty"));
    }
    if req.password.is_empty() {
        return Err(HttpError::bad_request("Password must not be empty"));
    }
    if !email_pattern()?.is_match(&req.email) {
        return Err(HttpError::bad_request("Invalid email address"));
    }
    Ok(())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /users/register - Create a new user account
#[utoipa::path(
    post,
    path = "/users/register",
    request_body = UserCreate,
    responses(
        (status = 200, description = "User created", body = UserOut),
        (status = 400, description = "Invalid request or username already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UserCreate>,
) -> Result<Json<UserOut>, HttpError> {
    validate_registration(&req)?;

    // 1. Hash the password
    let hashed_password = hash_password(&req.password).map_err(|e| {
        error!("Failed to hash password: {}", e);
        HttpError::internal("Failed to hash password")
    })?;

    // 2. Create user in database
    let user = state
        .db
        .create_user(&req.username, &req.email, &hashed_password)
        .await
        .map_err(|e| match e {
            PortError::Conflict(reason) => HttpError::bad_request(reason),
            other => {
                error!("Failed to create user: {:?}", other);
                HttpError::internal("Failed to create user")
            }
        })?;

    info!("Registered user {} ({})", user.id, user.username);
    Ok(Json(UserOut::from(user)))
}

/// GET /users/history - The caller's history, oldest first
#[utoipa::path(
    get,
    path = "/users/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "History entries", body = [HistoryEntryOut]),
        (status = 400, description = "Negative skip or limit"),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer" = []))
)]
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntryOut>>, HttpError> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if skip < 0 || limit < 0 {
        return Err(HttpError::bad_request("skip and limit must not be negative"));
    }

    let entries = state
        .db
        .list_history(user.id, skip, limit)
        .await
        .map_err(|e| {
            error!("Failed to list history: {:?}", e);
            HttpError::internal("Failed to list history")
        })?;

    Ok(Json(entries.into_iter().map(HistoryEntryOut::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn request(username: &str, email: &str, password: &str) -> UserCreate {
        UserCreate {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[rstest]
    #[case(request("alice", "alice@example.com", "pw"), true)]
    #[case(request(" ", "alice@example.com", "pw"), false)]
    #[case(request("alice", "alice@example.com", ""), false)]
    #[case(request("alice", "not-an-email", "pw"), false)]
    #[case(request("alice", "a@b", "pw"), false)]
    fn registration_validation(#[case] req: UserCreate, #[case] valid: bool) {
        assert_eq!(validate_registration(&req).is_ok(), valid);
    }

    #[test]
    fn email_pattern_compiles() {
        let pattern = email_pattern().unwrap();
        assert!(pattern.is_match("alice@example.com"));
        assert!(!pattern.is_match("alice@example"));
    }
}
