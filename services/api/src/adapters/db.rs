//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It holds the Credential
//! Store and the History Log, using `sqlx` over SQLite.
//!
//! Every mutation is a single statement committed on its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oloy_core::domain::{HistoryAction, HistoryEntry, User, UserCredentials};
use oloy_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    email: String,
    hashed_password: String,
}
impl UserRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            id: self.id,
            username: self.username,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct HistoryRecord {
    id: i64,
    user_id: i64,
    action_type: String,
    resource_path: String,
    timestamp: DateTime<Utc>,
    result_summary: Json<serde_json::Value>,
}
impl HistoryRecord {
    fn to_domain(self) -> PortResult<HistoryEntry> {
        let action = HistoryAction::parse(&self.action_type).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown history action '{}'", self.action_type))
        })?;
        Ok(HistoryEntry {
            id: self.id,
            user_id: self.user_id,
            action,
            resource_path: self.resource_path,
            created_at: self.timestamp,
            result_summary: self.result_summary.0,
        })
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_user_by_username(&self, username: &str) -> PortResult<Option<UserCredentials>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, email, hashed_password FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn create_user(
        &self,
        username: &str,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        if self.get_user_by_username(username).await?.is_some() {
            return Err(PortError::Conflict("Username already registered".to_string()));
        }

        // The unique constraints still decide when two registrations race.
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (username, email, hashed_password) VALUES (?, ?, ?) \
             RETURNING id, username, email, hashed_password",
        )
        .bind(username)
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                if db_err.message().contains("users.email") {
                    PortError::Conflict("Email already registered".to_string())
                } else {
                    PortError::Conflict("Username already registered".to_string())
                }
            }
            other => unexpected(other),
        })?;

        Ok(record.to_domain().into_user())
    }

    async fn append_history(
        &self,
        user_id: i64,
        action: HistoryAction,
        resource_path: &str,
        result_summary: serde_json::Value,
    ) -> PortResult<HistoryEntry> {
        let record = sqlx::query_as::<_, HistoryRecord>(
            "INSERT INTO history (user_id, action_type, resource_path, timestamp, result_summary) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING id, user_id, action_type, resource_path, timestamp, result_summary",
        )
        .bind(user_id)
        .bind(action.as_str())
        .bind(resource_path)
        .bind(Utc::now())
        .bind(Json(result_summary))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                PortError::NotFound(format!("User {} not found", user_id))
            }
            other => unexpected(other),
        })?;
        record.to_domain()
    }

    async fn list_history(&self, user_id: i64, skip: i64, limit: i64) -> PortResult<Vec<HistoryEntry>> {
        let records = sqlx::query_as::<_, HistoryRecord>(
            "SELECT id, user_id, action_type, resource_path, timestamp, result_summary \
             FROM history WHERE user_id = ? ORDER BY id ASC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(HistoryRecord::to_domain).collect()
    }
}
