//! crates/oloy_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! Adapters in the `api` service implement these for the database, the
//! detection model and the video decoder; tests implement them with fakes.

use async_trait::async_trait;
use image::RgbImage;
use std::path::Path;

use crate::domain::{Detection, DetectionParams, HistoryAction, HistoryEntry, User, UserCredentials};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, model runtime).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Credential Store ---
    async fn get_user_by_username(&self, username: &str) -> PortResult<Option<UserCredentials>>;

    /// Fails with `PortError::Conflict` when the username or email is taken.
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    // --- History Log ---
    async fn append_history(
        &self,
        user_id: i64,
        action: HistoryAction,
        resource_path: &str,
        result_summary: serde_json::Value,
    ) -> PortResult<HistoryEntry>;

    /// Entries for `user_id` only, in insertion order.
    async fn list_history(&self, user_id: i64, skip: i64, limit: i64) -> PortResult<Vec<HistoryEntry>>;
}

/// The object detection model. Calls are blocking and CPU-bound.
pub trait DetectionEngine: Send + Sync {
    fn detect(&self, image: &RgbImage, params: &DetectionParams) -> PortResult<Vec<Detection>>;
}

/// A sequential, single-pass stream of decoded frames.
///
/// Dropping the source releases whatever backs it.
pub trait FrameSource: Send {
    /// Returns `Ok(None)` once no frame remains.
    fn next_frame(&mut self) -> PortResult<Option<RgbImage>>;
}

pub trait VideoDecoder: Send + Sync {
    /// Fails with `PortError::InvalidInput` when the container cannot be opened.
    fn open(&self, path: &Path) -> PortResult<Box<dyn FrameSource>>;
}
