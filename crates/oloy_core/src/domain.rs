//! crates/oloy_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! Serialization shapes are part of the HTTP contract, so the wire names live here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Represents a user - used throughout app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
}

impl UserCredentials {
    /// Drops the password hash.
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
        }
    }
}

/// The kind of action a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    ImageInference,
    VideoInference,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::ImageInference => "image_inference",
            HistoryAction::VideoInference => "video_inference",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image_inference" => Some(HistoryAction::ImageInference),
            "video_inference" => Some(HistoryAction::VideoInference),
            _ => None,
        }
    }
}

/// An immutable audit record of one user action.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub action: HistoryAction,
    pub resource_path: String,
    pub created_at: DateTime<Utc>,
    pub result_summary: serde_json::Value,
}

/// Corner coordinates of a detection, in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union with another box. Zero when either box is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One object found by the detection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub name: String,
    pub class: u32,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

/// Per-frame summary for video inference. Frames are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDetections {
    pub frame: u64,
    pub detections: usize,
}

/// Parameters handed to the detection engine on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Minimum confidence for a detection to be kept.
    pub conf: f32,
    /// Overlap threshold above which a lower-scored box is suppressed.
    pub iou: f32,
    pub max_det: usize,
    /// Suppress overlapping boxes across classes, not only within one class.
    pub agnostic_nms: bool,
    pub verbose: bool,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            conf: 0.25,
            iou: 0.7,
            max_det: 300,
            agnostic_nms: false,
            verbose: true,
        }
    }
}
