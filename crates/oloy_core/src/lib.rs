pub mod domain;
pub mod ports;

pub use domain::{
    BoundingBox, Detection, DetectionParams, FrameDetections, HistoryAction, HistoryEntry, User,
    UserCredentials,
};
pub use ports::{
    DatabaseService, DetectionEngine, FrameSource, PortError, PortResult, VideoDecoder,
};
