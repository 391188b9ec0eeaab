//! services/api/src/inference.rs
//!
//! The inference orchestrator. Sequences ingestion, optional resize, the
//! detection engine call, result normalisation and the history write for
//! single images and for videos (every frame, in order).

use bytes::Bytes;
use image::{imageops, imageops::FilterType, RgbImage};
use oloy_core::domain::{
    Detection, DetectionParams, FrameDetections, HistoryAction, HistoryEntry, User,
};
use oloy_core::ports::{
    DatabaseService, DetectionEngine, FrameSource, PortError, PortResult, VideoDecoder,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::adapters::media::{self, extension_of, MediaError, MediaStore, VIDEO_EXTENSIONS};

/// Largest accepted width or height for the optional resize.
pub const MAX_RESIZE_DIMENSION: u32 = 8192;

//=========================================================================================
// Requests, Outcomes and Errors
//=========================================================================================

/// A file received from the client.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct ImageInferenceRequest {
    /// Takes precedence over `image_url` when both are present.
    pub file: Option<MediaUpload>,
    pub image_url: Option<String>,
    pub params: DetectionParams,
    /// Target `(width, height)`; applied only when both are known.
    pub resize: Option<(u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct ImageInferenceOutcome {
    pub file_path: PathBuf,
    pub results: Vec<Detection>,
}

#[derive(Debug, Clone)]
pub struct VideoInferenceRequest {
    pub file: MediaUpload,
    pub params: DetectionParams,
}

#[derive(Debug, Clone)]
pub struct VideoInferenceOutcome {
    pub video_path: PathBuf,
    pub total_frames: u64,
    pub frame_analysis: Vec<FrameDetections>,
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Either file or image_url is required")]
    MissingInput,
    #[error("Unsupported video format: {0}")]
    UnsupportedFormat(String),
    #[error("Could not retrieve image from URL: {0}")]
    FetchFailed(String),
    #[error("Invalid image file: {0}")]
    InvalidImage(String),
    #[error("Could not open video: {0}")]
    InvalidVideo(String),
    #[error("{0}")]
    InvalidParameters(String),
    /// Storage, runtime or model failure.
    #[error("{0}")]
    Failed(String),
}

impl From<MediaError> for InferenceError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::FetchFailed(_) | MediaError::Request(_) => {
                InferenceError::FetchFailed(e.to_string())
            }
            MediaError::InvalidImage(inner) => InferenceError::InvalidImage(inner.to_string()),
            MediaError::Io(inner) => InferenceError::Failed(inner.to_string()),
        }
    }
}

impl From<PortError> for InferenceError {
    fn from(e: PortError) -> Self {
        InferenceError::Failed(e.to_string())
    }
}

impl From<tokio::task::JoinError> for InferenceError {
    fn from(e: tokio::task::JoinError) -> Self {
        InferenceError::Failed(format!("Inference worker failed: {}", e))
    }
}

//=========================================================================================
// The Orchestrator
//=========================================================================================

/// Built once at startup and shared by all handlers.
pub struct InferenceService {
    engine: Arc<dyn DetectionEngine>,
    video_decoder: Arc<dyn VideoDecoder>,
    media: MediaStore,
    db: Arc<dyn DatabaseService>,
}

impl InferenceService {
    pub fn new(
        engine: Arc<dyn DetectionEngine>,
        video_decoder: Arc<dyn VideoDecoder>,
        media: MediaStore,
        db: Arc<dyn DatabaseService>,
    ) -> Self {
        Self {
            engine,
            video_decoder,
            media,
            db,
        }
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    /// Runs detection on one uploaded or remote image.
    pub async fn predict_image(
        &self,
        request: ImageInferenceRequest,
        user: Option<&User>,
    ) -> Result<ImageInferenceOutcome, InferenceError> {
        let resize = match request.resize {
            Some((0, _)) | Some((_, 0)) => {
                return Err(InferenceError::InvalidParameters(
                    "resize dimensions must be positive".to_string(),
                ))
            }
            Some((width, height)) if width > MAX_RESIZE_DIMENSION || height > MAX_RESIZE_DIMENSION => {
                return Err(InferenceError::InvalidParameters(format!(
                    "resize dimensions must not exceed {}",
                    MAX_RESIZE_DIMENSION
                )))
            }
            resize => resize,
        };
        let image_url = request.image_url.filter(|url| !url.trim().is_empty());
        let stored = match (request.file, image_url) {
            (Some(upload), _) => {
                self.media
                    .ingest_upload(&upload.bytes, &upload.file_name)
                    .await?
            }
            (None, Some(url)) => self.media.ingest_url(&url).await?,
            (None, None) => return Err(InferenceError::MissingInput),
        };

        let engine = Arc::clone(&self.engine);
        let params = request.params;
        let path = stored.path.clone();
        let results = tokio::task::spawn_blocking(move || -> Result<Vec<Detection>, InferenceError> {
            let mut image = media::decode_image(&path)?;
            if let Some((width, height)) = resize {
                image = imageops::resize(&image, width, height, FilterType::Triangle);
            }
            Ok(engine.detect(&image, &params)?)
        })
        .await??;

        if let Some(user) = user {
            let summary = serde_json::to_value(&results)
                .map_err(|e| InferenceError::Failed(e.to_string()))?;
            if let Err(e) = self
                .record_history(user.id, HistoryAction::ImageInference, &stored.path, summary)
                .await
            {
                warn!("Failed to log history for user {}: {}", user.id, e);
            }
        }

        Ok(ImageInferenceOutcome {
            file_path: stored.path,
            results,
        })
    }

    /// Runs detection on every frame of an uploaded video.
    pub async fn predict_video(
        &self,
        request: VideoInferenceRequest,
        user: Option<&User>,
    ) -> Result<VideoInferenceOutcome, InferenceError> {
        let extension = extension_of(&request.file.file_name)
            .filter(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| InferenceError::UnsupportedFormat(request.file.file_name.clone()))?;

        let video_path = self
            .media
            .ingest_video(&request.file.bytes, &extension)
            .await?;

        let engine = Arc::clone(&self.engine);
        let decoder = Arc::clone(&self.video_decoder);
        let params = DetectionParams {
            verbose: false,
            ..request.params
        };
        let path = video_path.clone();
        let (total_frames, frame_analysis) = tokio::task::spawn_blocking(move || {
            let mut frames = decoder
                .open(&path)
                .map_err(|e| match e {
                    PortError::InvalidInput(reason) => InferenceError::InvalidVideo(reason),
                    other => InferenceError::Failed(other.to_string()),
                })?;
            let analysis = analyse_frames(frames.as_mut(), engine.as_ref(), &params);
            drop(frames);
            analysis.map_err(InferenceError::from)
        })
        .await??;

        info!(
            "Analysed {} frames of {}, {} with detections",
            total_frames,
            video_path.display(),
            frame_analysis.len()
        );

        if let Some(user) = user {
            let summary = serde_json::to_value(&frame_analysis)
                .map_err(|e| InferenceError::Failed(e.to_string()))?;
            if let Err(e) = self
                .record_history(user.id, HistoryAction::VideoInference, &video_path, summary)
                .await
            {
                warn!("Failed to log history for user {}: {}", user.id, e);
            }
        }

        Ok(VideoInferenceOutcome {
            video_path,
            total_frames,
            frame_analysis,
        })
    }

    /// Appends one history row. Callers decide what a failure means.
    pub async fn record_history(
        &self,
        user_id: i64,
        action: HistoryAction,
        resource_path: &Path,
        summary: serde_json::Value,
    ) -> PortResult<HistoryEntry> {
        self.db
            .append_history(user_id, action, &resource_path.to_string_lossy(), summary)
            .await
    }
}

/// Counts detections frame by frame until the source is exhausted.
///
/// Returns the total number of frames and, in frame order, the frames that
/// had at least one detection.
pub fn analyse_frames(
    frames: &mut dyn FrameSource,
    engine: &dyn DetectionEngine,
    params: &DetectionParams,
) -> PortResult<(u64, Vec<FrameDetections>)> {
    let mut frame_count = 0u64;
    let mut summary = Vec::new();

    while let Some(frame) = frames.next_frame()? {
        frame_count += 1;
        let detections = detect_frame(engine, &frame, params, frame_count)?;
        if detections > 0 {
            summary.push(FrameDetections {
                frame: frame_count,
                detections,
            });
        }
    }
    Ok((frame_count, summary))
}

fn detect_frame(
    engine: &dyn DetectionEngine,
    frame: &RgbImage,
    params: &DetectionParams,
    index: u64,
) -> PortResult<usize> {
    engine
        .detect(frame, params)
        .map(|detections| detections.len())
        .map_err(|e| {
            error!("Detection failed on frame {}: {}", index, e);
            e
        })
}
