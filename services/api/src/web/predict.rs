//! services/api/src/web/predict.rs
//!
//! Image and video detection endpoints. Both accept multipart or URL-encoded
//! forms and an optional bearer token; authenticated calls are written to history.

use axum::{
    extract::{multipart::Field, FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    Extension, Form, Json,
};
use oloy_core::domain::{Detection, DetectionParams, FrameDetections};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::inference::{
    ImageInferenceRequest, MediaUpload, VideoInferenceRequest, MAX_RESIZE_DIMENSION,
};
use crate::web::{error::HttpError, middleware::CurrentUser, state::AppState};

//=========================================================================================
// Response Types
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ImagePredictionResponse {
    pub file_path: String,
    /// `{name, class, confidence, box: {x1, y1, x2, y2}}` per detection.
    #[schema(value_type = Vec<Object>)]
    pub results: Vec<Detection>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct VideoPredictionResponse {
    pub video_path: String,
    pub total_frames: u64,
    /// `{frame, detections}` for frames with at least one detection.
    #[schema(value_type = Vec<Object>)]
    pub frame_analysis: Vec<FrameDetections>,
}

//=========================================================================================
// Form Parsing
//=========================================================================================

/// The raw fields of a prediction form, before validation.
#[derive(Default, Deserialize)]
struct PredictForm {
    /// Only multipart bodies carry a file.
    #[serde(skip)]
    file: Option<MediaUpload>,
    image_url: Option<String>,
    conf: Option<String>,
    iou: Option<String>,
    max_det: Option<String>,
    agnostic_nms: Option<String>,
    resize_w: Option<String>,
    resize_h: Option<String>,
}

async fn field_text(field: Field<'_>) -> Result<Option<String>, HttpError> {
    let text = field
        .text()
        .await
        .map_err(|e| HttpError::bad_request(format!("Failed to read form field: {}", e)))?;
    let text = text.trim().to_string();
    Ok(if text.is_empty() { None } else { Some(text) })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

impl PredictForm {
    /// Reads `application/x-www-form-urlencoded` bodies as plain fields and
    /// everything else as multipart.
    async fn read(request: Request, state: &Arc<AppState>) -> Result<Self, HttpError> {
        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(form) = Form::<PredictForm>::from_request(request, state)
                .await
                .map_err(|rejection| HttpError::bad_request(rejection.body_text()))?;
            return Ok(form.normalized());
        }

        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|rejection| HttpError::bad_request(rejection.body_text()))?;
        Self::from_multipart(multipart).await
    }

    fn normalized(self) -> Self {
        Self {
            file: self.file,
            image_url: non_blank(self.image_url),
            conf: non_blank(self.conf),
            iou: non_blank(self.iou),
            max_det: non_blank(self.max_det),
            agnostic_nms: non_blank(self.agnostic_nms),
            resize_w: non_blank(self.resize_w),
            resize_h: non_blank(self.resize_h),
        }
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, HttpError> {
        let mut form = PredictForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| HttpError::bad_request(format!("Failed to read multipart data: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await.map_err(|e| {
                        HttpError::bad_request(format!("Failed to read file bytes: {}", e))
                    })?;
                    // Browsers send an empty part when no file was chosen.
                    if !file_name.is_empty() || !bytes.is_empty() {
                        form.file = Some(MediaUpload { file_name, bytes });
                    }
                }
                "image_url" => form.image_url = field_text(field).await?,
                "conf" => form.conf = field_text(field).await?,
                "iou" => form.iou = field_text(field).await?,
                "max_det" => form.max_det = field_text(field).await?,
                "agnostic_nms" => form.agnostic_nms = field_text(field).await?,
                "resize_w" => form.resize_w = field_text(field).await?,
                "resize_h" => form.resize_h = field_text(field).await?,
                _ => {}
            }
        }
        Ok(form)
    }

    fn params(&self) -> Result<DetectionParams, HttpError> {
        let defaults = DetectionParams::default();
        let conf = parse_field("conf", self.conf.as_deref())?.unwrap_or(defaults.conf);
        let iou = parse_field("iou", self.iou.as_deref())?.unwrap_or(defaults.iou);
        let max_det = parse_field("max_det", self.max_det.as_deref())?.unwrap_or(defaults.max_det);
        let agnostic_nms = match self.agnostic_nms.as_deref() {
            Some(raw) => parse_bool("agnostic_nms", raw)?,
            None => defaults.agnostic_nms,
        };

        if !(0.0..=1.0).contains(&conf) {
            return Err(HttpError::bad_request("conf must be between 0 and 1"));
        }
        if !(0.0..=1.0).contains(&iou) {
            return Err(HttpError::bad_request("iou must be between 0 and 1"));
        }
        if max_det < 1 {
            return Err(HttpError::bad_request("max_det must be at least 1"));
        }

        Ok(DetectionParams {
            conf,
            iou,
            max_det,
            agnostic_nms,
            verbose: defaults.verbose,
        })
    }

    /// Both dimensions, or nothing.
    fn resize(&self) -> Result<Option<(u32, u32)>, HttpError> {
        let width: Option<u32> = parse_field("resize_w", self.resize_w.as_deref())?;
        let height: Option<u32> = parse_field("resize_h", self.resize_h.as_deref())?;
        match (width, height) {
            (Some(0), _) | (_, Some(0)) => {
                Err(HttpError::bad_request("resize dimensions must be positive"))
            }
            (Some(w), Some(h)) if w > MAX_RESIZE_DIMENSION || h > MAX_RESIZE_DIMENSION => {
                Err(HttpError::bad_request(format!(
                    "resize dimensions must not exceed {}",
                    MAX_RESIZE_DIMENSION
                )))
            }
            (Some(w), Some(h)) => Ok(Some((w, h))),
            _ => Ok(None),
        }
    }
}

fn parse_field<T: FromStr>(name: &str, raw: Option<&str>) -> Result<Option<T>, HttpError> {
    raw.map(|value| {
        value
            .parse::<T>()
            .map_err(|_| HttpError::bad_request(format!("Invalid value for {}: '{}'", name, value)))
    })
    .transpose()
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, HttpError> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(HttpError::bad_request(format!(
            "Invalid value for {}: '{}'",
            name, raw
        ))),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /predict/image - Detect objects in an uploaded or remote image
#[utoipa::path(
    post,
    path = "/predict/image",
    request_body(
        content_type = "multipart/form-data",
        description = "`file` or `image_url`, plus optional conf, iou, max_det, agnostic_nms, resize_w, resize_h. Without a file the form may also be sent URL-encoded."
    ),
    responses(
        (status = 200, description = "Detections", body = ImagePredictionResponse),
        (status = 400, description = "Missing or invalid input"),
        (status = 401, description = "Invalid bearer token"),
        (status = 500, description = "Processing failure")
    )
)]
pub async fn predict_image_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    request: Request,
) -> Result<Json<ImagePredictionResponse>, HttpError> {
    let form = PredictForm::read(request, &state).await?;
    let params = form.params()?;
    let resize = form.resize()?;

    let outcome = state
        .inference
        .predict_image(
            ImageInferenceRequest {
                file: form.file,
                image_url: form.image_url,
                params,
                resize,
            },
            user.as_ref(),
        )
        .await?;

    Ok(Json(ImagePredictionResponse {
        file_path: outcome.file_path.to_string_lossy().into_owned(),
        results: outcome.results,
    }))
}

/// POST /predict/video - Count detections in every frame of an uploaded video
#[utoipa::path(
    post,
    path = "/predict/video",
    request_body(
        content_type = "multipart/form-data",
        description = "`file` (asf, mp4, mpeg, mov, mkv, avi, webm), plus optional conf, iou, max_det, agnostic_nms."
    ),
    responses(
        (status = 200, description = "Per-frame detection counts", body = VideoPredictionResponse),
        (status = 400, description = "Unsupported format or unreadable video"),
        (status = 401, description = "Invalid bearer token"),
        (status = 500, description = "Processing failure")
    )
)]
pub async fn predict_video_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    request: Request,
) -> Result<Json<VideoPredictionResponse>, HttpError> {
    let form = PredictForm::read(request, &state).await?;
    let params = form.params()?;
    let file = form
        .file
        .ok_or_else(|| HttpError::bad_request("A video file is required"))?;

    let outcome = state
        .inference
        .predict_video(VideoInferenceRequest { file, params }, user.as_ref())
        .await?;

    Ok(Json(VideoPredictionResponse {
        video_path: outcome.video_path.to_string_lossy().into_owned(),
        total_frames: outcome.total_frames,
        frame_analysis: outcome.frame_analysis,
    }))
}
