//! services/api/src/adapters/yolo/mod.rs
//!
//! The `DetectionEngine` adapter: a YOLO model exported to ONNX, run with ONNX
//! Runtime on the CPU. The session is loaded once at startup and shared; runs
//! are serialized through a mutex.

pub mod labels;
pub mod postprocess;

use image::RgbImage;
use ndarray::{Axis, Ix3};
use oloy_core::domain::{Detection, DetectionParams};
use oloy_core::ports::{DetectionEngine, PortError, PortResult};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use postprocess::{decode, letterbox, non_max_suppression, to_tensor};

pub struct YoloOnnxEngine {
    session: Mutex<Session>,
    input_name: String,
    input_size: u32,
    labels: Vec<String>,
}

impl std::fmt::Debug for YoloOnnxEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloOnnxEngine")
            .field("input_name", &self.input_name)
            .field("input_size", &self.input_size)
            .field("labels", &self.labels.len())
            .finish_non_exhaustive()
    }
}

fn runtime_error(context: &str, e: impl std::fmt::Display) -> PortError {
    PortError::Unexpected(format!("{}: {}", context, e))
}

impl YoloOnnxEngine {
    /// Loads the model weights. Called once from the composition root.
    pub fn load(
        model_path: &Path,
        input_size: u32,
        threads: usize,
        labels: Vec<String>,
    ) -> PortResult<Self> {
        if !model_path.exists() {
            return Err(PortError::NotFound(format!(
                "Detection model not found: {}",
                model_path.display()
            )));
        }

        info!("Loading detection model from {}", model_path.display());
        let session = Session::builder()
            .map_err(|e| runtime_error("Failed to create session builder", e))?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| runtime_error("Failed to set CPU execution provider", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| runtime_error("Failed to set optimization level", e))?
            .with_intra_threads(threads)
            .map_err(|e| runtime_error("Failed to set intra threads", e))?
            .commit_from_file(model_path)
            .map_err(|e| runtime_error("Failed to load detection model", e))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        info!(
            "Detection model loaded (input '{}', {}px, {} classes)",
            input_name,
            input_size,
            labels.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            input_size,
            labels,
        })
    }

    fn label(&self, class: usize) -> String {
        self.labels
            .get(class)
            .cloned()
            .unwrap_or_else(|| class.to_string())
    }
}

impl DetectionEngine for YoloOnnxEngine {
    fn detect(&self, image: &RgbImage, params: &DetectionParams) -> PortResult<Vec<Detection>> {
        let (width, height) = image.dimensions();
        let (canvas, placement) = letterbox(image, self.input_size);
        let input_value = Value::from_array(to_tensor(&canvas))
            .map_err(|e| runtime_error("Failed to create input tensor", e))?;

        let candidates = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| PortError::Unexpected("Detection session lock poisoned".to_string()))?;
            let outputs = session
                .run(ort::inputs![&self.input_name => input_value])
                .map_err(|e| runtime_error("Detection inference failed", e))?;
            let output = outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| runtime_error("Failed to extract output tensor", e))?;
            let output = output
                .into_dimensionality::<Ix3>()
                .map_err(|e| runtime_error("Unexpected output shape", e))?;
            let head = output.index_axis(Axis(0), 0);

            // Some exports emit [anchors, 4 + classes]; normalise to rows of channels.
            if head.nrows() > head.ncols() {
                decode(head.t(), params.conf)
            } else {
                decode(head, params.conf)
            }
        };

        let kept = non_max_suppression(candidates, params.iou, params.agnostic_nms, params.max_det);
        if params.verbose {
            debug!("{}x{} image: {} detections", width, height, kept.len());
        }

        Ok(kept
            .into_iter()
            .map(|candidate| Detection {
                name: self.label(candidate.class),
                class: candidate.class as u32,
                confidence: candidate.score,
                bbox: placement.unmap(candidate.bbox, width, height),
            })
            .collect())
    }
}
