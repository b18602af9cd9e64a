use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Detection collaborator errors
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector unreachable: {0}")]
    Transport(String),
    #[error("detector returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid detector response: {0}")]
    InvalidResponse(String),
    #[error("detector client misconfigured: {0}")]
    Config(String),
    #[error("cannot resolve {path}: {source}")]
    LocalPath {
        path: String,
        source: std::io::Error,
    },
}

/// Inference knobs forwarded on every call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceOptions {
    /// Square input resolution (images only)
    pub image_size: u32,
    pub confidence_threshold: f32,
}

/// One box as reported by the model, before label resolution
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_index: usize,
    pub confidence: f64,
    /// `[x1, y1, x2, y2]` in pixels
    pub bbox: [f64; 4],
}

/// Structured result for a still image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageInference {
    pub labels: BTreeMap<usize, String>,
    pub detections: Vec<RawDetection>,
}

/// Where a video run should write its annotated output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDestination {
    pub project: PathBuf,
    pub name: String,
}

impl VideoDestination {
    /// `{project}/{name}/{name}.mp4`, used when the detector does not report a path
    pub fn conventional_path(&self) -> PathBuf {
        self.project
            .join(&self.name)
            .join(format!("{}.mp4", self.name))
    }
}

/// Contract of the object-detection model
///
/// Implementations are shared across requests; callers bound concurrency
/// and apply timeouts, so implementations need not be reentrant-safe on
/// their own beyond `Send + Sync`.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Run detection on an image and return its boxes
    async fn detect_image(
        &self,
        source: &Path,
        options: &InferenceOptions,
    ) -> Result<ImageInference, DetectorError>;

    /// Annotate a video, returning the path of the written file
    async fn annotate_video(
        &self,
        source: &Path,
        options: &InferenceOptions,
        destination: &VideoDestination,
    ) -> Result<PathBuf, DetectorError>;

    /// Readiness check (optional hook)
    async fn health(&self) -> Result<(), DetectorError> {
        Ok(())
    }
}
