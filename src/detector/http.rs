//! HTTP client for the inference sidecar
//!
//! The sidecar owns the loaded model and shares the filesystem with this
//! service, so requests carry absolute paths rather than media bytes.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::traits::{
    Detector, DetectorError, ImageInference, InferenceOptions, RawDetection, VideoDestination,
};
use crate::config::DetectorConfig;

pub type Result<T> = std::result::Result<T, DetectorError>;

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    imgsz: Option<u32>,
    conf: f32,
    save: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ImageReply {
    names: BTreeMap<usize, String>,
    #[serde(default)]
    boxes: Vec<WireBox>,
}

#[derive(Debug, Deserialize)]
struct WireBox {
    cls: usize,
    conf: f64,
    xyxy: [f64; 4],
}

#[derive(Debug, Deserialize)]
struct VideoReply {
    #[serde(default)]
    saved_path: Option<PathBuf>,
}

/// Detector backed by a remote `/predict` endpoint
pub struct HttpDetector {
    client: Client,
    endpoint: String,
}

impl HttpDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout.as_duration())
            .user_agent(concat!("leafscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DetectorError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn predict<T: for<'de> Deserialize<'de>>(&self, request: &PredictRequest<'_>) -> Result<T> {
        let url = format!("{}/predict", self.endpoint);
        debug!(url, source = %request.source, save = request.save, "Calling detector");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| DetectorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("Unknown").to_string());
            return Err(DetectorError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect_image(&self, source: &Path, options: &InferenceOptions) -> Result<ImageInference> {
        let request = PredictRequest {
            source: absolute(source)?.to_string_lossy().into_owned(),
            imgsz: Some(options.image_size),
            conf: options.confidence_threshold,
            save: false,
            project: None,
            name: None,
        };

        let reply: ImageReply = self.predict(&request).await?;
        debug!(boxes = reply.boxes.len(), "Detector replied");

        Ok(ImageInference {
            labels: reply.names,
            detections: reply
                .boxes
                .into_iter()
                .map(|b| RawDetection {
                    class_index: b.cls,
                    confidence: b.conf,
                    bbox: b.xyxy,
                })
                .collect(),
        })
    }

    async fn annotate_video(
        &self,
        source: &Path,
        options: &InferenceOptions,
        destination: &VideoDestination,
    ) -> Result<PathBuf> {
        let project = absolute(&destination.project)?;
        let request = PredictRequest {
            source: absolute(source)?.to_string_lossy().into_owned(),
            imgsz: None,
            conf: options.confidence_threshold,
            save: true,
            project: Some(project.to_string_lossy().into_owned()),
            name: Some(&destination.name),
        };

        let reply: VideoReply = self.predict(&request).await?;
        let saved = match reply.saved_path {
            // report paths under the configured root, as for every other artifact
            Some(path) => match path.strip_prefix(&project) {
                Ok(relative) => destination.project.join(relative),
                Err(_) => path,
            },
            None => destination.conventional_path(),
        };
        Ok(saved)
    }

    async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DetectorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectorError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }
        Ok(())
    }
}

/// Resolve against the working directory; the sidecar may run elsewhere
fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|source| DetectorError::LocalPath {
        path: path.display().to_string(),
        source,
    })
}
