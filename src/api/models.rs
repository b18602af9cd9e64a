//! API models for the leafscan HTTP surface.
//!
//! - `POST /detect` returns a JSON array of [`FileResult`], one per processed
//!   file, in upload order
//! - `GET /` returns [`InfoResponse`]
//! - `GET /health` returns [`HealthResponse`]
//!
//! # Response Example
//!
//! ```json
//! [
//!   {
//!     "type": "image",
//!     "input": "static/uploads/3f9a0c1e.jpg",
//!     "output": "static/results/3f9a0c1e_out.jpg",
//!     "detections": [
//!       {"class": "diseased", "confidence": 0.912, "bbox": [12.5, 40.0, 118.25, 160.0]}
//!     ],
//!     "disease_percent": 100.0
//!   },
//!   {
//!     "type": "video",
//!     "input": "static/uploads/b71d22aa.mp4",
//!     "annotated_video": "static/results/b71d22aa/b71d22aa.mp4"
//!   }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::observability::MetricsSnapshot;

pub use crate::pipeline::{Detection, FileResult, ImageResult, VideoResult};

/// Multipart field carrying the uploaded files
pub const UPLOAD_FIELD: &str = "images";

/// Per-batch counts of files absent from the response body
pub const SKIPPED_HEADER: &str = "x-files-skipped";
pub const FAILED_HEADER: &str = "x-files-failed";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub message: String,
    pub version: String,
    pub metrics: serde_json::Value,
}

impl InfoResponse {
    pub fn new(metrics: &MetricsSnapshot) -> Self {
        Self {
            message: "YOLO API running".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            metrics: serde_json::to_value(metrics).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, String>,
    pub version: String,
}
