//! Object-detection collaborator
//!
//! - [`Detector`] - contract the pipeline depends on
//! - [`HttpDetector`] - client for a model-serving sidecar

mod http;
mod traits;

pub use http::HttpDetector;
pub use traits::{
    Detector, DetectorError, ImageInference, InferenceOptions, RawDetection, VideoDestination,
};
