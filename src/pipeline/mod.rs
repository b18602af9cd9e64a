//! Per-file detection pipeline
//!
//! ## Key Components
//!
//! - [`BatchProcessor`] - runs each upload through classify, persist, detect
//!   and aggregate, isolating per-file failures
//! - [`aggregate`] - turns raw boxes into labeled detections plus the
//!   area-weighted diseased percentage
//! - [`annotate`] - draws the boxes onto the uploaded image
//! - [`FileError`] - why a file produced no result

pub mod aggregate;
pub mod annotate;
mod batch;
mod error;
mod types;

pub use aggregate::{DISEASED_LABEL, ImageAnalysis, aggregate};
pub use batch::BatchProcessor;
pub use error::FileError;
pub use types::{BatchOutcome, Detection, FileResult, ImageResult, UploadFile, VideoResult};
