use std::time::Duration;
use thiserror::Error;

use super::annotate::AnnotateError;
use crate::detector::DetectorError;
use crate::storage::StorageError;

/// Why a single file produced no result
///
/// None of these abort the batch.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("unsupported media type: {0:?}")]
    UnsupportedMediaType(String),
    #[error("failed to persist upload: {0}")]
    UploadPersist(#[source] StorageError),
    #[error("inference failed: {0}")]
    Inference(#[from] DetectorError),
    #[error("inference timed out after {0:?}")]
    InferenceTimeout(Duration),
    #[error("inference slots closed")]
    InferenceUnavailable,
    #[error("inference task aborted: {0}")]
    InferenceAborted(String),
    #[error("failed to render annotations: {0}")]
    Annotation(#[from] AnnotateError),
    #[error("failed to persist result: {0}")]
    ResultPersist(#[source] StorageError),
}

impl FileError {
    pub fn code(&self) -> &'static str {
        match self {
            FileError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            FileError::UploadPersist(_) => "UPLOAD_PERSIST_FAILURE",
            FileError::Inference(_) => "INFERENCE_FAILURE",
            FileError::InferenceTimeout(_) => "INFERENCE_TIMEOUT",
            FileError::InferenceUnavailable => "INFERENCE_UNAVAILABLE",
            FileError::InferenceAborted(_) => "INFERENCE_ABORTED",
            FileError::Annotation(_) => "ANNOTATION_FAILURE",
            FileError::ResultPersist(_) => "RESULT_PERSIST_FAILURE",
        }
    }

    /// Worth resubmitting the same file later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FileError::InferenceTimeout(_) | FileError::InferenceUnavailable
        )
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, FileError::UnsupportedMediaType(_))
    }
}
