use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("confidence_threshold must be within [0, 1], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("image_size must be a positive multiple of 32, got {0}")]
    InvalidImageSize(u32),

    #[error("Timeout must be positive: {field}")]
    ZeroTimeout { field: String },

    #[error("max_concurrent_inferences must be at least 1")]
    NoInferencePermits,

    #[error("max_files_per_batch must be at least 1")]
    EmptyBatchLimit,

    #[error("max_upload_bytes must be positive")]
    ZeroUploadLimit,

    #[error("Storage root '{field}' must not be empty")]
    EmptyStorageRoot { field: String },

    #[error("uploads_root and results_root must differ: {0}")]
    SharedStorageRoot(String),

    #[error("Detector endpoint must be an http(s) URL, got '{0}'")]
    InvalidEndpoint(String),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_storage(config)?;
    validate_detector(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    if config.server.max_files_per_batch == 0 {
        return Err(ValidationError::EmptyBatchLimit);
    }

    if config.server.max_upload_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroUploadLimit);
    }

    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    let storage = &config.storage;

    if storage.uploads_root.as_os_str().is_empty() {
        return Err(ValidationError::EmptyStorageRoot {
            field: "uploads_root".to_string(),
        });
    }

    if storage.results_root.as_os_str().is_empty() {
        return Err(ValidationError::EmptyStorageRoot {
            field: "results_root".to_string(),
        });
    }

    if storage.uploads_root == storage.results_root {
        return Err(ValidationError::SharedStorageRoot(
            storage.uploads_root.display().to_string(),
        ));
    }

    Ok(())
}

fn validate_detector(config: &Config) -> Result<(), ValidationError> {
    let detector = &config.detector;

    if !(0.0..=1.0).contains(&detector.confidence_threshold) {
        return Err(ValidationError::InvalidConfidenceThreshold(
            detector.confidence_threshold,
        ));
    }

    if detector.image_size == 0 || detector.image_size % 32 != 0 {
        return Err(ValidationError::InvalidImageSize(detector.image_size));
    }

    if detector.inference_timeout.as_duration().is_zero() {
        return Err(ValidationError::ZeroTimeout {
            field: "inference_timeout".to_string(),
        });
    }

    if detector.connect_timeout.as_duration().is_zero() {
        return Err(ValidationError::ZeroTimeout {
            field: "connect_timeout".to_string(),
        });
    }

    if detector.max_concurrent_inferences == 0 {
        return Err(ValidationError::NoInferencePermits);
    }

    if !(detector.endpoint.starts_with("http://") || detector.endpoint.starts_with("https://")) {
        return Err(ValidationError::InvalidEndpoint(detector.endpoint.clone()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_confidence_out_of_range() {
        let mut config = Config::default();
        config.detector.confidence_threshold = 1.5;

        let result = validate(&config);
        assert!(matches!(
            result,
            Err(ValidationError::InvalidConfidenceThreshold(_))
        ));
    }

    #[test]
    fn test_image_size_not_multiple_of_stride() {
        let mut config = Config::default();
        config.detector.image_size = 500;

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::InvalidImageSize(500))));
    }

    #[test]
    fn test_zero_inference_timeout() {
        let mut config = Config::default();
        config.detector.inference_timeout = HumanDuration::from_secs(0);

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::ZeroTimeout { .. })));
    }

    #[test]
    fn test_zero_permits() {
        let mut config = Config::default();
        config.detector.max_concurrent_inferences = 0;

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::NoInferencePermits)));
    }

    #[test]
    fn test_shared_storage_root() {
        let mut config = Config::default();
        config.storage.results_root = PathBuf::from("static/uploads");

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::SharedStorageRoot(_))));
    }

    #[test]
    fn test_endpoint_scheme() {
        let mut config = Config::default();
        config.detector.endpoint = "grpc://yolo:9000".to_string();

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::InvalidEndpoint(_))));
    }
}
