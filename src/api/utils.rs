//! API utility functions
//!
//! Pure, stateless helpers for request and response processing.

use crate::api::error::ApiError;

/// Content type served for a result artifact, by extension
pub fn content_type_for(path: &str) -> mime::Mime {
    let extension = std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG,
        Some("png") => mime::IMAGE_PNG,
        Some("mp4") => "video/mp4".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        Some("avi") => "video/x-msvideo".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        Some("mov") => "video/quicktime".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        Some("mkv") => "video/x-matroska".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

/// Validates that the batch does not exceed the configured number of files
pub fn validate_batch_len(count: usize, max_files: usize) -> Result<(), ApiError> {
    if count > max_files {
        return Err(ApiError::InvalidPayload(format!(
            "too many files in one batch: limit is {max_files}"
        )));
    }
    Ok(())
}
