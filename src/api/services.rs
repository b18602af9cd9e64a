use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse},
};
use std::collections::BTreeMap;

use super::{
    models::{FAILED_HEADER, HealthResponse, InfoResponse, SKIPPED_HEADER, UPLOAD_FIELD},
    state::AppState,
    utils::{content_type_for, validate_batch_len},
};
use crate::api::error::ApiError;
use crate::pipeline::UploadFile;
use crate::storage::StorageError;

const UI_PAGE: &str = include_str!("ui.html");
const UI_ROOT_PLACEHOLDER: &str = "__RESULTS_ROOT__";

/// Batch detection endpoint (POST /detect)
///
/// ## Flow:
/// 1. Collect every `images` part of the multipart form (other fields are ignored)
/// 2. Enforce the per-batch file limit
/// 3. Process the files in order; unsupported or failed files are left out
/// 4. Return the results as a JSON array, with skip/failure counts in headers
pub async fn detect(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let max_files = state.config.server.max_files_per_batch;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        // parts without a filename cannot be classified and end up skipped
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;

        files.push(UploadFile::new(filename, data));
        validate_batch_len(files.len(), max_files)?;
    }

    let outcome = state.processor.handle_batch(files).await;

    let mut headers = HeaderMap::new();
    headers.insert(SKIPPED_HEADER, HeaderValue::from(outcome.skipped));
    headers.insert(FAILED_HEADER, HeaderValue::from(outcome.failed));

    Ok((StatusCode::OK, headers, Json(outcome.results)))
}

/// Artifact download endpoint (GET /output/{*path})
///
/// Streams a file from the results root by its relative path.
pub async fn output(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.store.fetch_result(&path).await.map_err(|e| match e {
        StorageError::NotFound(_) | StorageError::InvalidPath(_) => ApiError::ArtifactNotFound(path.clone()),
        other => ApiError::Internal(format!("Failed to read artifact: {}", other)),
    })?;

    let content_type = content_type_for(&path);
    Ok(([(header::CONTENT_TYPE, content_type.to_string())], bytes))
}

/// Liveness/info endpoint (GET /)
pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse::new(&state.metrics.snapshot()))
}

/// Health check endpoint (GET /health)
///
/// Returns 503 Service Unavailable if any component is unhealthy.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let storage_ok = state.store.uploads_root().is_dir() && state.store.results_root().is_dir();
    components.insert("storage".to_string(), status_label(storage_ok));

    let detector_ok = match state.detector.health().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Detector health check failed");
            false
        }
    };
    components.insert("detector".to_string(), status_label(detector_ok));

    let all_healthy = components.values().all(|status| status == "healthy");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: status_label(all_healthy),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

/// Operator upload page (GET /ui)
///
/// The page maps result paths to `/output/` URLs, so it is handed the
/// configured results root.
pub async fn ui(State(state): State<AppState>) -> Html<String> {
    let root = state.store.results_root().display().to_string();
    let prefix = format!("{}/", root.trim_end_matches('/'));
    let literal = serde_json::to_string(&prefix)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace('<', "\\u003c");
    Html(UI_PAGE.replace(UI_ROOT_PLACEHOLDER, &literal))
}

fn status_label(healthy: bool) -> String {
    if healthy { "healthy" } else { "unhealthy" }.to_string()
}
