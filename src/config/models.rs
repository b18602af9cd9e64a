use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Upper bound for one multipart request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: ByteSize,
    #[serde(default = "default_max_files_per_batch")]
    pub max_files_per_batch: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_upload_bytes: default_max_upload_bytes(),
            max_files_per_batch: default_max_files_per_batch(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_max_upload_bytes() -> ByteSize {
    ByteSize(512 * 1024 * 1024) // 512 MB
}

fn default_max_files_per_batch() -> usize {
    64
}

/// Filesystem roots for the artifact store
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_root")]
    pub uploads_root: PathBuf,
    #[serde(default = "default_results_root")]
    pub results_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_root: default_uploads_root(),
            results_root: default_results_root(),
        }
    }
}

fn default_uploads_root() -> PathBuf {
    PathBuf::from("static/uploads")
}

fn default_results_root() -> PathBuf {
    PathBuf::from("static/results")
}

/// Detection sidecar configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Inference resolution for still images
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_inference_timeout")]
    pub inference_timeout: HumanDuration,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    /// Number of inference calls allowed in flight across all requests.
    /// 1 serializes access to the model.
    #[serde(default = "default_max_concurrent_inferences")]
    pub max_concurrent_inferences: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            image_size: default_image_size(),
            confidence_threshold: default_confidence_threshold(),
            inference_timeout: default_inference_timeout(),
            connect_timeout: default_connect_timeout(),
            max_concurrent_inferences: default_max_concurrent_inferences(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_image_size() -> u32 {
    512
}

fn default_confidence_threshold() -> f32 {
    0.25
}

fn default_inference_timeout() -> HumanDuration {
    HumanDuration::from_secs(300)
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_max_concurrent_inferences() -> usize {
    1
}
