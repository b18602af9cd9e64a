//! Filesystem-backed artifact store for uploads and generated results
//! Uses the object_store crate's local backend, one store per root

use bytes::Bytes;
use object_store::{ObjectStore, PutMode, local::LocalFileSystem, path::Path as StoragePath};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::StorageConfig;

const ARTIFACT_ID_LEN: usize = 8;

/// Fresh IDs tried before an upload gives up on finding a free one
const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to prepare storage root {path}: {source}")]
    RootUnavailable {
        path: String,
        source: std::io::Error,
    },

    #[error("Write failed for {key}: {source}")]
    WriteFailed {
        key: String,
        source: object_store::Error,
    },

    #[error("Artifact already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid artifact path: {0}")]
    InvalidPath(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Per-file identifier namespacing every path derived from one upload
///
/// 8 hex characters (32 bits) taken from a random v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn generate() -> Self {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(ARTIFACT_ID_LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upload and result roots on the local filesystem
#[derive(Clone)]
pub struct ArtifactStore {
    uploads_root: PathBuf,
    results_root: PathBuf,
    uploads: Arc<dyn ObjectStore>,
    results: Arc<dyn ObjectStore>,
}

impl ArtifactStore {
    /// Open the store, creating both roots if they are missing
    pub fn open(uploads_root: impl Into<PathBuf>, results_root: impl Into<PathBuf>) -> Result<Self> {
        let uploads_root = uploads_root.into();
        let results_root = results_root.into();

        let uploads = local_store(&uploads_root)?;
        let results = local_store(&results_root)?;

        tracing::info!(
            uploads = %uploads_root.display(),
            results = %results_root.display(),
            "Artifact store ready"
        );

        Ok(Self {
            uploads_root,
            results_root,
            uploads,
            results,
        })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Self::open(&config.uploads_root, &config.results_root)
    }

    pub fn uploads_root(&self) -> &Path {
        &self.uploads_root
    }

    pub fn results_root(&self) -> &Path {
        &self.results_root
    }

    /// `{uploads}/{id}{ext}`
    pub fn upload_path(&self, id: &ArtifactId, extension: &str) -> PathBuf {
        self.uploads_root.join(upload_key(id, extension))
    }

    /// `{results}/{id}_out{ext}`
    pub fn annotated_image_path(&self, id: &ArtifactId, extension: &str) -> PathBuf {
        self.results_root.join(annotated_image_key(id, extension))
    }

    /// Persist an upload under a freshly generated ID
    ///
    /// Existing artifacts are never replaced: an ID whose key is already taken
    /// is discarded and a new one drawn.
    pub async fn store_upload(&self, extension: &str, data: Bytes) -> Result<(ArtifactId, PathBuf)> {
        self.store_upload_with(ArtifactId::generate, extension, data).await
    }

    async fn store_upload_with(
        &self,
        mut next_id: impl FnMut() -> ArtifactId,
        extension: &str,
        data: Bytes,
    ) -> Result<(ArtifactId, PathBuf)> {
        let mut attempt = 1;
        loop {
            let id = next_id();
            match self.persist_upload(&id, extension, data.clone()).await {
                Ok(path) => return Ok((id, path)),
                Err(StorageError::AlreadyExists(key)) if attempt < MAX_ID_ATTEMPTS => {
                    tracing::warn!(key, attempt, "Artifact ID collision, drawing a new one");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Persist raw upload bytes under `{id}{ext}` and return the on-disk path
    pub async fn persist_upload(&self, id: &ArtifactId, extension: &str, data: Bytes) -> Result<PathBuf> {
        let key = upload_key(id, extension);
        put(self.uploads.as_ref(), &key, data).await?;
        Ok(self.upload_path(id, extension))
    }

    /// Persist the rendered visualization for an image under `{id}_out{ext}`
    pub async fn persist_annotated_image(
        &self,
        id: &ArtifactId,
        extension: &str,
        data: Bytes,
    ) -> Result<PathBuf> {
        let key = annotated_image_key(id, extension);
        put(self.results.as_ref(), &key, data).await?;
        Ok(self.annotated_image_path(id, extension))
    }

    /// Read an artifact by its path relative to the results root
    pub async fn fetch_result(&self, relative: &str) -> Result<Bytes> {
        let path = StoragePath::parse(relative)
            .map_err(|e| StorageError::InvalidPath(format!("{relative}: {e}")))?;
        if path.as_ref().is_empty() {
            return Err(StorageError::InvalidPath(relative.to_string()));
        }

        let result = match self.results.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(relative.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = result.bytes().await?;
        tracing::debug!(key = relative, size = bytes.len(), "Read result artifact");
        Ok(bytes)
    }
}

fn upload_key(id: &ArtifactId, extension: &str) -> String {
    format!("{id}{extension}")
}

fn annotated_image_key(id: &ArtifactId, extension: &str) -> String {
    format!("{id}_out{extension}")
}

/// Create the root (no error if present) and wrap it in a local object store
fn local_store(root: &Path) -> Result<Arc<dyn ObjectStore>> {
    let unavailable = |source| StorageError::RootUnavailable {
        path: root.display().to_string(),
        source,
    };

    std::fs::create_dir_all(root).map_err(unavailable)?;
    let store = LocalFileSystem::new_with_prefix(root)?;
    Ok(Arc::new(store))
}

/// Write `data` under `key`, failing if the key already holds an artifact
async fn put(store: &dyn ObjectStore, key: &str, data: Bytes) -> Result<()> {
    let size = data.len();
    match store
        .put_opts(&StoragePath::from(key), data.into(), PutMode::Create.into())
        .await
    {
        Ok(_) => {}
        Err(object_store::Error::AlreadyExists { .. }) => {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        Err(source) => {
            return Err(StorageError::WriteFailed {
                key: key.to_string(),
                source,
            });
        }
    }

    tracing::debug!(key, size, "Stored artifact");
    Ok(())
}
