use crate::scope::RequestScope;
use crate::traits::{
    ByteStream, ContentResponse, StorageError, StorageHandler, StorageResult, ThumbRequest,
};
use crate::PolicyType;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem handler
///
/// Serves every local-policy file below one root directory. Thumbnails are
/// returned inline.
#[derive(Clone)]
pub struct LocalHandler {
    base_path: PathBuf,
}

impl LocalHandler {
    /// Create a new LocalHandler rooted at `base_path` (e.g. "/var/lib/cumulus/uploads").
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalHandler { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert a source name to a filesystem path below the root.
    ///
    /// Rejects absolute names and any `..` component so a name can never
    /// resolve outside the storage directory.
    fn key_to_path(&self, name: &str) -> StorageResult<PathBuf> {
        if name.is_empty() || name.starts_with('/') || name.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "Storage key must be relative: {:?}",
                name
            )));
        }

        let relative = Path::new(name);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        Ok(self.base_path.join(relative))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn open(&self, name: &str) -> StorageResult<ByteStream> {
        let path = self.key_to_path(name)?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(e) => {
                return Err(StorageError::DownloadFailed(format!(
                    "Failed to open file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let key = name.to_string();
        let stream = tokio_util::io::ReaderStream::new(file).map(move |result| {
            result.map_err(|e| {
                tracing::error!(key = %key, error = %e, "Local storage stream read error");
                StorageError::DownloadFailed(format!("Failed to read chunk: {}", e))
            })
        });

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl StorageHandler for LocalHandler {
    async fn get(&self, scope: &RequestScope, name: &str) -> StorageResult<ByteStream> {
        scope.run(self.open(name)).await
    }

    async fn put(&self, scope: &RequestScope, name: &str, data: Bytes) -> StorageResult<u64> {
        let path = self.key_to_path(name)?;
        let start = std::time::Instant::now();

        let write = async {
            self.ensure_parent_dir(&path).await?;

            let mut file = fs::File::create(&path).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to create file {}: {}",
                    path.display(),
                    e
                ))
            })?;

            file.write_all(&data).await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
            })?;

            file.sync_all().await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
            })?;

            Ok(data.len() as u64)
        };
        let written = scope.run(write).await?;

        tracing::debug!(
            path = %path.display(),
            key = %name,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage put successful"
        );

        Ok(written)
    }

    async fn delete(&self, _scope: &RequestScope, names: &[String]) -> StorageResult<Vec<String>> {
        let mut failed = Vec::new();

        for name in names {
            let path = match self.key_to_path(name) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(key = %name, error = %e, "Refusing to delete invalid key");
                    failed.push(name.clone());
                    continue;
                }
            };

            match fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), key = %name, "Local storage delete successful");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete file");
                    failed.push(name.clone());
                }
            }
        }

        Ok(failed)
    }

    async fn thumb(
        &self,
        scope: &RequestScope,
        request: &ThumbRequest<'_>,
    ) -> StorageResult<ContentResponse> {
        let content = self.get(scope, request.thumb_name).await?;
        Ok(ContentResponse::inline(content))
    }

    fn local_path(&self, name: &str) -> Option<PathBuf> {
        self.key_to_path(name).ok()
    }

    fn policy_type(&self) -> PolicyType {
        PolicyType::Local
    }
}
