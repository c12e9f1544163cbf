use crate::scope::RequestScope;
use crate::traits::{
    ByteStream, ContentResponse, StorageError, StorageHandler, StorageResult, ThumbRequest,
};
use crate::PolicyType;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload, Result as ObjectResult};

/// S3-compatible object storage handler
///
/// Thumbnails are expected to be produced out of band (or by a previous
/// generation on another node) and are served as presigned redirects.
#[derive(Clone)]
pub struct ObjectStoreHandler {
    store: AmazonS3,
    bucket: String,
}

impl ObjectStoreHandler {
    /// Create a new ObjectStoreHandler
    ///
    /// # Arguments
    /// * `bucket` - bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `credentials` - Optional `(access_key, secret_key)`; falls back to the environment
    pub fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        credentials: Option<(String, String)>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder.with_endpoint(endpoint).with_allow_http(allow_http);
        }

        if let Some((access_key, secret_key)) = credentials {
            builder = builder
                .with_access_key_id(access_key)
                .with_secret_access_key(secret_key);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(ObjectStoreHandler { store, bucket })
    }

    async fn open(&self, name: &str) -> StorageResult<ByteStream> {
        let start = std::time::Instant::now();
        let location = Path::from(name.to_string());

        let result: ObjectResult<_> = self.store.get(&location).await;
        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(name.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %name,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 get failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let stream = result
            .into_stream()
            .map(|res| res.map_err(|e| StorageError::DownloadFailed(e.to_string())));

        Ok(Box::pin(stream))
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        let location = Path::from(name.to_string());
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }
}

#[async_trait]
impl StorageHandler for ObjectStoreHandler {
    async fn get(&self, scope: &RequestScope, name: &str) -> StorageResult<ByteStream> {
        scope.run(self.open(name)).await
    }

    async fn put(&self, scope: &RequestScope, name: &str, data: Bytes) -> StorageResult<u64> {
        let size = data.len() as u64;
        let location = Path::from(name.to_string());
        let start = std::time::Instant::now();

        let upload = async {
            let result: ObjectResult<_> = self.store.put(&location, PutPayload::from(data)).await;
            result.map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %name,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 put failed"
                );
                StorageError::UploadFailed(e.to_string())
            })
        };
        scope.run(upload).await?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %name,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put successful"
        );

        Ok(size)
    }

    async fn delete(&self, _scope: &RequestScope, names: &[String]) -> StorageResult<Vec<String>> {
        let mut failed = Vec::new();

        for name in names {
            let location = Path::from(name.to_string());
            match self.store.delete(&location).await {
                Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        bucket = %self.bucket,
                        key = %name,
                        "S3 delete failed"
                    );
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
        if !scope.run(self.exists(request.thumb_name)).await? {
            return Err(StorageError::NotFound(request.thumb_name.to_string()));
        }

        let location = Path::from(request.thumb_name.to_string());
        let url_result: ObjectResult<_> = self
            .store
            .signed_url(Method::GET, &location, request.expires_in)
            .await;
        let url = url_result
            .map_err(|e| StorageError::BackendError(e.to_string()))?
            .to_string();

        Ok(ContentResponse::redirect(url))
    }

    fn policy_type(&self) -> PolicyType {
        PolicyType::S3
    }
}
