use crate::scope::RequestScope;
use crate::traits::{
    ByteStream, ContentResponse, StorageError, StorageHandler, StorageResult, ThumbRequest,
};
use crate::PolicyType;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use futures::StreamExt;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

const API_PREFIX: &str = "/api/v3/slave";

/// Signs slave API paths with the policy's shared secret.
///
/// A signature is `<base64url(hmac)>:<expires>` where the MAC covers
/// `<path>:<expires>` and `expires` is a unix timestamp (0 = never).
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    pub fn sign(&self, path: &str, expires: u64) -> StorageResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| StorageError::ConfigError(format!("Invalid signing secret: {}", e)))?;
        mac.update(format!("{}:{}", path, expires).as_bytes());
        let digest = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{}:{}", digest, expires))
    }

    /// Sign with an expiry `ttl` from now.
    pub fn sign_for(&self, path: &str, ttl: Duration) -> StorageResult<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StorageError::ConfigError(format!("System clock error: {}", e)))?;
        self.sign(path, (now + ttl).as_secs())
    }
}

/// Handler for files stored on a slave node.
///
/// Every request targets the slave's HTTP API; thumbnails are served by the
/// slave itself through a signed redirect.
#[derive(Clone)]
pub struct SlaveHandler {
    client: reqwest::Client,
    server: String,
    signer: UrlSigner,
}

impl SlaveHandler {
    pub fn new(server: &str, secret: &str, timeout: Duration) -> StorageResult<Self> {
        let server = server.trim_end_matches('/').to_string();
        if !server.starts_with("http://") && !server.starts_with("https://") {
            return Err(StorageError::ConfigError(format!(
                "Slave server must be an http(s) URL: {}",
                server
            )));
        }
        if secret.is_empty() {
            return Err(StorageError::ConfigError(
                "Slave policy has no secret key".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            server,
            signer: UrlSigner::new(secret),
        })
    }

    fn api_path(action: &str, name: &str) -> String {
        format!(
            "{}/{}/{}",
            API_PREFIX,
            action,
            URL_SAFE_NO_PAD.encode(name.as_bytes())
        )
    }

    /// Absolute signed URL for `action` on `name`.
    pub fn signed_url(&self, action: &str, name: &str, ttl: Duration) -> StorageResult<String> {
        let path = Self::api_path(action, name);
        let sign = self.signer.sign_for(&path, ttl)?;
        Ok(format!(
            "{}{}?sign={}",
            self.server,
            path,
            urlencoding::encode(&sign)
        ))
    }

    fn check_status(
        name: &str,
        response: reqwest::Response,
        map: fn(String) -> StorageError,
    ) -> StorageResult<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            return Err(map(format!("Slave responded with {}", status)));
        }
        Ok(response)
    }

    async fn download(&self, name: &str) -> StorageResult<ByteStream> {
        let url = self.signed_url("download", name, Duration::from_secs(60))?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;
        let response = Self::check_status(name, response, StorageError::DownloadFailed)?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StorageError::DownloadFailed(e.to_string())));
        Ok(Box::pin(stream))
    }

    async fn upload(&self, name: &str, data: Bytes) -> StorageResult<u64> {
        let size = data.len() as u64;
        let url = self.signed_url("upload", name, Duration::from_secs(60))?;
        let response = self
            .client
            .put(&url)
            .body(data)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        Self::check_status(name, response, StorageError::UploadFailed)?;
        Ok(size)
    }
}

#[async_trait]
impl StorageHandler for SlaveHandler {
    async fn get(&self, scope: &RequestScope, name: &str) -> StorageResult<ByteStream> {
        scope.run(self.download(name)).await
    }

    async fn put(&self, scope: &RequestScope, name: &str, data: Bytes) -> StorageResult<u64> {
        let start = std::time::Instant::now();
        let written = scope.run(self.upload(name, data)).await?;

        tracing::debug!(
            server = %self.server,
            key = %name,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Slave put successful"
        );

        Ok(written)
    }

    async fn delete(&self, scope: &RequestScope, names: &[String]) -> StorageResult<Vec<String>> {
        let path = format!("{}/delete", API_PREFIX);
        let sign = self.signer.sign_for(&path, Duration::from_secs(60))?;
        let body = serde_json::json!({ "files": names });

        let request = async {
            let response = self
                .client
                .post(format!("{}{}", self.server, path))
                .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", sign))
                .json(&body)
                .send()
                .await
                .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

            if !response.status().is_success() {
                return Err(StorageError::DeleteFailed(format!(
                    "Slave responded with {}",
                    response.status()
                )));
            }

            // The slave answers with the names it failed to remove.
            let failed: Vec<String> = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("failed").cloned())
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            Ok(failed)
        };

        match scope.run(request).await {
            Ok(failed) => Ok(failed),
            Err(e) => {
                tracing::warn!(server = %self.server, error = %e, "Slave delete failed");
                Ok(names.to_vec())
            }
        }
    }

    async fn thumb(
        &self,
        _scope: &RequestScope,
        request: &ThumbRequest<'_>,
    ) -> StorageResult<ContentResponse> {
        let url = self.signed_url("thumb", request.source_name, request.expires_in)?;
        Ok(ContentResponse::redirect(url))
    }

    fn policy_type(&self) -> PolicyType {
        PolicyType::Remote
    }
}
