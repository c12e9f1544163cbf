//! Storage handler abstraction
//!
//! This module defines the StorageHandler trait that all storage backends must implement.

use crate::scope::RequestScope;
use crate::PolicyType;
use async_trait::async_trait;
use bytes::Bytes;
use cumulus_core::{File, ThumbSize};
use futures::{Stream, StreamExt};
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out")]
    Timeout,
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// What a handler returns for a thumbnail: either a redirect the client
/// should follow, or the thumbnail bytes themselves.
pub struct ContentResponse {
    pub redirect: bool,
    pub url: Option<String>,
    pub content: Option<ByteStream>,
    /// Cache max-age in seconds, stamped by the pipeline on master nodes.
    pub max_age: Option<u32>,
}

impl ContentResponse {
    pub fn redirect(url: impl Into<String>) -> Self {
        Self {
            redirect: true,
            url: Some(url.into()),
            content: None,
            max_age: None,
        }
    }

    pub fn inline(content: ByteStream) -> Self {
        Self {
            redirect: false,
            url: None,
            content: Some(content),
            max_age: None,
        }
    }
}

impl fmt::Debug for ContentResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentResponse")
            .field("redirect", &self.redirect)
            .field("url", &self.url)
            .field("content", &self.content.as_ref().map(|_| "<stream>"))
            .field("max_age", &self.max_age)
            .finish()
    }
}

/// Contextual parameters of a thumbnail fetch.
#[derive(Debug, Clone, Copy)]
pub struct ThumbRequest<'a> {
    pub source_name: &'a str,
    /// `<source_name><thumb suffix>`
    pub thumb_name: &'a str,
    pub size: ThumbSize,
    pub file: &'a File,
    /// Lifetime of signed URLs handed out for redirects.
    pub expires_in: Duration,
}

/// Storage handler trait
///
/// One handler serves all files of one storage policy. The pipeline only
/// needs byte-level access plus the backend's own idea of how a thumbnail
/// is served.
#[async_trait]
pub trait StorageHandler: Send + Sync {
    /// Open a file for reading.
    async fn get(&self, scope: &RequestScope, name: &str) -> StorageResult<ByteStream>;

    /// Create or overwrite a file, returning the number of bytes written.
    async fn put(&self, scope: &RequestScope, name: &str, data: Bytes) -> StorageResult<u64>;

    /// Delete files. Missing files are not an error; returns the names that
    /// could not be deleted.
    async fn delete(&self, scope: &RequestScope, names: &[String]) -> StorageResult<Vec<String>>;

    /// Fetch an existing thumbnail.
    async fn thumb(
        &self,
        scope: &RequestScope,
        request: &ThumbRequest<'_>,
    ) -> StorageResult<ContentResponse>;

    /// Path of the file on this node's filesystem, if the backend has one.
    fn local_path(&self, _name: &str) -> Option<PathBuf> {
        None
    }

    fn policy_type(&self) -> PolicyType;
}

/// Drain a byte stream into memory.
pub async fn read_to_end(mut stream: ByteStream) -> StorageResult<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}
