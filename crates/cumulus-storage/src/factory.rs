#[cfg(feature = "storage-local")]
use crate::LocalHandler;
#[cfg(feature = "storage-s3")]
use crate::ObjectStoreHandler;
#[cfg(feature = "storage-slave")]
use crate::SlaveHandler;
use crate::{PolicyType, StorageError, StorageHandler, StorageResult};
use async_trait::async_trait;
use cumulus_core::StoragePolicy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Resolves the handler that serves a storage policy.
#[async_trait]
pub trait HandlerProvider: Send + Sync {
    async fn handler_for(&self, policy: &StoragePolicy) -> StorageResult<Arc<dyn StorageHandler>>;
}

/// Create a storage handler for one policy
pub async fn create_handler(
    policy: &StoragePolicy,
    local_root: &Path,
    slave_timeout: Duration,
) -> StorageResult<Arc<dyn StorageHandler>> {
    match policy.policy_type {
        #[cfg(feature = "storage-local")]
        PolicyType::Local => {
            let handler = LocalHandler::new(local_root).await?;
            Ok(Arc::new(handler))
        }

        #[cfg(not(feature = "storage-local"))]
        PolicyType::Local => {
            let _ = local_root;
            Err(StorageError::ConfigError(
                "Local storage backend not available (storage-local feature not enabled)"
                    .to_string(),
            ))
        }

        #[cfg(feature = "storage-s3")]
        PolicyType::S3 => {
            let bucket = policy.bucket_name.clone().ok_or_else(|| {
                StorageError::ConfigError(format!("Policy {} has no bucket", policy.id))
            })?;
            let region = policy
                .region
                .clone()
                .unwrap_or_else(|| "us-east-1".to_string());
            let credentials = policy.access_key.clone().zip(policy.secret_key.clone());

            let handler =
                ObjectStoreHandler::new(bucket, region, policy.server.clone(), credentials)?;
            Ok(Arc::new(handler))
        }

        #[cfg(not(feature = "storage-s3"))]
        PolicyType::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-slave")]
        PolicyType::Remote => {
            let server = policy.server.as_deref().ok_or_else(|| {
                StorageError::ConfigError(format!("Policy {} has no slave server", policy.id))
            })?;
            let secret = policy.secret_key.as_deref().unwrap_or_default();

            let handler = SlaveHandler::new(server, secret, slave_timeout)?;
            Ok(Arc::new(handler))
        }

        #[cfg(not(feature = "storage-slave"))]
        PolicyType::Remote => {
            let _ = slave_timeout;
            Err(StorageError::ConfigError(
                "Slave storage backend not available (storage-slave feature not enabled)"
                    .to_string(),
            ))
        }
    }
}

/// [`HandlerProvider`] that builds handlers on demand and caches them per
/// policy id.
pub struct PolicyHandlerProvider {
    local_root: PathBuf,
    slave_timeout: Duration,
    handlers: RwLock<HashMap<i64, Arc<dyn StorageHandler>>>,
}

impl PolicyHandlerProvider {
    pub fn new(local_root: impl Into<PathBuf>, slave_timeout: Duration) -> Self {
        Self {
            local_root: local_root.into(),
            slave_timeout,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, policy_id: i64) -> Option<Arc<dyn StorageHandler>> {
        let guard = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        guard.get(&policy_id).cloned()
    }
}

#[async_trait]
impl HandlerProvider for PolicyHandlerProvider {
    async fn handler_for(&self, policy: &StoragePolicy) -> StorageResult<Arc<dyn StorageHandler>> {
        if let Some(handler) = self.cached(policy.id) {
            return Ok(handler);
        }

        let handler = create_handler(policy, &self.local_root, self.slave_timeout).await?;
        tracing::debug!(
            policy_id = policy.id,
            policy_type = %policy.policy_type,
            "Storage handler created"
        );

        let mut guard = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let handler = guard.entry(policy.id).or_insert(handler).clone();
        Ok(handler)
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_policy_handler_is_cached() {
        let dir = tempdir().unwrap();
        let provider = PolicyHandlerProvider::new(dir.path(), Duration::from_secs(5));
        let policy = StoragePolicy::local(1, "default");

        let first = provider.handler_for(&policy).await.unwrap();
        let second = provider.handler_for(&policy).await.unwrap();

        assert_eq!(first.policy_type(), PolicyType::Local);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[cfg(feature = "storage-s3")]
    #[tokio::test]
    async fn test_s3_policy_without_bucket_is_config_error() {
        let dir = tempdir().unwrap();
        let mut policy = StoragePolicy::local(2, "s3");
        policy.policy_type = PolicyType::S3;

        let result = create_handler(&policy, dir.path(), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }

    #[cfg(feature = "storage-slave")]
    #[tokio::test]
    async fn test_remote_policy_builds_slave_handler() {
        let dir = tempdir().unwrap();
        let mut policy = StoragePolicy::local(3, "slave");
        policy.policy_type = PolicyType::Remote;
        policy.server = Some("https://slave.example.com".to_string());
        policy.secret_key = Some("secret".to_string());

        let handler = create_handler(&policy, dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(handler.policy_type(), PolicyType::Remote);
    }
}
