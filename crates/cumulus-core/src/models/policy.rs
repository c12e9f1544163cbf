use serde::{Deserialize, Serialize};

use crate::storage_types::PolicyType;

/// Storage policy a file belongs to. Read-only for the derivative pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePolicy {
    pub id: i64,
    pub name: String,
    pub policy_type: PolicyType,
    /// Object store endpoint or slave node base URL.
    pub server: Option<String>,
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
}

impl StoragePolicy {
    /// A local-disk policy with no remote configuration.
    pub fn local(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            policy_type: PolicyType::Local,
            server: None,
            bucket_name: None,
            region: None,
            access_key: None,
            secret_key: None,
        }
    }
}
