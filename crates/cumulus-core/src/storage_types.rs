use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage policy types
///
/// Selects which storage handler serves the files of a policy.
/// It's defined in core because it's used in configuration and database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "policy_type", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    /// Files live on the local disk of this node.
    Local,
    /// S3-compatible object storage.
    S3,
    /// Files live on a slave node reached over HTTP.
    Remote,
}

impl PolicyType {
    pub fn is_local(&self) -> bool {
        matches!(self, PolicyType::Local)
    }
}

impl FromStr for PolicyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(PolicyType::Local),
            "s3" => Ok(PolicyType::S3),
            "remote" => Ok(PolicyType::Remote),
            _ => Err(anyhow::anyhow!("Invalid policy type: {}", s)),
        }
    }
}

impl Display for PolicyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PolicyType::Local => write!(f, "local"),
            PolicyType::S3 => write!(f, "s3"),
            PolicyType::Remote => write!(f, "remote"),
        }
    }
}
