//! Cumulus Core Library
//!
//! Domain models, error types, configuration and the dynamic settings
//! abstraction shared by every Cumulus crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod settings;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, NodeMode};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{File, StoragePolicy, ThumbSize};
pub use settings::{is_true_val, MemorySettings, SettingsProvider};
pub use storage_types::PolicyType;
