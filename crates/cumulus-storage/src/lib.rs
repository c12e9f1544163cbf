//! Cumulus Storage Library
//!
//! This crate provides the storage handler abstraction and one implementation
//! per storage policy type: local filesystem, S3-compatible object storage and
//! slave nodes reached over HTTP.
//!
//! # Derivative names
//!
//! Handlers never invent derivative names. The caller passes the full name
//! (`<source_name><suffix>`) so every backend stays addressable by the same
//! convention.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod scope;
#[cfg(feature = "storage-slave")]
pub mod slave;
pub mod traits;

// Re-export commonly used types
pub use cumulus_core::PolicyType;
pub use factory::{create_handler, HandlerProvider, PolicyHandlerProvider};
#[cfg(feature = "storage-local")]
pub use local::LocalHandler;
#[cfg(feature = "storage-s3")]
pub use s3::ObjectStoreHandler;
pub use scope::RequestScope;
#[cfg(feature = "storage-slave")]
pub use slave::SlaveHandler;
pub use traits::{
    read_to_end, ByteStream, ContentResponse, StorageError, StorageHandler, StorageResult,
    ThumbRequest,
};
