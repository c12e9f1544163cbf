//! Cumulus database layer
//!
//! Postgres-backed access to files, storage policies and the hot settings
//! table.

pub mod db;

pub use db::{connect, FileRepository, PgFileRepository, PgSettings};
