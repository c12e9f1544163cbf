//! Database repositories for data access layer
//!
//! `file` holds the file and storage-policy lookups the derivative pipeline
//! needs; `setting` exposes the settings table as a [`SettingsProvider`].
//!
//! [`SettingsProvider`]: cumulus_core::SettingsProvider

pub mod file;
pub mod setting;

pub use file::{FileRepository, FileRow, PgFileRepository, PolicyRow};
pub use setting::PgSettings;

use anyhow::{Context, Result};
use cumulus_core::Config;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Connect to Postgres and apply pending migrations.
pub async fn connect(config: &Config) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connected successfully"
    );

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
