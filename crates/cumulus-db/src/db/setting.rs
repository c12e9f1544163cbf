//! Settings table exposed as a [`SettingsProvider`].

use async_trait::async_trait;
use cumulus_core::SettingsProvider;
use sqlx::PgPool;

/// Reads hot settings straight from the `settings` table on every call.
#[derive(Clone)]
pub struct PgSettings {
    pool: PgPool,
}

impl PgSettings {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsProvider for PgSettings {
    #[tracing::instrument(skip(self), fields(db.table = "settings"))]
    async fn get(&self, key: &str) -> Option<String> {
        let result: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT value FROM settings WHERE name = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await;

        match result {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to read setting, using default");
                None
            }
        }
    }
}
