//! File repository: lookups on the files and policies tables plus the
//! picture-info write-back.

use async_trait::async_trait;
use cumulus_core::{AppError, File, PolicyType, StoragePolicy};
use sqlx::{PgPool, Postgres};

/// Row type for the files table (for FromRow).
#[derive(Debug, sqlx::FromRow)]
pub struct FileRow {
    pub id: i64,
    pub name: String,
    pub source_name: String,
    pub size: i64,
    pub pic_info: String,
    pub policy_id: i64,
}

impl FileRow {
    pub fn into_file(self) -> File {
        File {
            id: Some(self.id),
            name: self.name,
            source_name: self.source_name,
            // The column carries a non-negative CHECK.
            size: u64::try_from(self.size).unwrap_or_default(),
            pic_info: self.pic_info,
            policy_id: self.policy_id,
        }
    }
}

/// Row type for the policies table (for FromRow).
#[derive(Debug, sqlx::FromRow)]
pub struct PolicyRow {
    pub id: i64,
    pub name: String,
    pub policy_type: PolicyType,
    pub server: Option<String>,
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl PolicyRow {
    pub fn into_policy(self) -> StoragePolicy {
        StoragePolicy {
            id: self.id,
            name: self.name,
            policy_type: self.policy_type,
            server: self.server,
            bucket_name: self.bucket_name,
            region: self.region,
            access_key: self.access_key,
            secret_key: self.secret_key,
        }
    }
}

/// Reads files and their policies, and records generated picture-info.
#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn get_file(&self, id: i64) -> Result<Option<File>, AppError>;

    async fn get_policy(&self, id: i64) -> Result<Option<StoragePolicy>, AppError>;

    /// Overwrite the picture-info of a persisted file.
    async fn update_pic_info(&self, id: i64, pic_info: &str) -> Result<(), AppError>;
}

/// Postgres implementation of [`FileRepository`].
#[derive(Clone)]
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    #[tracing::instrument(skip(self), fields(db.table = "files", db.record_id = %id))]
    async fn get_file(&self, id: i64) -> Result<Option<File>, AppError> {
        let row: Option<FileRow> = sqlx::query_as::<Postgres, FileRow>(
            "SELECT id, name, source_name, size, pic_info, policy_id FROM files WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FileRow::into_file))
    }

    #[tracing::instrument(skip(self), fields(db.table = "policies", db.record_id = %id))]
    async fn get_policy(&self, id: i64) -> Result<Option<StoragePolicy>, AppError> {
        let row: Option<PolicyRow> = sqlx::query_as::<Postgres, PolicyRow>(
            r#"
            SELECT id, name, policy_type, server, bucket_name, region,
                   access_key, secret_key
            FROM policies
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PolicyRow::into_policy))
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.record_id = %id))]
    async fn update_pic_info(&self, id: i64, pic_info: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE files SET pic_info = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(pic_info)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("File {} not found", id)));
        }
        Ok(())
    }
}
