use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::ApiKeyRepo,
    },
    models::{ApiKey, CreateApiKey},
};

pub struct SqliteApiKeyRepo {
    pool: SqlitePool,
}

impl SqliteApiKeyRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_api_key(row: &sqlx::sqlite::SqliteRow) -> ApiKey {
        ApiKey {
            id: row.get("id"),
            key_prefix: row.get("key_prefix"),
            description: row.get("description"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl ApiKeyRepo for SqliteApiKeyRepo {
    async fn create(
        &self,
        input: CreateApiKey,
        key_hash: &str,
        key_prefix: &str,
    ) -> DbResult<ApiKey> {
        let now = Utc::now();

        let row = sqlx::query(
            r#"
            INSERT INTO api_keys (key_hash, key_prefix, description, is_active, created_at)
            VALUES (?, ?, ?, 1, ?)
            RETURNING id, key_prefix, description, is_active, created_at
            "#,
        )
        .bind(key_hash)
        .bind(key_prefix)
        .bind(&input.description)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict("API key with this hash already exists".to_string())
            }
            _ => DbError::from(e),
        })?;

        Ok(Self::parse_api_key(&row))
    }

    async fn get_active_by_hash(&self, key_hash: &str) -> DbResult<Option<ApiKey>> {
        let row = sqlx::query(
            r#"
            SELECT id, key_prefix, description, is_active, created_at
            FROM api_keys
            WHERE key_hash = ? AND is_active = 1
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::parse_api_key))
    }

    async fn list(&self) -> DbResult<Vec<ApiKey>> {
        let rows = sqlx::query(
            r#"
            SELECT id, key_prefix, description, is_active, created_at
            FROM api_keys
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::parse_api_key).collect())
    }

    async fn set_active(&self, id: i64, is_active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE api_keys SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
