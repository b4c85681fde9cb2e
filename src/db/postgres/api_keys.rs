use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::ApiKeyRepo,
    },
    models::{ApiKey, CreateApiKey},
};

pub struct PostgresApiKeyRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresApiKeyRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_api_key(row: &sqlx::postgres::PgRow) -> ApiKey {
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
impl ApiKeyRepo for PostgresApiKeyRepo {
    async fn create(
        &self,
        input: CreateApiKey,
        key_hash: &str,
        key_prefix: &str,
    ) -> DbResult<ApiKey> {
        let row = sqlx::query(
            r#"
            INSERT INTO api_keys (key_hash, key_prefix, description, is_active, created_at)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING id, key_prefix, description, is_active, created_at
            "#,
        )
        .bind(key_hash)
        .bind(key_prefix)
        .bind(&input.description)
        .bind(Utc::now())
        .fetch_one(&self.write_pool)
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
        // Keys are checked on every request; a lagging replica would reject new ones.
        let row = sqlx::query(
            r#"
            SELECT id, key_prefix, description, is_active, created_at
            FROM api_keys
            WHERE key_hash = $1 AND is_active
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.write_pool)
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
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows.iter().map(Self::parse_api_key).collect())
    }

    async fn set_active(&self, id: i64, is_active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE api_keys SET is_active = $1 WHERE id = $2")
            .bind(is_active)
            .bind(id)
            .execute(&self.write_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
