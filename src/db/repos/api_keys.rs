use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{ApiKey, CreateApiKey},
};

#[async_trait]
pub trait ApiKeyRepo: Send + Sync {
    async fn create(&self, input: CreateApiKey, key_hash: &str, key_prefix: &str)
    -> DbResult<ApiKey>;

    /// Look up an active key by the SHA-256 of the raw key.
    async fn get_active_by_hash(&self, key_hash: &str) -> DbResult<Option<ApiKey>>;

    async fn list(&self) -> DbResult<Vec<ApiKey>>;

    async fn set_active(&self, id: i64, is_active: bool) -> DbResult<()>;
}
