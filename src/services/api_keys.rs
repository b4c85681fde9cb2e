use std::sync::Arc;

use crate::{
    db::{DbPool, DbResult},
    models::{ApiKey, CreateApiKey, CreatedApiKey, api_key_prefix, generate_api_key, hash_api_key},
};

/// Service layer for reseller API keys
#[derive(Clone)]
pub struct ApiKeyService {
    db: Arc<DbPool>,
}

impl ApiKeyService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Create a new API key.
    /// Returns both the stored key and the raw key (only shown once)
    pub async fn create(&self, input: CreateApiKey) -> DbResult<CreatedApiKey> {
        let (raw_key, key_hash) = generate_api_key();
        let api_key = self
            .db
            .api_keys()
            .create(input, &key_hash, api_key_prefix(&raw_key))
            .await?;
        tracing::info!(api_key_id = api_key.id, prefix = %api_key.key_prefix, "API key created");
        Ok(CreatedApiKey {
            api_key,
            key: raw_key,
        })
    }

    /// Resolve a raw key to an active API key
    pub async fn authenticate(&self, raw_key: &str) -> DbResult<Option<ApiKey>> {
        self.db
            .api_keys()
            .get_active_by_hash(&hash_api_key(raw_key))
            .await
    }

    pub async fn list(&self) -> DbResult<Vec<ApiKey>> {
        self.db.api_keys().list().await
    }

    /// Disable or re-enable a key without deleting its sessions
    pub async fn set_active(&self, id: i64, is_active: bool) -> DbResult<()> {
        self.db.api_keys().set_active(id, is_active).await?;
        tracing::info!(api_key_id = id, is_active, "API key updated");
        Ok(())
    }
}
