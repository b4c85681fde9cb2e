//! Shared tests for ApiKeyRepo implementations

use crate::{
    db::{DbPool, error::DbError},
    models::{CreateApiKey, hash_api_key},
};

fn input(description: &str) -> CreateApiKey {
    CreateApiKey {
        description: Some(description.to_string()),
    }
}

async fn test_create_and_get_by_hash(db: &DbPool) {
    let repo = db.api_keys();
    let hash = hash_api_key("0123456789abcdef0123456789abcdef");

    let created = repo
        .create(input("reseller one"), &hash, "012345")
        .await
        .expect("Failed to create API key");

    assert_eq!(created.key_prefix, "012345");
    assert_eq!(created.description.as_deref(), Some("reseller one"));
    assert!(created.is_active);

    let fetched = repo
        .get_active_by_hash(&hash)
        .await
        .expect("Query failed")
        .expect("Key should exist");
    assert_eq!(fetched, created);

    let missing = repo
        .get_active_by_hash(&hash_api_key("nope"))
        .await
        .expect("Query failed");
    assert!(missing.is_none());
}

async fn test_duplicate_hash_conflicts(db: &DbPool) {
    let repo = db.api_keys();
    let hash = hash_api_key("same");

    repo.create(input("a"), &hash, "aaaaaa")
        .await
        .expect("First create should succeed");
    let result = repo.create(input("b"), &hash, "bbbbbb").await;

    assert!(matches!(result, Err(DbError::Conflict(_))));
}

async fn test_inactive_key_not_returned(db: &DbPool) {
    let repo = db.api_keys();
    let hash = hash_api_key("deactivate-me");
    let key = repo.create(input("x"), &hash, "dddddd").await.unwrap();

    repo.set_active(key.id, false).await.unwrap();
    assert!(repo.get_active_by_hash(&hash).await.unwrap().is_none());

    // Still listed for administration
    let listed = repo.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].is_active);

    repo.set_active(key.id, true).await.unwrap();
    assert!(repo.get_active_by_hash(&hash).await.unwrap().is_some());
}

async fn test_set_active_unknown_key(db: &DbPool) {
    let result = db.api_keys().set_active(9999, false).await;
    assert!(matches!(result, Err(DbError::NotFound)));
}

async fn test_list_ordered_by_id(db: &DbPool) {
    let repo = db.api_keys();
    for i in 0..3 {
        repo.create(input(&format!("key {i}")), &hash_api_key(&i.to_string()), "pppppp")
            .await
            .unwrap();
    }

    let listed = repo.list().await.unwrap();
    let descriptions: Vec<_> = listed
        .iter()
        .map(|k| k.description.clone().unwrap_or_default())
        .collect();
    assert_eq!(descriptions, vec!["key 0", "key 1", "key 2"]);
}

db_tests!(
    test_create_and_get_by_hash,
    test_duplicate_hash_conflicts,
    test_inactive_key_not_returned,
    test_set_active_unknown_key,
    test_list_ordered_by_id,
);
