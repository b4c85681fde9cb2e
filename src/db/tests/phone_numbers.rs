//! Shared tests for PhoneNumberRepo implementations

use super::harness::{numbers, seed_fixture};
use crate::{
    db::{DbPool, error::DbError},
    models::{CreateProvider, PhoneNumberFilter},
};

async fn test_insert_skips_existing(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    let repo = db.phone_numbers();

    let inserted = repo
        .insert_many(&numbers(&fixture, &["+79990000001", "+79990000002"]))
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let inserted = repo
        .insert_many(&numbers(&fixture, &["+79990000002", "+79990000003"]))
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let number = repo
        .get_by_number("+79990000003")
        .await
        .unwrap()
        .expect("Number should exist");
    assert!(number.is_active);
    assert!(!number.is_in_use);
    assert_eq!(number.country_id, fixture.country_id);
}

async fn test_insert_with_unknown_provider_rejected(db: &DbPool) {
    let mut fixture = seed_fixture(db).await;
    fixture.provider_id = 4242;

    let result = db
        .phone_numbers()
        .insert_many(&numbers(&fixture, &["+79990000001"]))
        .await;
    assert!(matches!(result, Err(DbError::Validation(_))));
}

async fn test_existing_numbers(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    let repo = db.phone_numbers();
    repo.insert_many(&numbers(&fixture, &["+1", "+2", "+3"]))
        .await
        .unwrap();

    let mut existing = repo
        .existing_numbers(&["+2".to_string(), "+3".to_string(), "+4".to_string()])
        .await
        .unwrap();
    existing.sort();
    assert_eq!(existing, vec!["+2", "+3"]);

    assert!(repo.existing_numbers(&[]).await.unwrap().is_empty());
}

async fn test_delete_matching(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    let repo = db.phone_numbers();
    let other = db
        .catalog()
        .create_provider(CreateProvider {
            name: "second".into(),
            smpp_host: "10.0.0.9".into(),
            smpp_port: 2775,
            system_id: "second".into(),
            password: String::new(),
            system_type: String::new(),
            is_active: true,
        })
        .await
        .unwrap();

    repo.insert_many(&numbers(&fixture, &["+1", "+2"])).await.unwrap();
    let mut theirs = numbers(&fixture, &["+3"]);
    theirs[0].provider_id = other.id;
    repo.insert_many(&theirs).await.unwrap();

    let empty = repo.delete_matching(&PhoneNumberFilter::default()).await;
    assert!(matches!(empty, Err(DbError::Validation(_))));

    let deleted = repo
        .delete_matching(&PhoneNumberFilter {
            provider_id: Some(fixture.provider_id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert!(repo.get_by_number("+3").await.unwrap().is_some());

    let deleted = repo
        .delete_matching(&PhoneNumberFilter {
            is_in_use: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(deleted, 0);
}

async fn test_shuffle_assigns_permutation(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    let repo = db.phone_numbers();
    let all = ["+11", "+12", "+13", "+14", "+15"];
    repo.insert_many(&numbers(&fixture, &all)).await.unwrap();

    assert_eq!(repo.shuffle().await.unwrap(), 5);

    let mut orders = Vec::new();
    for n in all {
        orders.push(repo.get_by_number(n).await.unwrap().unwrap().sort_order);
    }
    orders.sort();
    assert_eq!(orders, vec![1, 2, 3, 4, 5]);
}

async fn test_count_available(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    let repo = db.phone_numbers();
    repo.insert_many(&numbers(&fixture, &["+1", "+2", "+3"]))
        .await
        .unwrap();

    assert_eq!(repo.count_available(fixture.country_id).await.unwrap(), 3);
    assert_eq!(repo.count_available(99).await.unwrap(), 0);

    db.sessions()
        .reserve_number("+2", fixture.service_id, fixture.api_key_id, &|_| {})
        .await
        .unwrap();
    assert_eq!(repo.count_available(fixture.country_id).await.unwrap(), 2);
}

async fn test_provider_ids_in_country(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    let repo = db.phone_numbers();
    assert!(repo.provider_ids_in_country(fixture.country_id).await.unwrap().is_empty());

    repo.insert_many(&numbers(&fixture, &["+1", "+2"]))
        .await
        .unwrap();
    assert_eq!(
        repo.provider_ids_in_country(fixture.country_id).await.unwrap(),
        vec![fixture.provider_id]
    );
    assert!(repo.provider_ids_in_country(fixture.country_id + 1).await.unwrap().is_empty());
}

db_tests!(
    test_insert_skips_existing,
    test_insert_with_unknown_provider_rejected,
    test_existing_numbers,
    test_delete_matching,
    test_shuffle_assigns_permutation,
    test_count_available,
    test_provider_ids_in_country,
);
