use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{NewPhoneNumber, PhoneNumber, PhoneNumberFilter},
};

#[async_trait]
pub trait PhoneNumberRepo: Send + Sync {
    async fn get_by_number(&self, number: &str) -> DbResult<Option<PhoneNumber>>;

    /// The subset of `numbers` already present in the pool.
    async fn existing_numbers(&self, numbers: &[String]) -> DbResult<Vec<String>>;

    /// Insert numbers, skipping any that already exist. Returns rows inserted.
    async fn insert_many(&self, numbers: &[NewPhoneNumber]) -> DbResult<u64>;

    /// Delete numbers matching every set field of `filter`.
    async fn delete_matching(&self, filter: &PhoneNumberFilter) -> DbResult<u64>;

    /// Reassign `sort_order` as a random permutation of 1..=n.
    async fn shuffle(&self) -> DbResult<u64>;

    /// Active, free numbers in a country.
    async fn count_available(&self, country_id: i64) -> DbResult<i64>;

    /// Providers owning at least one number in a country.
    async fn provider_ids_in_country(&self, country_id: i64) -> DbResult<Vec<i64>>;
}
