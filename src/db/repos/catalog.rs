use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{
        AllowedSender, Country, CreateAllowedSender, CreateCountry, CreateOperator,
        CreateProvider, CreateService, Operator, Provider, Service,
    },
};

/// Services, allowed senders, countries, operators and providers.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    async fn list_services(&self) -> DbResult<Vec<Service>>;
    async fn get_service_by_code(&self, code: &str) -> DbResult<Option<Service>>;
    /// The service with the lowest id.
    async fn first_service(&self) -> DbResult<Option<Service>>;
    async fn create_service(&self, input: CreateService) -> DbResult<Service>;
    async fn count_services(&self) -> DbResult<i64>;

    async fn list_allowed_senders(&self, service_id: Option<i64>) -> DbResult<Vec<AllowedSender>>;
    async fn create_allowed_sender(&self, input: CreateAllowedSender) -> DbResult<AllowedSender>;

    async fn list_countries(&self) -> DbResult<Vec<Country>>;
    async fn create_country(&self, input: CreateCountry) -> DbResult<Country>;
    async fn count_countries(&self) -> DbResult<i64>;

    async fn list_operators(&self, country_id: Option<i64>) -> DbResult<Vec<Operator>>;
    async fn find_operator(&self, name: &str, country_id: i64) -> DbResult<Option<Operator>>;
    async fn create_operator(&self, input: CreateOperator) -> DbResult<Operator>;

    async fn list_providers(&self) -> DbResult<Vec<Provider>>;
    async fn list_active_providers(&self) -> DbResult<Vec<Provider>>;
    async fn create_provider(&self, input: CreateProvider) -> DbResult<Provider>;
}
