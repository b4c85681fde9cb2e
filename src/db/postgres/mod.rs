mod api_keys;
mod catalog;
mod common;
mod maintenance;
mod orphans;
mod phone_numbers;
mod sessions;

pub use api_keys::PostgresApiKeyRepo;
pub use catalog::PostgresCatalogRepo;
pub use maintenance::PostgresMaintenanceRepo;
pub use orphans::PostgresOrphanRepo;
pub use phone_numbers::PostgresPhoneNumberRepo;
pub use sessions::PostgresSessionRepo;
