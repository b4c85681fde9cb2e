mod api_keys;
mod catalog;
mod common;
mod maintenance;
mod orphans;
mod phone_numbers;
mod sessions;

pub use api_keys::SqliteApiKeyRepo;
pub use catalog::SqliteCatalogRepo;
pub use maintenance::SqliteMaintenanceRepo;
pub use orphans::SqliteOrphanRepo;
pub use phone_numbers::SqlitePhoneNumberRepo;
pub use sessions::SqliteSessionRepo;
