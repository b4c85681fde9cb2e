mod activation;
mod api_keys;
mod catalog;
mod numbers;
mod orphans;
mod stats;

use std::sync::Arc;

pub use activation::{ActivationReply, ActivationRequest, ActivationService};
pub use api_keys::ApiKeyService;
pub use catalog::{CatalogSeed, CatalogService, SeedError, SeedSummary};
pub use numbers::{IMPORT_BATCH_SIZE, NumberOrigin, NumberService};
pub use orphans::OrphanService;
pub use stats::StatsService;

use crate::{db::DbPool, sms::PendingSessions};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub activation: ActivationService,
    pub api_keys: ApiKeyService,
    pub catalog: CatalogService,
    pub numbers: NumberService,
    pub orphans: OrphanService,
    pub stats: StatsService,
}

impl Services {
    pub fn new(db: Arc<DbPool>, pending: PendingSessions, balance: i64) -> Self {
        Self {
            activation: ActivationService::new(db.clone(), pending, balance),
            api_keys: ApiKeyService::new(db.clone()),
            catalog: CatalogService::new(db.clone()),
            numbers: NumberService::new(db.clone()),
            orphans: OrphanService::new(db.clone()),
            stats: StatsService::new(db),
        }
    }
}
