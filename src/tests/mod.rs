//! Crate-level tests: HTTP flows through the full router, the SMPP listener
//! over loopback TCP, and the deployment artifacts.


#[cfg(feature = "database-sqlite")]
use std::{sync::Arc, time::Duration};

#[cfg(feature = "database-sqlite")]
use crate::{
    AppState, config::SmsGateConfig, db::DbPool, db::tests::harness::sqlite_db,
    services::Services, sms::PendingSessions,
};

/// State over a fresh in-memory database, as `AppState::new` would build it.
#[cfg(feature = "database-sqlite")]
async fn test_state(config: SmsGateConfig) -> (AppState, Arc<DbPool>) {
    let db = Arc::new(sqlite_db().await);
    let pending = PendingSessions::new(Duration::from_secs(5));
    let services = Services::new(db.clone(), pending.clone(), config.api.balance);
    let state = AppState {
        config: Arc::new(config),
        db: Some(db.clone()),
        services: Some(services),
        pending,
        task_tracker: tokio_util::task::TaskTracker::new(),
    };
    (state, db)
}
