//! `smsgate maintenance`: storage tuning, pruning and reindexing.
//!
//! Tasks run in the order setup, prune, reindex. The first failure stops the
//! run.

use chrono::Utc;

use crate::{
    config::{ConfigError, RetentionConfig},
    db::{DbError, DbPool},
    retention::{PruneResult, prune},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceTasks {
    pub setup: bool,
    pub prune: bool,
    pub reindex: bool,
}

impl MaintenanceTasks {
    pub fn is_empty(&self) -> bool {
        !(self.setup || self.prune || self.reindex)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{task} failed: {source}")]
    Task {
        task: &'static str,
        #[source]
        source: DbError,
    },
}

fn task_error(task: &'static str) -> impl FnOnce(DbError) -> MaintenanceError {
    move |source| MaintenanceError::Task { task, source }
}

/// What a maintenance run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub setup: bool,
    pub pruned: Option<PruneResult>,
    pub reindexed: bool,
}

/// Run the selected tasks.
///
/// Prune periods come from `[retention.periods]`, overridden by
/// `PRUNE_SMS_DAYS`, `PRUNE_ORPHAN_DAYS` and `PRUNE_SESSION_DAYS`.
pub async fn run(
    db: &DbPool,
    retention: &RetentionConfig,
    tasks: MaintenanceTasks,
) -> Result<MaintenanceReport, MaintenanceError> {
    let mut report = MaintenanceReport::default();
    let maintenance = db.maintenance();

    if tasks.setup {
        tracing::info!(backend = ?db.backend(), "Applying storage settings");
        maintenance.setup().await.map_err(task_error("setup"))?;
        report.setup = true;
    }

    if tasks.prune {
        let periods = retention.periods.with_env_overrides()?;
        tracing::info!(
            sms_days = periods.sms_days,
            orphan_days = periods.orphan_days,
            session_days = periods.session_days,
            "Pruning old data"
        );
        let result = prune(db, &periods, &retention.safety, Utc::now())
            .await
            .map_err(task_error("prune"))?;
        tracing::info!(
            sms_messages = result.sms_messages,
            orphan_sms = result.orphan_sms,
            closed_sessions = result.closed_sessions,
            "Prune finished"
        );
        report.pruned = Some(result);
    }

    if tasks.reindex {
        tracing::info!("Rebuilding indexes");
        maintenance.reindex().await.map_err(task_error("reindex"))?;
        report.reindexed = true;
    }

    Ok(report)
}
