//! Periodic pruning inside `serve`.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::prune;
use crate::{config::RetentionConfig, db::DbPool};

/// Prune every `interval_hours` until cancelled. Returns immediately when
/// retention is disabled or every period is 0.
pub async fn start_retention_worker(
    db: Arc<DbPool>,
    config: RetentionConfig,
    cancel: CancellationToken,
) {
    if !config.enabled {
        tracing::info!("Retention worker disabled by configuration");
        return;
    }
    if config.periods.is_empty() {
        tracing::info!("Retention worker enabled but all retention periods are 0");
        return;
    }

    let dry_run_msg = if config.safety.dry_run { " (DRY RUN)" } else { "" };
    tracing::info!(
        interval_hours = config.interval_hours,
        sms_days = config.periods.sms_days,
        orphan_days = config.periods.orphan_days,
        session_days = config.periods.session_days,
        dry_run = config.safety.dry_run,
        "Starting retention worker{}",
        dry_run_msg
    );

    let interval = config.interval();
    loop {
        match prune(&db, &config.periods, &config.safety, Utc::now()).await {
            Ok(result) if result.has_deletions() => {
                tracing::info!(
                    sms_messages = result.sms_messages,
                    orphan_sms = result.orphan_sms,
                    closed_sessions = result.closed_sessions,
                    total = result.total(),
                    dry_run = result.dry_run,
                    "Retention run complete{}",
                    dry_run_msg
                );
            }
            Ok(_) => tracing::debug!("Retention run complete, no records to delete"),
            Err(e) => tracing::error!(error = %e, "Error running retention"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    tracing::info!("Retention worker stopped");
}
