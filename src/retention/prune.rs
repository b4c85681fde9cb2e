//! One pruning pass, shared by the worker and `maintenance --prune`.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::{RetentionPeriods, RetentionSafety},
    db::{BatchLimits, DbPool, DbResult, PruneTarget},
};

/// Rows removed (or, in dry-run mode, that would be removed) per table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneResult {
    pub sms_messages: u64,
    pub orphan_sms: u64,
    pub closed_sessions: u64,
    pub dry_run: bool,
}

impl PruneResult {
    pub fn total(&self) -> u64 {
        self.sms_messages + self.orphan_sms + self.closed_sessions
    }

    pub fn has_deletions(&self) -> bool {
        self.total() > 0
    }

    fn record(&mut self, target: PruneTarget, rows: u64) {
        match target {
            PruneTarget::SmsMessages => self.sms_messages = rows,
            PruneTarget::OrphanSms => self.orphan_sms = rows,
            PruneTarget::ClosedSessions => self.closed_sessions = rows,
        }
    }
}

fn retention_days(periods: &RetentionPeriods, target: PruneTarget) -> u32 {
    match target {
        PruneTarget::SmsMessages => periods.sms_days,
        PruneTarget::OrphanSms => periods.orphan_days,
        PruneTarget::ClosedSessions => periods.session_days,
    }
}

/// Delete messages, orphans and closed sessions older than their periods,
/// then refresh planner statistics of the pruned tables.
///
/// A period of 0 leaves that table alone.
pub async fn prune(
    db: &DbPool,
    periods: &RetentionPeriods,
    safety: &RetentionSafety,
    now: DateTime<Utc>,
) -> DbResult<PruneResult> {
    let maintenance = db.maintenance();
    let limits = BatchLimits {
        batch_size: safety.batch_size,
        max_deletes: match safety.max_deletes_per_run {
            0 => u64::MAX,
            n => n,
        },
        pause: StdDuration::from_millis(safety.batch_pause_ms),
    };

    let mut result = PruneResult {
        dry_run: safety.dry_run,
        ..Default::default()
    };
    let mut pruned_tables = Vec::new();

    for target in PruneTarget::ALL {
        let days = retention_days(periods, target);
        if days == 0 {
            tracing::debug!(table = target.table(), "Retention disabled for table");
            continue;
        }
        let cutoff = now - Duration::days(i64::from(days));

        let rows = if safety.dry_run {
            let count = maintenance.count_before(target, cutoff).await?;
            let count = u64::try_from(count).unwrap_or_default();
            tracing::info!(
                table = target.table(),
                %cutoff,
                rows = count,
                "DRY RUN: would delete rows"
            );
            count.min(limits.max_deletes)
        } else {
            let deleted = maintenance.delete_before(target, cutoff, limits).await?;
            tracing::info!(table = target.table(), %cutoff, deleted, "Pruned table");
            pruned_tables.push(target.table());
            deleted
        };
        result.record(target, rows);
    }

    if !pruned_tables.is_empty() {
        maintenance.analyze(&pruned_tables).await?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::tests::harness::{numbers, seed_fixture, sqlite_db},
        models::{NewOrphanSms, NewSmsMessage, ReserveNumber, SessionStatus},
    };

    fn safety(dry_run: bool) -> RetentionSafety {
        RetentionSafety {
            dry_run,
            batch_pause_ms: 0,
            ..Default::default()
        }
    }

    /// One closed session with a message and one orphan, all created now.
    async fn populate(db: &DbPool) {
        let fixture = seed_fixture(db).await;
        db.phone_numbers()
            .insert_many(&numbers(&fixture, &["+79990000001"]))
            .await
            .unwrap();
        let reservation = db
            .sessions()
            .reserve_next(
                ReserveNumber {
                    service_id: fixture.service_id,
                    country_id: fixture.country_id,
                    operator_id: None,
                    api_key_id: fixture.api_key_id,
                },
                &|_: &str| {},
            )
            .await
            .unwrap()
            .unwrap();
        db.sessions()
            .record_sms(NewSmsMessage {
                session_id: reservation.session_id,
                source_addr: "TGcode".into(),
                text: "code 1234".into(),
                code: Some("1234".into()),
            })
            .await
            .unwrap();
        db.sessions()
            .set_status(reservation.session_id, SessionStatus::Finished, true)
            .await
            .unwrap();
        db.orphans()
            .create(NewOrphanSms {
                phone_number: "+79990000002".into(),
                text: "stray".into(),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recent_rows_survive() {
        let db = sqlite_db().await;
        populate(&db).await;
        let result = prune(&db, &RetentionPeriods::default(), &safety(false), Utc::now())
            .await
            .unwrap();
        assert!(!result.has_deletions());
    }

    #[tokio::test]
    async fn test_old_rows_are_pruned() {
        let db = sqlite_db().await;
        populate(&db).await;
        let later = Utc::now() + Duration::days(60);

        let dry = prune(&db, &RetentionPeriods::default(), &safety(true), later)
            .await
            .unwrap();
        assert!(dry.dry_run);
        assert_eq!(dry.orphan_sms, 1);
        assert_eq!(dry.closed_sessions, 1);

        let result = prune(&db, &RetentionPeriods::default(), &safety(false), later)
            .await
            .unwrap();
        assert_eq!(result.sms_messages, 1);
        assert_eq!(result.orphan_sms, 1);
        assert_eq!(result.closed_sessions, 1);

        let again = prune(&db, &RetentionPeriods::default(), &safety(false), later)
            .await
            .unwrap();
        assert_eq!(again.total(), 0);
    }

    #[tokio::test]
    async fn test_zero_days_disables_table() {
        let db = sqlite_db().await;
        populate(&db).await;
        let periods = RetentionPeriods {
            sms_days: 0,
            orphan_days: 14,
            session_days: 0,
        };
        let result = prune(&db, &periods, &safety(false), Utc::now() + Duration::days(60))
            .await
            .unwrap();
        assert_eq!(result.orphan_sms, 1);
        assert_eq!(result.sms_messages, 0);
        assert_eq!(result.closed_sessions, 0);
    }
}
