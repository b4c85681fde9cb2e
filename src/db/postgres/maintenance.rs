use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::db::{
    error::{DbError, DbResult},
    repos::{BatchLimits, MAINTAINED_TABLES, MaintenanceRepo, PruneTarget},
};

/// (table, fillfactor). Update-heavy tables keep more free space per page.
const FILLFACTORS: [(&str, u32); 4] = [
    ("phone_numbers", 80),
    ("sessions", 90),
    ("sms_messages", 90),
    ("orphan_sms", 90),
];

/// Server-side prune for schedulers such as pg_cron. Mirrors `delete_before`.
const PRUNE_FUNCTION: &str = r#"
CREATE OR REPLACE FUNCTION prune_old_data(
  p_sms_days int DEFAULT 30,
  p_orphan_days int DEFAULT 14,
  p_session_days int DEFAULT 30
) RETURNS void LANGUAGE plpgsql AS $$
DECLARE
  _r int;
BEGIN
  IF p_sms_days > 0 THEN
    LOOP
      DELETE FROM sms_messages WHERE ctid IN (
        SELECT ctid FROM sms_messages
        WHERE received_at < now() - make_interval(days => p_sms_days)
        LIMIT 5000
      );
      GET DIAGNOSTICS _r = ROW_COUNT;
      EXIT WHEN _r < 5000;
      PERFORM pg_sleep(0.05);
    END LOOP;
  END IF;

  IF p_orphan_days > 0 THEN
    LOOP
      DELETE FROM orphan_sms WHERE ctid IN (
        SELECT ctid FROM orphan_sms
        WHERE received_at < now() - make_interval(days => p_orphan_days)
        LIMIT 5000
      );
      GET DIAGNOSTICS _r = ROW_COUNT;
      EXIT WHEN _r < 5000;
      PERFORM pg_sleep(0.05);
    END LOOP;
  END IF;

  IF p_session_days > 0 THEN
    LOOP
      DELETE FROM sessions WHERE ctid IN (
        SELECT ctid FROM sessions
        WHERE status IN (6, 8)
          AND created_at < now() - make_interval(days => p_session_days)
        LIMIT 5000
      );
      GET DIAGNOSTICS _r = ROW_COUNT;
      EXIT WHEN _r < 5000;
      PERFORM pg_sleep(0.05);
    END LOOP;
  END IF;

  ANALYZE sms_messages;
  ANALYZE orphan_sms;
  ANALYZE sessions;
END $$;
"#;

pub struct PostgresMaintenanceRepo {
    write_pool: PgPool,
}

impl PostgresMaintenanceRepo {
    /// Maintenance always runs against the primary.
    pub fn new(write_pool: PgPool) -> Self {
        Self { write_pool }
    }

    fn prunable(target: PruneTarget) -> &'static str {
        match target {
            PruneTarget::SmsMessages => "FROM sms_messages WHERE received_at < $1",
            PruneTarget::OrphanSms => "FROM orphan_sms WHERE received_at < $1",
            PruneTarget::ClosedSessions => {
                "FROM sessions WHERE status IN (6, 8) AND created_at < $1"
            }
        }
    }

    async fn delete_batch(
        &self,
        target: PruneTarget,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> DbResult<u64> {
        if target == PruneTarget::ClosedSessions {
            let ids = format!(
                "SELECT id {} ORDER BY id LIMIT $2",
                Self::prunable(target)
            );
            let mut tx = self.write_pool.begin().await?;

            sqlx::query(&format!(
                "DELETE FROM sms_messages WHERE session_id IN ({})",
                ids
            ))
            .bind(cutoff)
            .bind(limit)
            .execute(&mut *tx)
            .await?;

            let result = sqlx::query(&format!("DELETE FROM sessions WHERE id IN ({})", ids))
                .bind(cutoff)
                .bind(limit)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            return Ok(result.rows_affected());
        }

        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE ctid IN (SELECT ctid {} LIMIT $2)",
            target.table(),
            Self::prunable(target)
        ))
        .bind(cutoff)
        .bind(limit)
        .execute(&self.write_pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn check_table(table: &str) -> DbResult<()> {
    if MAINTAINED_TABLES.contains(&table) {
        Ok(())
    } else {
        Err(DbError::Validation(format!("Not a maintained table: {}", table)))
    }
}

#[async_trait]
impl MaintenanceRepo for PostgresMaintenanceRepo {
    async fn delete_before(
        &self,
        target: PruneTarget,
        cutoff: DateTime<Utc>,
        limits: BatchLimits,
    ) -> DbResult<u64> {
        let mut total_deleted: u64 = 0;

        loop {
            if total_deleted >= limits.max_deletes {
                break;
            }

            let remaining = limits.max_deletes - total_deleted;
            let limit = std::cmp::min(limits.batch_size as u64, remaining) as i64;

            let rows_deleted = self.delete_batch(target, cutoff, limit).await?;
            total_deleted += rows_deleted;

            if rows_deleted < limit as u64 {
                break;
            }

            if !limits.pause.is_zero() {
                tokio::time::sleep(limits.pause).await;
            }
        }

        Ok(total_deleted)
    }

    async fn count_before(&self, target: PruneTarget, cutoff: DateTime<Utc>) -> DbResult<i64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n {}", Self::prunable(target)))
            .bind(cutoff)
            .fetch_one(&self.write_pool)
            .await?;
        Ok(row.get("n"))
    }

    async fn analyze(&self, tables: &[&str]) -> DbResult<()> {
        for table in tables {
            check_table(table)?;
            sqlx::raw_sql(&format!("ANALYZE {}", table))
                .execute(&self.write_pool)
                .await?;
        }
        Ok(())
    }

    async fn setup(&self) -> DbResult<()> {
        for (table, fillfactor) in FILLFACTORS {
            tracing::info!(table, fillfactor, "Setting storage parameters");
            sqlx::raw_sql(&format!(
                "ALTER TABLE {} SET (fillfactor = {}, \
                 autovacuum_vacuum_scale_factor = 0.02, \
                 autovacuum_analyze_scale_factor = 0.02)",
                table, fillfactor
            ))
            .execute(&self.write_pool)
            .await?;
        }

        // VACUUM refuses to run inside a transaction block.
        for table in MAINTAINED_TABLES {
            tracing::info!(table, "Vacuuming");
            sqlx::raw_sql(&format!("VACUUM (ANALYZE) {}", table))
                .execute(&self.write_pool)
                .await?;
        }

        tracing::info!("Installing prune_old_data()");
        sqlx::raw_sql(PRUNE_FUNCTION)
            .execute(&self.write_pool)
            .await?;

        Ok(())
    }

    async fn reindex(&self) -> DbResult<()> {
        for table in MAINTAINED_TABLES {
            tracing::info!(table, "Reindexing concurrently");
            sqlx::raw_sql(&format!("REINDEX TABLE CONCURRENTLY {}", table))
                .execute(&self.write_pool)
                .await?;
        }
        Ok(())
    }
}
