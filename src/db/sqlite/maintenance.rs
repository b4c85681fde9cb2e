use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::db::{
    error::{DbError, DbResult},
    repos::{BatchLimits, MAINTAINED_TABLES, MaintenanceRepo, PruneTarget},
};

pub struct SqliteMaintenanceRepo {
    pool: SqlitePool,
}

impl SqliteMaintenanceRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `WHERE` clause selecting prunable rows, with one `?` for the cutoff.
    fn prunable(target: PruneTarget) -> &'static str {
        match target {
            PruneTarget::SmsMessages => "FROM sms_messages WHERE received_at < ?",
            PruneTarget::OrphanSms => "FROM orphan_sms WHERE received_at < ?",
            PruneTarget::ClosedSessions => "FROM sessions WHERE status IN (6, 8) AND created_at < ?",
        }
    }

    async fn delete_batch(
        &self,
        target: PruneTarget,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> DbResult<u64> {
        let ids = format!("SELECT id {} ORDER BY id LIMIT ?", Self::prunable(target));

        if target == PruneTarget::ClosedSessions {
            let mut tx = self.pool.begin().await?;

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
            "DELETE FROM {} WHERE id IN ({})",
            target.table(),
            ids
        ))
        .bind(cutoff)
        .bind(limit)
        .execute(&self.pool)
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
impl MaintenanceRepo for SqliteMaintenanceRepo {
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
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    async fn analyze(&self, tables: &[&str]) -> DbResult<()> {
        for table in tables {
            check_table(table)?;
            sqlx::query(&format!("ANALYZE {}", table))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn setup(&self) -> DbResult<()> {
        sqlx::query("ANALYZE").execute(&self.pool).await?;
        Ok(())
    }

    async fn reindex(&self) -> DbResult<()> {
        for table in MAINTAINED_TABLES {
            sqlx::query(&format!("REINDEX {}", table))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
