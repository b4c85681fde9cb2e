use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::{
    db::{error::DbResult, repos::OrphanRepo},
    models::{NewOrphanSms, OrphanEnrichment, OrphanNumbersFilter, OrphanReportRow, OrphanSms},
};

pub struct SqliteOrphanRepo {
    pool: SqlitePool,
}

impl SqliteOrphanRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_orphan(row: &sqlx::sqlite::SqliteRow) -> OrphanSms {
        OrphanSms {
            id: row.get("id"),
            phone_number: row.get("phone_number"),
            source_addr: row.get("source_addr"),
            text: row.get("text"),
            provider_id: row.get("provider_id"),
            country_id: row.get("country_id"),
            operator_id: row.get("operator_id"),
            client_ip: row.get("client_ip"),
            system_id: row.get("system_id"),
            received_at: row.get("received_at"),
        }
    }
}

#[async_trait]
impl OrphanRepo for SqliteOrphanRepo {
    async fn create(&self, input: NewOrphanSms) -> DbResult<OrphanSms> {
        let row = sqlx::query(
            r#"
            INSERT INTO orphan_sms (
                phone_number, source_addr, text, provider_id, country_id, operator_id,
                client_ip, system_id, received_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, phone_number, source_addr, text, provider_id, country_id, operator_id,
                      client_ip, system_id, received_at
            "#,
        )
        .bind(&input.phone_number)
        .bind(&input.source_addr)
        .bind(&input.text)
        .bind(input.provider_id)
        .bind(input.country_id)
        .bind(input.operator_id)
        .bind(&input.client_ip)
        .bind(&input.system_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::parse_orphan(&row))
    }

    async fn list_unenriched(&self, after_id: i64, limit: i64) -> DbResult<Vec<OrphanSms>> {
        let rows = sqlx::query(
            r#"
            SELECT id, phone_number, source_addr, text, provider_id, country_id, operator_id,
                   client_ip, system_id, received_at
            FROM orphan_sms
            WHERE id > ?
              AND (provider_id IS NULL OR country_id IS NULL OR operator_id IS NULL)
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::parse_orphan).collect())
    }

    async fn apply_enrichment(&self, updates: &[OrphanEnrichment]) -> DbResult<u64> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut updated = 0;
        let mut tx = self.pool.begin().await?;

        for update in updates {
            let result = sqlx::query(
                r#"
                UPDATE orphan_sms
                SET phone_number = ?,
                    provider_id = COALESCE(provider_id, ?),
                    country_id = COALESCE(country_id, ?),
                    operator_id = COALESCE(operator_id, ?)
                WHERE id = ?
                "#,
            )
            .bind(&update.phone_number)
            .bind(update.provider_id)
            .bind(update.country_id)
            .bind(update.operator_id)
            .bind(update.id)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn report(&self, limit: i64) -> DbResult<Vec<OrphanReportRow>> {
        let rows = sqlx::query(
            r#"
            SELECT phone_number, source_addr, COUNT(*) AS n,
                   MIN(text) AS sample_text, MAX(received_at) AS last_received_at
            FROM orphan_sms
            GROUP BY phone_number, source_addr
            ORDER BY n DESC, last_received_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| OrphanReportRow {
                phone_number: row.get("phone_number"),
                source_addr: row.get("source_addr"),
                count: row.get("n"),
                sample_text: row.get("sample_text"),
                last_received_at: row.get("last_received_at"),
            })
            .collect())
    }

    async fn numbers_for_source(&self, filter: &OrphanNumbersFilter) -> DbResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT o.phone_number
            FROM orphan_sms o
            LEFT JOIN phone_numbers pn ON pn.number = o.phone_number
            WHERE o.source_addr = ?
              AND (? IS NULL OR COALESCE(o.provider_id, pn.provider_id) = ?)
              AND (? IS NULL OR COALESCE(o.country_id, pn.country_id) = ?)
              AND (? IS NULL OR COALESCE(o.operator_id, pn.operator_id) = ?)
            ORDER BY o.phone_number
            "#,
        )
        .bind(&filter.source_addr)
        .bind(filter.provider_id)
        .bind(filter.provider_id)
        .bind(filter.country_id)
        .bind(filter.country_id)
        .bind(filter.operator_id)
        .bind(filter.operator_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("phone_number")).collect())
    }
}
