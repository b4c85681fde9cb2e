use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::{
    db::{error::DbResult, repos::OrphanRepo},
    models::{NewOrphanSms, OrphanEnrichment, OrphanNumbersFilter, OrphanReportRow, OrphanSms},
};

const ORPHAN_COLUMNS: &str = "id, phone_number, source_addr, text, provider_id, country_id, \
                              operator_id, client_ip, system_id, received_at";

pub struct PostgresOrphanRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresOrphanRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_orphan(row: &sqlx::postgres::PgRow) -> OrphanSms {
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
impl OrphanRepo for PostgresOrphanRepo {
    async fn create(&self, input: NewOrphanSms) -> DbResult<OrphanSms> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orphan_sms (
                phone_number, source_addr, text, provider_id, country_id, operator_id,
                client_ip, system_id, received_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            ORPHAN_COLUMNS
        ))
        .bind(&input.phone_number)
        .bind(&input.source_addr)
        .bind(&input.text)
        .bind(input.provider_id)
        .bind(input.country_id)
        .bind(input.operator_id)
        .bind(&input.client_ip)
        .bind(&input.system_id)
        .bind(Utc::now())
        .fetch_one(&self.write_pool)
        .await?;

        Ok(Self::parse_orphan(&row))
    }

    async fn list_unenriched(&self, after_id: i64, limit: i64) -> DbResult<Vec<OrphanSms>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM orphan_sms
            WHERE id > $1
              AND (provider_id IS NULL OR country_id IS NULL OR operator_id IS NULL)
            ORDER BY id
            LIMIT $2
            "#,
            ORPHAN_COLUMNS
        ))
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.write_pool)
        .await?;

        Ok(rows.iter().map(Self::parse_orphan).collect())
    }

    async fn apply_enrichment(&self, updates: &[OrphanEnrichment]) -> DbResult<u64> {
        if updates.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = updates.iter().map(|u| u.id).collect();
        let numbers: Vec<String> = updates.iter().map(|u| u.phone_number.clone()).collect();
        let providers: Vec<Option<i64>> = updates.iter().map(|u| u.provider_id).collect();
        let countries: Vec<Option<i64>> = updates.iter().map(|u| u.country_id).collect();
        let operators: Vec<Option<i64>> = updates.iter().map(|u| u.operator_id).collect();

        let result = sqlx::query(
            r#"
            UPDATE orphan_sms o
            SET phone_number = u.phone_number,
                provider_id = COALESCE(o.provider_id, u.provider_id),
                country_id = COALESCE(o.country_id, u.country_id),
                operator_id = COALESCE(o.operator_id, u.operator_id)
            FROM UNNEST($1::BIGINT[], $2::VARCHAR[], $3::BIGINT[], $4::BIGINT[], $5::BIGINT[])
                AS u(id, phone_number, provider_id, country_id, operator_id)
            WHERE o.id = u.id
            "#,
        )
        .bind(&ids)
        .bind(&numbers)
        .bind(&providers)
        .bind(&countries)
        .bind(&operators)
        .execute(&self.write_pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn report(&self, limit: i64) -> DbResult<Vec<OrphanReportRow>> {
        let rows = sqlx::query(
            r#"
            SELECT phone_number, source_addr, COUNT(*) AS n,
                   MIN(text) AS sample_text, MAX(received_at) AS last_received_at
            FROM orphan_sms
            GROUP BY phone_number, source_addr
            ORDER BY n DESC, last_received_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.read_pool)
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
            WHERE o.source_addr = $1
              AND ($2::BIGINT IS NULL OR COALESCE(o.provider_id, pn.provider_id) = $2)
              AND ($3::BIGINT IS NULL OR COALESCE(o.country_id, pn.country_id) = $3)
              AND ($4::BIGINT IS NULL OR COALESCE(o.operator_id, pn.operator_id) = $4)
            ORDER BY o.phone_number
            "#,
        )
        .bind(&filter.source_addr)
        .bind(filter.provider_id)
        .bind(filter.country_id)
        .bind(filter.operator_id)
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("phone_number")).collect())
    }
}
