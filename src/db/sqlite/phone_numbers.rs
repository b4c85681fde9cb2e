use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::common::placeholders;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::PhoneNumberRepo,
    },
    models::{NewPhoneNumber, PhoneNumber, PhoneNumberFilter},
};

// SQLITE_LIMIT_VARIABLE_NUMBER is 999 on older builds.
const MAX_LOOKUP_PARAMS: usize = 900;
const MAX_INSERT_ROWS: usize = 200;

pub struct SqlitePhoneNumberRepo {
    pool: SqlitePool,
}

impl SqlitePhoneNumberRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_phone_number(row: &sqlx::sqlite::SqliteRow) -> PhoneNumber {
        PhoneNumber {
            id: row.get("id"),
            number: row.get("number"),
            provider_id: row.get("provider_id"),
            country_id: row.get("country_id"),
            operator_id: row.get("operator_id"),
            is_active: row.get("is_active"),
            is_in_use: row.get("is_in_use"),
            sort_order: row.get("sort_order"),
        }
    }
}

#[async_trait]
impl PhoneNumberRepo for SqlitePhoneNumberRepo {
    async fn get_by_number(&self, number: &str) -> DbResult<Option<PhoneNumber>> {
        let row = sqlx::query(
            r#"
            SELECT id, number, provider_id, country_id, operator_id, is_active, is_in_use, sort_order
            FROM phone_numbers
            WHERE number = ?
            "#,
        )
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::parse_phone_number))
    }

    async fn existing_numbers(&self, numbers: &[String]) -> DbResult<Vec<String>> {
        let mut existing = Vec::new();

        for chunk in numbers.chunks(MAX_LOOKUP_PARAMS) {
            let query = format!(
                "SELECT number FROM phone_numbers WHERE number IN ({})",
                placeholders(chunk.len())
            );
            let mut q = sqlx::query(&query);
            for number in chunk {
                q = q.bind(number);
            }
            let rows = q.fetch_all(&self.pool).await?;
            existing.extend(rows.iter().map(|row| row.get::<String, _>("number")));
        }

        Ok(existing)
    }

    async fn insert_many(&self, numbers: &[NewPhoneNumber]) -> DbResult<u64> {
        if numbers.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in numbers.chunks(MAX_INSERT_ROWS) {
            let values = vec!["(?, ?, ?, ?)"; chunk.len()].join(", ");
            let query = format!(
                r#"
                INSERT INTO phone_numbers (number, provider_id, country_id, operator_id)
                VALUES {}
                ON CONFLICT (number) DO NOTHING
                "#,
                values
            );

            let mut q = sqlx::query(&query);
            for n in chunk {
                q = q
                    .bind(&n.number)
                    .bind(n.provider_id)
                    .bind(n.country_id)
                    .bind(n.operator_id);
            }

            let result = q.execute(&mut *tx).await.map_err(|e| match e {
                sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                    DbError::Validation("Unknown provider, country or operator".to_string())
                }
                _ => DbError::from(e),
            })?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn delete_matching(&self, filter: &PhoneNumberFilter) -> DbResult<u64> {
        if filter.is_empty() {
            return Err(DbError::Validation(
                "At least one filter is required".to_string(),
            ));
        }

        let result = sqlx::query(
            r#"
            DELETE FROM phone_numbers
            WHERE (? IS NULL OR provider_id = ?)
              AND (? IS NULL OR country_id = ?)
              AND (? IS NULL OR is_in_use = ?)
            "#,
        )
        .bind(filter.provider_id)
        .bind(filter.provider_id)
        .bind(filter.country_id)
        .bind(filter.country_id)
        .bind(filter.is_in_use)
        .bind(filter.is_in_use)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn shuffle(&self) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE phone_numbers
            SET sort_order = s.rn
            FROM (
                SELECT id, row_number() OVER (ORDER BY random()) AS rn
                FROM phone_numbers
            ) AS s
            WHERE phone_numbers.id = s.id
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_available(&self, country_id: i64) -> DbResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM phone_numbers
            WHERE country_id = ? AND is_active = 1 AND is_in_use = 0
            "#,
        )
        .bind(country_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("n"))
    }

    async fn provider_ids_in_country(&self, country_id: i64) -> DbResult<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT DISTINCT provider_id FROM phone_numbers WHERE country_id = ? ORDER BY provider_id",
        )
        .bind(country_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("provider_id")).collect())
    }
}
