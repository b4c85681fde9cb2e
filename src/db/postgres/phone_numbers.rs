use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::PhoneNumberRepo,
    },
    models::{NewPhoneNumber, PhoneNumber, PhoneNumberFilter},
};

const INSERT_CHUNK: usize = 5000;

pub struct PostgresPhoneNumberRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresPhoneNumberRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_phone_number(row: &sqlx::postgres::PgRow) -> PhoneNumber {
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
impl PhoneNumberRepo for PostgresPhoneNumberRepo {
    async fn get_by_number(&self, number: &str) -> DbResult<Option<PhoneNumber>> {
        let row = sqlx::query(
            r#"
            SELECT id, number, provider_id, country_id, operator_id, is_active, is_in_use, sort_order
            FROM phone_numbers
            WHERE number = $1
            "#,
        )
        .bind(number)
        .fetch_optional(&self.write_pool)
        .await?;

        Ok(row.as_ref().map(Self::parse_phone_number))
    }

    async fn existing_numbers(&self, numbers: &[String]) -> DbResult<Vec<String>> {
        if numbers.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT number FROM phone_numbers WHERE number = ANY($1)")
            .bind(numbers)
            .fetch_all(&self.write_pool)
            .await?;

        Ok(rows.iter().map(|row| row.get("number")).collect())
    }

    async fn insert_many(&self, numbers: &[NewPhoneNumber]) -> DbResult<u64> {
        if numbers.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        let mut tx = self.write_pool.begin().await?;

        for chunk in numbers.chunks(INSERT_CHUNK) {
            let values: Vec<String> = chunk.iter().map(|n| n.number.clone()).collect();
            let providers: Vec<i64> = chunk.iter().map(|n| n.provider_id).collect();
            let countries: Vec<i64> = chunk.iter().map(|n| n.country_id).collect();
            let operators: Vec<Option<i64>> = chunk.iter().map(|n| n.operator_id).collect();

            let result = sqlx::query(
                r#"
                INSERT INTO phone_numbers (number, provider_id, country_id, operator_id)
                SELECT * FROM UNNEST($1::VARCHAR[], $2::BIGINT[], $3::BIGINT[], $4::BIGINT[])
                ON CONFLICT (number) DO NOTHING
                "#,
            )
            .bind(&values)
            .bind(&providers)
            .bind(&countries)
            .bind(&operators)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
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
            WHERE ($1::BIGINT IS NULL OR provider_id = $1)
              AND ($2::BIGINT IS NULL OR country_id = $2)
              AND ($3::BOOLEAN IS NULL OR is_in_use = $3)
            "#,
        )
        .bind(filter.provider_id)
        .bind(filter.country_id)
        .bind(filter.is_in_use)
        .execute(&self.write_pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn shuffle(&self) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE phone_numbers p
            SET sort_order = s.rn
            FROM (
                SELECT id, row_number() OVER (ORDER BY random()) AS rn
                FROM phone_numbers
            ) s
            WHERE p.id = s.id
            "#,
        )
        .execute(&self.write_pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_available(&self, country_id: i64) -> DbResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM phone_numbers
            WHERE country_id = $1 AND is_active AND NOT is_in_use
            "#,
        )
        .bind(country_id)
        .fetch_one(&self.read_pool)
        .await?;

        Ok(row.get("n"))
    }

    async fn provider_ids_in_country(&self, country_id: i64) -> DbResult<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT DISTINCT provider_id FROM phone_numbers WHERE country_id = $1 ORDER BY provider_id",
        )
        .bind(country_id)
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("provider_id")).collect())
    }
}
