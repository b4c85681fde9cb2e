use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::common::parse_port;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::CatalogRepo,
    },
    models::{
        AllowedSender, Country, CreateAllowedSender, CreateCountry, CreateOperator,
        CreateProvider, CreateService, Operator, Provider, Service,
    },
};

pub struct SqliteCatalogRepo {
    pool: SqlitePool,
}

impl SqliteCatalogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_service(row: &sqlx::sqlite::SqliteRow) -> Service {
        Service {
            id: row.get("id"),
            name: row.get("name"),
            code: row.get("code"),
        }
    }

    fn parse_country(row: &sqlx::sqlite::SqliteRow) -> Country {
        Country {
            id: row.get("id"),
            name: row.get("name"),
            iso_code: row.get("iso_code"),
            phone_code: row.get("phone_code"),
        }
    }

    fn parse_operator(row: &sqlx::sqlite::SqliteRow) -> Operator {
        Operator {
            id: row.get("id"),
            name: row.get("name"),
            country_id: row.get("country_id"),
        }
    }

    fn parse_provider(row: &sqlx::sqlite::SqliteRow) -> DbResult<Provider> {
        Ok(Provider {
            id: row.get("id"),
            name: row.get("name"),
            smpp_host: row.get("smpp_host"),
            smpp_port: parse_port(row.get("smpp_port"))?,
            system_id: row.get("system_id"),
            password: row.get("password"),
            system_type: row.get("system_type"),
            is_active: row.get("is_active"),
        })
    }
}

fn conflict(what: &'static str) -> impl FnOnce(sqlx::Error) -> DbError {
    move |e| match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DbError::Conflict(format!("{} already exists", what))
        }
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            DbError::Validation(format!("{} references a missing row", what))
        }
        _ => DbError::from(e),
    }
}

#[async_trait]
impl CatalogRepo for SqliteCatalogRepo {
    async fn list_services(&self) -> DbResult<Vec<Service>> {
        let rows = sqlx::query("SELECT id, name, code FROM services ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::parse_service).collect())
    }

    async fn get_service_by_code(&self, code: &str) -> DbResult<Option<Service>> {
        let row = sqlx::query("SELECT id, name, code FROM services WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::parse_service))
    }

    async fn first_service(&self) -> DbResult<Option<Service>> {
        let row = sqlx::query("SELECT id, name, code FROM services ORDER BY id LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::parse_service))
    }

    async fn create_service(&self, input: CreateService) -> DbResult<Service> {
        let row = sqlx::query(
            "INSERT INTO services (name, code) VALUES (?, ?) RETURNING id, name, code",
        )
        .bind(&input.name)
        .bind(&input.code)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict("Service"))?;
        Ok(Self::parse_service(&row))
    }

    async fn count_services(&self) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM services")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    async fn list_allowed_senders(&self, service_id: Option<i64>) -> DbResult<Vec<AllowedSender>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, service_id FROM allowed_senders
            WHERE (? IS NULL OR service_id = ?)
            ORDER BY id
            "#,
        )
        .bind(service_id)
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AllowedSender {
                id: row.get("id"),
                name: row.get("name"),
                service_id: row.get("service_id"),
            })
            .collect())
    }

    async fn create_allowed_sender(&self, input: CreateAllowedSender) -> DbResult<AllowedSender> {
        let row = sqlx::query(
            r#"
            INSERT INTO allowed_senders (name, service_id) VALUES (?, ?)
            RETURNING id, name, service_id
            "#,
        )
        .bind(&input.name)
        .bind(input.service_id)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict("Allowed sender"))?;

        Ok(AllowedSender {
            id: row.get("id"),
            name: row.get("name"),
            service_id: row.get("service_id"),
        })
    }

    async fn list_countries(&self) -> DbResult<Vec<Country>> {
        let rows = sqlx::query("SELECT id, name, iso_code, phone_code FROM countries ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::parse_country).collect())
    }

    async fn create_country(&self, input: CreateCountry) -> DbResult<Country> {
        let row = sqlx::query(
            r#"
            INSERT INTO countries (id, name, iso_code, phone_code) VALUES (?, ?, ?, ?)
            RETURNING id, name, iso_code, phone_code
            "#,
        )
        .bind(input.id)
        .bind(&input.name)
        .bind(&input.iso_code)
        .bind(&input.phone_code)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict("Country"))?;
        Ok(Self::parse_country(&row))
    }

    async fn count_countries(&self) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM countries")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    async fn list_operators(&self, country_id: Option<i64>) -> DbResult<Vec<Operator>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, country_id FROM operators
            WHERE (? IS NULL OR country_id = ?)
            ORDER BY id
            "#,
        )
        .bind(country_id)
        .bind(country_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::parse_operator).collect())
    }

    async fn find_operator(&self, name: &str, country_id: i64) -> DbResult<Option<Operator>> {
        let row = sqlx::query(
            "SELECT id, name, country_id FROM operators WHERE name = ? AND country_id = ?",
        )
        .bind(name)
        .bind(country_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::parse_operator))
    }

    async fn create_operator(&self, input: CreateOperator) -> DbResult<Operator> {
        let row = sqlx::query(
            r#"
            INSERT INTO operators (name, country_id) VALUES (?, ?)
            RETURNING id, name, country_id
            "#,
        )
        .bind(&input.name)
        .bind(input.country_id)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict("Operator"))?;
        Ok(Self::parse_operator(&row))
    }

    async fn list_providers(&self) -> DbResult<Vec<Provider>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, smpp_host, smpp_port, system_id, password, system_type, is_active
            FROM providers ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::parse_provider).collect()
    }

    async fn list_active_providers(&self) -> DbResult<Vec<Provider>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, smpp_host, smpp_port, system_id, password, system_type, is_active
            FROM providers WHERE is_active = 1 ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::parse_provider).collect()
    }

    async fn create_provider(&self, input: CreateProvider) -> DbResult<Provider> {
        let row = sqlx::query(
            r#"
            INSERT INTO providers (name, smpp_host, smpp_port, system_id, password, system_type, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, name, smpp_host, smpp_port, system_id, password, system_type, is_active
            "#,
        )
        .bind(&input.name)
        .bind(&input.smpp_host)
        .bind(i64::from(input.smpp_port))
        .bind(&input.system_id)
        .bind(&input.password)
        .bind(&input.system_type)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict("Provider"))?;
        Self::parse_provider(&row)
    }
}
