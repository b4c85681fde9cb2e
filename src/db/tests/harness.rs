//! Test harness for database repository testing
//!
//! Provides utilities for setting up test databases:
//! - SQLite: Fast in-memory databases with real migrations
//! - PostgreSQL: Testcontainers-based instances with real migrations
//!
//! plus [`seed_fixture`], the reference rows most tests need.

#[cfg(feature = "database-sqlite")]
use sqlx::SqlitePool;

use crate::{
    db::DbPool,
    models::{
        CreateAllowedSender, CreateApiKey, CreateCountry, CreateProvider, CreateService,
        NewPhoneNumber, generate_api_key,
    },
};

/// Create an in-memory SQLite pool for testing
#[cfg(feature = "database-sqlite")]
pub async fn create_sqlite_pool() -> SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

/// Run SQLite migrations on the pool
///
/// Uses the actual migration files to ensure tests match production schema
#[cfg(feature = "database-sqlite")]
pub async fn run_sqlite_migrations(pool: &SqlitePool) {
    sqlx::migrate!("./migrations_sqlx/sqlite")
        .run(pool)
        .await
        .expect("Failed to run SQLite migrations");
}

/// A migrated in-memory SQLite [`DbPool`].
#[cfg(feature = "database-sqlite")]
pub async fn sqlite_db() -> DbPool {
    let pool = create_sqlite_pool().await;
    run_sqlite_migrations(&pool).await;
    DbPool::from_sqlite(pool)
}

/// PostgreSQL test harness using testcontainers
#[cfg(all(test, feature = "database-postgres"))]
pub mod postgres {
    use std::sync::OnceLock;

    use sqlx::PgPool;
    use testcontainers_modules::{
        postgres::Postgres,
        testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner},
    };
    use tokio::sync::OnceCell;

    use crate::db::DbPool;

    /// Shared container state - initialized once per test run
    struct SharedContainer {
        #[allow(dead_code)] // Test infrastructure: keeps container alive
        container: ContainerAsync<Postgres>,
        connection_string: String,
    }

    static SHARED_CONTAINER: OnceLock<OnceCell<SharedContainer>> = OnceLock::new();

    async fn get_shared_container() -> &'static SharedContainer {
        let cell = SHARED_CONTAINER.get_or_init(OnceCell::new);
        cell.get_or_init(|| async {
            let container = Postgres::default()
                .with_tag("16-alpine")
                .start()
                .await
                .expect("Failed to start PostgreSQL container");

            let host = container.get_host().await.expect("Failed to get host");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("Failed to get port");

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            SharedContainer {
                container,
                connection_string,
            }
        })
        .await
    }

    /// Create a pool on a fresh schema of the shared container.
    ///
    /// Each test gets its own schema with fresh migrations, so one container
    /// serves the whole run.
    pub async fn create_isolated_postgres_pool() -> PgPool {
        let shared = get_shared_container().await;

        let admin_pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&shared.connection_string)
            .await
            .expect("Failed to connect to PostgreSQL");

        let schema_name = format!("test_{}", uuid::Uuid::new_v4().simple());

        sqlx::query(&format!("CREATE SCHEMA \"{}\"", schema_name))
            .execute(&admin_pool)
            .await
            .expect("Failed to create test schema");

        let isolated_url = format!(
            "{}?options=-c search_path={}",
            shared.connection_string, schema_name
        );

        sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&isolated_url)
            .await
            .expect("Failed to connect to isolated schema")
    }

    pub async fn run_postgres_migrations(pool: &PgPool) {
        sqlx::migrate!("./migrations_sqlx/postgres")
            .run(pool)
            .await
            .expect("Failed to run PostgreSQL migrations");
    }

    /// A migrated PostgreSQL [`DbPool`] on an isolated schema.
    pub async fn postgres_db() -> DbPool {
        let pool = create_isolated_postgres_pool().await;
        run_postgres_migrations(&pool).await;
        DbPool::from_postgres(pool, None)
    }
}

/// Reference rows shared by most repository tests.
pub struct Fixture {
    pub provider_id: i64,
    pub country_id: i64,
    pub service_id: i64,
    pub api_key_id: i64,
}

/// Insert one provider, country (Russia, id 0), service (Telegram, `tg`)
/// with an allowed sender, and an API key.
pub async fn seed_fixture(db: &DbPool) -> Fixture {
    let catalog = db.catalog();

    let provider = catalog
        .create_provider(CreateProvider {
            name: "upstream".into(),
            smpp_host: "127.0.0.1".into(),
            smpp_port: 2775,
            system_id: "smsgate".into(),
            password: "secret".into(),
            system_type: String::new(),
            is_active: true,
        })
        .await
        .expect("Failed to create provider");

    let country = catalog
        .create_country(CreateCountry {
            id: 0,
            name: "Russia".into(),
            iso_code: Some("RU".into()),
            phone_code: Some("7".into()),
        })
        .await
        .expect("Failed to create country");

    let service = catalog
        .create_service(CreateService {
            name: "Telegram".into(),
            code: "tg".into(),
        })
        .await
        .expect("Failed to create service");

    catalog
        .create_allowed_sender(CreateAllowedSender {
            name: "TGcode".into(),
            service_id: service.id,
        })
        .await
        .expect("Failed to create allowed sender");

    let (_, hash) = generate_api_key();
    let api_key = db
        .api_keys()
        .create(CreateApiKey { description: Some("reseller".into()) }, &hash, "abcdef")
        .await
        .expect("Failed to create API key");

    Fixture {
        provider_id: provider.id,
        country_id: country.id,
        service_id: service.id,
        api_key_id: api_key.id,
    }
}

/// `NewPhoneNumber`s in the fixture's provider and country.
pub fn numbers(fixture: &Fixture, numbers: &[&str]) -> Vec<NewPhoneNumber> {
    numbers
        .iter()
        .map(|n| NewPhoneNumber {
            number: n.to_string(),
            provider_id: fixture.provider_id,
            country_id: fixture.country_id,
            operator_id: None,
        })
        .collect()
}
