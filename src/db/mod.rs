mod error;
#[cfg(feature = "database-postgres")]
pub mod postgres;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(all(test, any(feature = "database-sqlite", feature = "database-postgres")))]
pub mod tests;

use std::{sync::Arc, time::Duration};

pub use error::{DbError, DbResult};
pub use repos::*;
#[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
use sqlx::ConnectOptions;
#[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
use tracing::log::LevelFilter;

use crate::config::DatabaseConfig;

/// PostgreSQL pool configuration with optional read replica.
#[cfg(feature = "database-postgres")]
pub struct PgPoolPair {
    /// Primary pool for writes.
    pub write: sqlx::PgPool,
    /// Optional read replica pool. If None, reads use the write pool.
    pub read: Option<sqlx::PgPool>,
}

/// Cached repository trait objects, created once at startup.
struct CachedRepos {
    api_keys: Arc<dyn ApiKeyRepo>,
    catalog: Arc<dyn CatalogRepo>,
    phone_numbers: Arc<dyn PhoneNumberRepo>,
    sessions: Arc<dyn SessionRepo>,
    orphans: Arc<dyn OrphanRepo>,
    maintenance: Arc<dyn MaintenanceRepo>,
}

impl CachedRepos {
    #[cfg(feature = "database-sqlite")]
    fn sqlite(pool: &sqlx::SqlitePool) -> Self {
        Self {
            api_keys: Arc::new(sqlite::SqliteApiKeyRepo::new(pool.clone())),
            catalog: Arc::new(sqlite::SqliteCatalogRepo::new(pool.clone())),
            phone_numbers: Arc::new(sqlite::SqlitePhoneNumberRepo::new(pool.clone())),
            sessions: Arc::new(sqlite::SqliteSessionRepo::new(pool.clone())),
            orphans: Arc::new(sqlite::SqliteOrphanRepo::new(pool.clone())),
            maintenance: Arc::new(sqlite::SqliteMaintenanceRepo::new(pool.clone())),
        }
    }

    #[cfg(feature = "database-postgres")]
    fn postgres(write_pool: &sqlx::PgPool, read_pool: &Option<sqlx::PgPool>) -> Self {
        Self {
            api_keys: Arc::new(postgres::PostgresApiKeyRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            catalog: Arc::new(postgres::PostgresCatalogRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            phone_numbers: Arc::new(postgres::PostgresPhoneNumberRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            sessions: Arc::new(postgres::PostgresSessionRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            orphans: Arc::new(postgres::PostgresOrphanRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            maintenance: Arc::new(postgres::PostgresMaintenanceRepo::new(write_pool.clone())),
        }
    }
}

enum PoolStorage {
    #[cfg(feature = "database-sqlite")]
    Sqlite(sqlx::SqlitePool),
    #[cfg(feature = "database-postgres")]
    Postgres(PgPoolPair),
    #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
    _None(std::convert::Infallible),
}

/// Which backend a pool talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbBackend {
    Sqlite,
    Postgres,
}

/// Database pool supporting both SQLite and PostgreSQL.
///
/// Repositories are cached at construction time to avoid allocation on each access.
pub struct DbPool {
    inner: PoolStorage,
    repos: CachedRepos,
}

#[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
fn with_statement_logging<O: ConnectOptions>(opts: O, log_all: bool, slow_ms: u64) -> O {
    let opts = if log_all {
        opts.log_statements(LevelFilter::Debug)
    } else {
        opts.log_statements(LevelFilter::Off)
    };
    opts.log_slow_statements(LevelFilter::Warn, Duration::from_millis(slow_ms))
}

#[cfg(feature = "database-postgres")]
fn pg_ssl_mode(mode: &crate::config::PostgresSslMode) -> sqlx::postgres::PgSslMode {
    use crate::config::PostgresSslMode;
    use sqlx::postgres::PgSslMode;

    match mode {
        PostgresSslMode::Disable => PgSslMode::Disable,
        PostgresSslMode::Prefer => PgSslMode::Prefer,
        PostgresSslMode::Require => PgSslMode::Require,
        PostgresSslMode::VerifyCa => PgSslMode::VerifyCa,
        PostgresSslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

#[cfg(feature = "database-postgres")]
async fn connect_postgres(
    cfg: &crate::config::PostgresConfig,
    url: &str,
) -> DbResult<sqlx::PgPool> {
    let opts = url
        .parse::<sqlx::postgres::PgConnectOptions>()?
        .ssl_mode(pg_ssl_mode(&cfg.effective_ssl_mode(url)));
    let opts = with_statement_logging(opts, cfg.log_statements, cfg.slow_statement_ms);

    let pool = sqlx::postgres::PgPoolOptions::new()
        .min_connections(cfg.min_connections)
        .max_connections(cfg.max_connections)
        .acquire_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(cfg.idle_timeout_secs)))
        .connect_with(opts)
        .await?;
    Ok(pool)
}

impl DbPool {
    /// Create a DbPool from an existing SQLite pool.
    /// Primarily useful for testing.
    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        DbPool {
            repos: CachedRepos::sqlite(&pool),
            inner: PoolStorage::Sqlite(pool),
        }
    }

    /// Create a DbPool from existing PostgreSQL pools.
    /// Primarily useful for testing.
    #[cfg(feature = "database-postgres")]
    pub fn from_postgres(write_pool: sqlx::PgPool, read_pool: Option<sqlx::PgPool>) -> Self {
        DbPool {
            repos: CachedRepos::postgres(&write_pool, &read_pool),
            inner: PoolStorage::Postgres(PgPoolPair {
                write: write_pool,
                read: read_pool,
            }),
        }
    }

    /// Create a database pool from configuration
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        match config {
            DatabaseConfig::None => Err(DbError::NotConfigured),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(cfg) => {
                let opts = sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(&cfg.path)
                    .create_if_missing(cfg.create_if_missing)
                    .foreign_keys(true)
                    .journal_mode(if cfg.wal_mode {
                        sqlx::sqlite::SqliteJournalMode::Wal
                    } else {
                        sqlx::sqlite::SqliteJournalMode::Delete
                    })
                    .busy_timeout(Duration::from_millis(cfg.busy_timeout_ms));
                let opts = with_statement_logging(opts, cfg.log_statements, cfg.slow_statement_ms);

                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect_with(opts)
                    .await?;

                tracing::info!(path = %cfg.path, "Connected to SQLite");
                Ok(Self::from_sqlite(pool))
            }
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(cfg) => {
                let write_pool = connect_postgres(cfg, &cfg.url).await?;

                let read_pool = if let Some(read_url) = &cfg.read_url {
                    tracing::info!("Configuring read replica pool");
                    Some(connect_postgres(cfg, read_url).await?)
                } else {
                    None
                };

                tracing::info!(
                    max_connections = cfg.max_connections,
                    read_replica = read_pool.is_some(),
                    "Connected to PostgreSQL"
                );
                Ok(Self::from_postgres(write_pool, read_pool))
            }
        }
    }

    /// Run database migrations using sqlx's migration runner
    /// This automatically creates and manages a _sqlx_migrations table
    /// Migrations always run on the primary (write) pool.
    pub async fn run_migrations(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                tracing::info!("Running SQLite migrations");
                sqlx::migrate!("./migrations_sqlx/sqlite").run(pool).await?;
                tracing::info!("SQLite migrations completed successfully");
                Ok(())
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pools) => {
                tracing::info!("Running PostgreSQL migrations");
                sqlx::migrate!("./migrations_sqlx/postgres")
                    .run(&pools.write)
                    .await?;
                tracing::info!("PostgreSQL migrations completed successfully");
                Ok(())
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }

    pub fn backend(&self) -> DbBackend {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(_) => DbBackend::Sqlite,
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(_) => DbBackend::Postgres,
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }

    /// Get API key repository
    pub fn api_keys(&self) -> Arc<dyn ApiKeyRepo> {
        Arc::clone(&self.repos.api_keys)
    }

    /// Services, senders, countries, operators and providers
    pub fn catalog(&self) -> Arc<dyn CatalogRepo> {
        Arc::clone(&self.repos.catalog)
    }

    /// Get phone number pool repository
    pub fn phone_numbers(&self) -> Arc<dyn PhoneNumberRepo> {
        Arc::clone(&self.repos.phone_numbers)
    }

    /// Get activation session repository
    pub fn sessions(&self) -> Arc<dyn SessionRepo> {
        Arc::clone(&self.repos.sessions)
    }

    /// Get orphan SMS repository
    pub fn orphans(&self) -> Arc<dyn OrphanRepo> {
        Arc::clone(&self.repos.orphans)
    }

    pub fn maintenance(&self) -> Arc<dyn MaintenanceRepo> {
        Arc::clone(&self.repos.maintenance)
    }

    /// Health check for database connectivity
    pub async fn health_check(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok(())
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pools) => {
                // Check both write and read pools
                sqlx::query("SELECT 1").execute(&pools.write).await?;
                if let Some(read) = &pools.read {
                    sqlx::query("SELECT 1").execute(read).await?;
                }
                Ok(())
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }

    /// Close all connections. Used on shutdown.
    pub async fn close(&self) {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => pool.close().await,
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pools) => {
                pools.write.close().await;
                if let Some(read) = &pools.read {
                    read.close().await;
                }
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }
}
