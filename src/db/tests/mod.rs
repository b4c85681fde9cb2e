//! Shared database repository tests
//!
//! Every test is an async function over a [`DbPool`](crate::db::DbPool) and
//! runs against both backends:
//!
//! - **SQLite**: in-memory databases with real migrations, run with every `cargo test`
//! - **PostgreSQL**: testcontainers, run with `cargo test -- --ignored`
//!
//! ```bash
//! cargo test                       # Run fast SQLite tests only
//! cargo test -- --ignored          # Run PostgreSQL integration tests (requires Docker)
//! cargo test -- --include-ignored  # Run all tests
//! ```

/// Generate a SQLite and a PostgreSQL test for each shared test function.
macro_rules! db_tests {
    ($($name:ident),* $(,)?) => {
        #[cfg(feature = "database-sqlite")]
        mod sqlite_tests {
            use crate::db::tests::harness::sqlite_db;
            $(
                #[tokio::test]
                async fn $name() {
                    let db = sqlite_db().await;
                    super::$name(&db).await;
                }
            )*
        }

        #[cfg(feature = "database-postgres")]
        mod postgres_tests {
            use crate::db::tests::harness::postgres::postgres_db;
            $(
                #[tokio::test]
                #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
                async fn $name() {
                    let db = postgres_db().await;
                    super::$name(&db).await;
                }
            )*
        }
    };
}

mod api_keys;
pub mod harness;
mod phone_numbers;
mod sessions;
