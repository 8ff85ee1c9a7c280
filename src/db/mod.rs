//! Database module
//!
//! Postgres is the warehouse target. SQLite is supported for local runs and
//! tests; it has no COPY protocol, so loads fall back to batched inserts.

mod load;
mod routes;
mod schema;
mod trip;

pub use routes::{route_id, RouteCount};
pub use schema::{route_schema, trip_fact_schema, TableName, Tables, TRIP_COLUMNS};
pub use trip::{TripRecord, NULL_TOKEN};

use std::str::FromStr;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{PgPool, SqlitePool};
use tracing::info;

use crate::error::{Error, Result};

#[derive(Clone)]
enum Backend {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Connection pool shared by every load and aggregation of a run.
#[derive(Clone)]
pub struct Database {
    backend: Backend,
}

impl Database {
    /// Connect using the URI scheme to pick a backend.
    ///
    /// `postgresql+<driver>://` URIs are accepted and treated as `postgres://`.
    /// In-memory SQLite databases are pinned to one connection that never
    /// expires, since each connection would otherwise see its own database.
    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self> {
        let (scheme, rest) = uri.split_once(':').unwrap_or((uri, ""));
        let driver = scheme.split('+').next().unwrap_or(scheme);

        let backend = match driver {
            "postgres" | "postgresql" => {
                let pool = PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect(&format!("postgres:{rest}"))
                    .await?;
                Backend::Postgres(pool)
            }
            "sqlite" => {
                let options = SqliteConnectOptions::from_str(uri)?.create_if_missing(true);
                let in_memory = uri.contains(":memory:") || uri.contains("mode=memory");
                let pool = if in_memory {
                    SqlitePoolOptions::new()
                        .max_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                        .connect_with(options)
                        .await?
                } else {
                    SqlitePoolOptions::new()
                        .max_connections(max_connections)
                        .connect_with(options)
                        .await?
                };
                Backend::Sqlite(pool)
            }
            _ => return Err(Error::UnsupportedUri(scheme.to_string())),
        };

        let db = Self { backend };
        info!("Connected to {} database", db.backend_name());
        Ok(db)
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Postgres(_) => "postgres",
            Backend::Sqlite(_) => "sqlite",
        }
    }

    /// Create the fact and routes tables if they do not exist yet.
    pub async fn run_migrations(&self, tables: &Tables) -> Result<()> {
        self.create_fact_table(&tables.primary).await?;
        self.create_fact_table(&tables.staging).await?;
        self.create_route_table(&tables.routes).await
    }

    pub async fn create_fact_table(&self, table: &TableName) -> Result<()> {
        for sql in trip_fact_schema(table) {
            self.execute(&sql).await?;
        }
        Ok(())
    }

    pub async fn create_route_table(&self, table: &TableName) -> Result<()> {
        for sql in route_schema(table) {
            self.execute(&sql).await?;
        }
        Ok(())
    }

    pub async fn drop_table(&self, table: &TableName) -> Result<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {table}")).await?;
        Ok(())
    }

    pub async fn row_count(&self, table: &TableName) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let count: i64 = match &self.backend {
            Backend::Postgres(pool) => sqlx::query_scalar(&sql).fetch_one(pool).await?,
            Backend::Sqlite(pool) => sqlx::query_scalar(&sql).fetch_one(pool).await?,
        };
        Ok(count)
    }

    async fn execute(&self, sql: &str) -> sqlx::Result<u64> {
        let result = match &self.backend {
            Backend::Postgres(pool) => sqlx::query(sql).execute(pool).await?.rows_affected(),
            Backend::Sqlite(pool) => sqlx::query(sql).execute(pool).await?.rows_affected(),
        };
        Ok(result)
    }
}
