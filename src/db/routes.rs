//! Route aggregation
//!
//! Trip counts per directional (start, end) station pair are merged into a
//! running total. Merges only ever add to existing counts, so aggregating two
//! disjoint fact tables in either order gives the same result. Aggregating the
//! same fact table twice counts it twice.

use md5::{Digest, Md5};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use super::schema::TableName;
use super::{Backend, Database};
use crate::error::{Error, Result};

/// One row of the routes table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteCount {
    pub route_id: String,
    pub start_station_name: Option<String>,
    pub end_station_name: Option<String>,
    pub num_trips: i64,
}

/// Hex MD5 of `start` followed by `end`, the same value as Postgres
/// `MD5(CONCAT(start, end))`.
///
/// The pair is ordered: `route_id("A", "B") != route_id("B", "A")`. Pairs
/// whose concatenations coincide share an id.
pub fn route_id(start: &str, end: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(start.as_bytes());
    hasher.update(end.as_bytes());
    hex::encode(hasher.finalize())
}

type RouteRow = (String, Option<String>, Option<String>, i64);

impl Database {
    /// Count trips per (start, end) pair in `source` and add the counts into
    /// `target`, inserting pairs it has not seen before.
    ///
    /// Every row of a group is counted (`COUNT(*)`), including rows whose
    /// start station is NULL.
    ///
    /// Returns the number of routes inserted or updated.
    pub async fn aggregate_routes(&self, source: &TableName, target: &TableName) -> Result<u64> {
        info!("Aggregating '{}' to '{}'", source, target);

        let merged = match &self.backend {
            Backend::Postgres(pool) => {
                let sql = format!(
                    r#"
                    INSERT INTO {target} (route_id, start_station_name, end_station_name, num_trips)
                        SELECT
                            MD5(CONCAT(start_station_name, end_station_name)) AS route_id,
                            start_station_name,
                            end_station_name,
                            COUNT(*) AS num_trips
                        FROM
                            {source}
                        GROUP BY
                            start_station_name,
                            end_station_name
                    ON CONFLICT (route_id) DO
                    UPDATE SET num_trips = {target}.num_trips + EXCLUDED.num_trips
                    "#
                );
                sqlx::query(&sql)
                    .execute(pool)
                    .await
                    .map(|r| r.rows_affected())
            }
            Backend::Sqlite(pool) => merge_sqlite(pool, source, target).await,
        };

        let merged = merged.map_err(|e| Error::Aggregation {
            source_table: source.to_string(),
            target: target.to_string(),
            source: e,
        })?;

        info!("Merged {} routes into '{}'", merged, target);
        Ok(merged)
    }

    /// Every route in `table`, ordered by start then end station.
    pub async fn route_counts(&self, table: &TableName) -> Result<Vec<RouteCount>> {
        let sql = format!(
            "SELECT route_id, start_station_name, end_station_name, num_trips \
             FROM {table} ORDER BY start_station_name, end_station_name"
        );
        self.fetch_routes(&sql).await
    }

    /// The `limit` routes with the most trips.
    pub async fn top_routes(&self, table: &TableName, limit: u32) -> Result<Vec<RouteCount>> {
        let sql = format!(
            "SELECT route_id, start_station_name, end_station_name, num_trips \
             FROM {table} ORDER BY num_trips DESC, route_id LIMIT {limit}"
        );
        self.fetch_routes(&sql).await
    }

    async fn fetch_routes(&self, sql: &str) -> Result<Vec<RouteCount>> {
        let rows: Vec<RouteRow> = match &self.backend {
            Backend::Postgres(pool) => sqlx::query_as(sql).fetch_all(pool).await?,
            Backend::Sqlite(pool) => sqlx::query_as(sql).fetch_all(pool).await?,
        };

        Ok(rows
            .into_iter()
            .map(|(route_id, start_station_name, end_station_name, num_trips)| RouteCount {
                route_id,
                start_station_name,
                end_station_name,
                num_trips,
            })
            .collect())
    }
}

/// SQLite has no MD5, so pairs are grouped in SQL and ids derived here. All
/// upserts share one transaction, which keeps the merge all-or-nothing.
async fn merge_sqlite(
    pool: &SqlitePool,
    source: &TableName,
    target: &TableName,
) -> sqlx::Result<u64> {
    let mut tx = pool.begin().await?;

    let pairs: Vec<(Option<String>, Option<String>, i64)> = sqlx::query_as(&format!(
        "SELECT start_station_name, end_station_name, COUNT(*) \
         FROM {source} GROUP BY start_station_name, end_station_name"
    ))
    .fetch_all(&mut *tx)
    .await?;

    let upsert = format!(
        "INSERT INTO {target} (route_id, start_station_name, end_station_name, num_trips) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT (route_id) DO UPDATE SET num_trips = num_trips + excluded.num_trips"
    );

    for (start, end, count) in &pairs {
        let id = route_id(
            start.as_deref().unwrap_or_default(),
            end.as_deref().unwrap_or_default(),
        );
        sqlx::query(&upsert)
            .bind(id)
            .bind(start)
            .bind(end)
            .bind(count)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(pairs.len() as u64)
}
