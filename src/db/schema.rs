//! Database schema definitions
//!
//! Table names are interpolated into SQL, so they only enter the crate through
//! [`TableName::new`].

use std::fmt;

use crate::error::{Error, Result};

/// Postgres truncates identifiers beyond this length.
const MAX_IDENTIFIER_LEN: usize = 63;

/// A validated, unquoted SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
            return Err(Error::InvalidTableName(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two fact table variants and the routes table they aggregate into.
#[derive(Debug, Clone)]
pub struct Tables {
    pub primary: TableName,
    pub staging: TableName,
    pub routes: TableName,
}

/// Fact table columns in load order. CSV input must follow this order.
pub const TRIP_COLUMNS: [&str; 15] = [
    "tripduration",
    "starttime",
    "stoptime",
    "start_station_id",
    "start_station_name",
    "start_station_latitude",
    "start_station_longitude",
    "end_station_id",
    "end_station_name",
    "end_station_latitude",
    "end_station_longitude",
    "bikeid",
    "usertype",
    "birth_year",
    "gender",
];

/// DDL for one trip fact table variant.
///
/// Timestamps stay TEXT; they are never parsed.
pub fn trip_fact_schema(table: &TableName) -> Vec<String> {
    vec![
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {table} (
    tripduration BIGINT,
    starttime TEXT,
    stoptime TEXT,
    start_station_id BIGINT,
    start_station_name TEXT,
    start_station_latitude DOUBLE PRECISION,
    start_station_longitude DOUBLE PRECISION,
    end_station_id BIGINT,
    end_station_name TEXT,
    end_station_latitude DOUBLE PRECISION,
    end_station_longitude DOUBLE PRECISION,
    bikeid TEXT,
    usertype TEXT,
    birth_year INTEGER,
    gender INTEGER
)
"#
        ),
        station_name_index(table, "start_station_name"),
        station_name_index(table, "end_station_name"),
    ]
}

/// DDL for one routes table variant.
pub fn route_schema(table: &TableName) -> Vec<String> {
    vec![
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {table} (
    route_id TEXT PRIMARY KEY,
    start_station_name TEXT,
    end_station_name TEXT,
    num_trips BIGINT NOT NULL DEFAULT 0
)
"#
        ),
        station_name_index(table, "start_station_name"),
        station_name_index(table, "end_station_name"),
    ]
}

fn station_name_index(table: &TableName, column: &str) -> String {
    format!("CREATE INDEX IF NOT EXISTS ix_{table}_{column} ON {table} ({column})")
}
