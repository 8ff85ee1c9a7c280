//! Error types for the pipeline

use reqwest::StatusCode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to retrieve '{url}': {source}")]
    Retrieval {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("retrieving '{url}' returned HTTP {status}")]
    RetrievalStatus { url: String, status: StatusCode },

    #[error("'{url}' is not a readable zip archive: {source}")]
    Archive {
        url: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive '{url}' has no entry named '{entry}'")]
    MissingEntry { url: String, entry: String },

    #[error("bulk load into '{table}' was rejected: {source}")]
    Load {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to read CSV stream for '{table}': {source}")]
    LoadRead {
        table: String,
        #[source]
        source: std::io::Error,
    },

    #[error("rejected CSV row at line {line} for '{table}': {reason}")]
    LoadRecord {
        table: String,
        line: u64,
        reason: String,
    },

    #[error("aggregating '{source_table}' into '{target}' failed: {source}")]
    Aggregation {
        source_table: String,
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("invalid period {year:04}-{month:02}")]
    InvalidPeriod { year: u16, month: u8 },

    #[error("unsupported database scheme '{0}' (expected postgres:// or sqlite:)")]
    UnsupportedUri(String),
}
