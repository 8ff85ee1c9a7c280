//! Bulk loading of trip CSV streams into fact tables
//!
//! Input is a CSV stream with a header line, `,` delimiter, `"` quoting and
//! the literal `NULL` for missing values. Columns map onto the fact table by
//! position. Every load runs in one transaction and commits before returning,
//! so a rejected stream leaves nothing behind. Loads are plain appends:
//! loading the same stream twice stores every row twice.

use std::io::{self, ErrorKind, Read};

use sqlx::{PgPool, QueryBuilder, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use super::schema::{TableName, TRIP_COLUMNS};
use super::trip::{quoted_fields, TripRecord};
use super::{Backend, Database};
use crate::error::{Error, Result};

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// 15 bound parameters per row keeps a batch well under SQLite's variable limit.
const INSERT_BATCH_SIZE: usize = 500;

impl Database {
    /// Append every data row of `reader` to `table`, returning the row count.
    pub async fn load_trips<R: Read>(&self, reader: R, table: &TableName) -> Result<u64> {
        info!("Copying to '{}'", table);

        let rows = match &self.backend {
            Backend::Postgres(pool) => copy_postgres(pool, reader, table).await?,
            Backend::Sqlite(pool) => insert_sqlite(pool, reader, table).await?,
        };

        info!("Loaded {} rows into '{}'", rows, table);
        Ok(rows)
    }
}

async fn copy_postgres<R: Read>(pool: &PgPool, mut reader: R, table: &TableName) -> Result<u64> {
    let load_err = |source| Error::Load {
        table: table.to_string(),
        source,
    };

    let statement = format!(
        "COPY {table} FROM STDIN WITH CSV HEADER DELIMITER ',' NULL 'NULL' QUOTE '\"'"
    );

    let mut tx = pool.begin().await.map_err(load_err)?;
    let mut copy = tx.copy_in_raw(&statement).await.map_err(load_err)?;

    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                // The transaction is rolled back when `tx` drops
                let _ = copy.abort(source.to_string()).await;
                return Err(Error::LoadRead {
                    table: table.to_string(),
                    source,
                });
            }
        };
        copy.send(&buf[..n]).await.map_err(load_err)?;
    }

    let rows = copy.finish().await.map_err(load_err)?;
    tx.commit().await.map_err(load_err)?;
    Ok(rows)
}

async fn insert_sqlite<R: Read>(pool: &SqlitePool, reader: R, table: &TableName) -> Result<u64> {
    let load_err = |source| Error::Load {
        table: table.to_string(),
        source,
    };
    let record_err = |line: u64, reason: String| Error::LoadRecord {
        table: table.to_string(),
        line,
        reason,
    };

    // The header is skipped unread, so its field count is never compared
    // against the data rows.
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(b',')
        .quote(b'"')
        .from_reader(RawTap::new(reader));

    let mut tx = pool.begin().await.map_err(load_err)?;
    let mut batch: Vec<TripRecord> = Vec::with_capacity(INSERT_BATCH_SIZE);
    let mut total = 0u64;
    let mut record = csv::StringRecord::new();
    let mut header = true;

    loop {
        match rdr.read_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or_default();
                return Err(record_err(line, e.to_string()));
            }
        }
        let end = rdr.position().byte();
        let raw = rdr.get_mut().consume(end);
        if header {
            header = false;
            continue;
        }

        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let trip = TripRecord::from_record(&record, &quoted_fields(&raw))
            .map_err(|reason| record_err(line, reason))?;
        batch.push(trip);

        if batch.len() >= INSERT_BATCH_SIZE {
            total += insert_batch(&mut tx, table, &batch).await.map_err(load_err)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        total += insert_batch(&mut tx, table, &batch).await.map_err(load_err)?;
    }

    tx.commit().await.map_err(load_err)?;
    Ok(total)
}

/// Keeps the bytes the CSV reader has pulled but not yet handed back as
/// records, so each record's source text can be inspected after parsing.
struct RawTap<R> {
    inner: R,
    pending: Vec<u8>,
    offset: u64,
}

impl<R> RawTap<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            offset: 0,
        }
    }

    /// Take everything up to the absolute byte position `end`.
    fn consume(&mut self, end: u64) -> Vec<u8> {
        let n = (end.saturating_sub(self.offset) as usize).min(self.pending.len());
        self.offset += n as u64;
        self.pending.drain(..n).collect()
    }
}

impl<R: Read> Read for RawTap<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pending.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

async fn insert_batch(
    tx: &mut Transaction<'_, Sqlite>,
    table: &TableName,
    batch: &[TripRecord],
) -> sqlx::Result<u64> {
    debug!("Inserting batch of {} rows into '{}'", batch.len(), table);

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("INSERT INTO {} ({}) ", table, TRIP_COLUMNS.join(", ")));
    qb.push_values(batch, |mut row, trip| {
        row.push_bind(trip.tripduration)
            .push_bind(trip.starttime.clone())
            .push_bind(trip.stoptime.clone())
            .push_bind(trip.start_station_id)
            .push_bind(trip.start_station_name.clone())
            .push_bind(trip.start_station_latitude)
            .push_bind(trip.start_station_longitude)
            .push_bind(trip.end_station_id)
            .push_bind(trip.end_station_name.clone())
            .push_bind(trip.end_station_latitude)
            .push_bind(trip.end_station_longitude)
            .push_bind(trip.bikeid.clone())
            .push_bind(trip.usertype.clone())
            .push_bind(trip.birth_year)
            .push_bind(trip.gender);
    });

    let result = qb.build().execute(&mut **tx).await?;
    Ok(result.rows_affected())
}
