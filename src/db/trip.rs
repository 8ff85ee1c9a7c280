//! Trip fact rows as read from the published CSV files

use std::str::FromStr;

use csv::StringRecord;

use super::schema::TRIP_COLUMNS;

/// Token the CSV files use for SQL NULL.
pub const NULL_TOKEN: &str = "NULL";

/// One bicycle rental. Every column is nullable; timestamps are kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub tripduration: Option<i64>,
    pub starttime: Option<String>,
    pub stoptime: Option<String>,
    pub start_station_id: Option<i64>,
    pub start_station_name: Option<String>,
    pub start_station_latitude: Option<f64>,
    pub start_station_longitude: Option<f64>,
    pub end_station_id: Option<i64>,
    pub end_station_name: Option<String>,
    pub end_station_latitude: Option<f64>,
    pub end_station_longitude: Option<f64>,
    pub bikeid: Option<String>,
    pub usertype: Option<String>,
    pub birth_year: Option<i32>,
    pub gender: Option<i32>,
}

impl TripRecord {
    /// Map a CSV record onto the fact columns by position. Header names are
    /// never consulted.
    ///
    /// `quoted` flags, per field, whether the field was quoted in the source
    /// text. Only an unquoted `NULL` is read as SQL NULL; `"NULL"` is the
    /// four-letter string.
    pub fn from_record(record: &StringRecord, quoted: &[bool]) -> Result<Self, String> {
        if record.len() != TRIP_COLUMNS.len() {
            return Err(format!(
                "expected {} fields, found {}",
                TRIP_COLUMNS.len(),
                record.len()
            ));
        }

        Ok(Self {
            tripduration: parse_field(record, quoted, 0)?,
            starttime: parse_field(record, quoted, 1)?,
            stoptime: parse_field(record, quoted, 2)?,
            start_station_id: parse_field(record, quoted, 3)?,
            start_station_name: parse_field(record, quoted, 4)?,
            start_station_latitude: parse_field(record, quoted, 5)?,
            start_station_longitude: parse_field(record, quoted, 6)?,
            end_station_id: parse_field(record, quoted, 7)?,
            end_station_name: parse_field(record, quoted, 8)?,
            end_station_latitude: parse_field(record, quoted, 9)?,
            end_station_longitude: parse_field(record, quoted, 10)?,
            bikeid: parse_field(record, quoted, 11)?,
            usertype: parse_field(record, quoted, 12)?,
            birth_year: parse_field(record, quoted, 13)?,
            gender: parse_field(record, quoted, 14)?,
        })
    }
}

fn parse_field<T: FromStr>(
    record: &StringRecord,
    quoted: &[bool],
    idx: usize,
) -> Result<Option<T>, String> {
    let raw = record.get(idx).unwrap_or_default();
    if raw == NULL_TOKEN && !quoted.get(idx).copied().unwrap_or(false) {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| format!("invalid value '{}' for column {}", raw, TRIP_COLUMNS[idx]))
}

/// For each field of one raw CSV record, whether it opened with a quote.
///
/// `raw` must be a record the CSV reader already accepted, so field
/// boundaries only need the quote state to be tracked.
pub fn quoted_fields(raw: &[u8]) -> Vec<bool> {
    let start = raw
        .iter()
        .position(|b| !matches!(b, b'\r' | b'\n'))
        .unwrap_or(raw.len());

    let mut flags = Vec::new();
    let mut field_start = true;
    let mut in_quotes = false;
    for &b in &raw[start..] {
        if field_start {
            flags.push(b == b'"');
            field_start = false;
        }
        match b {
            b'"' => in_quotes = !in_quotes,
            b',' if !in_quotes => field_start = true,
            b'\r' | b'\n' if !in_quotes => break,
            _ => {}
        }
    }
    if field_start && start < raw.len() {
        // trailing empty field at end of input
        flags.push(false);
    }
    flags
}
