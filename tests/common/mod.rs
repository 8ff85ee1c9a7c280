#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

use citibike::db::{Database, TableName};
use citibike::source::{HttpClient, HttpResponse};

pub const HEADER: &str = "tripduration,starttime,stoptime,start station id,\
    start station name,start station latitude,start station longitude,\
    end station id,end station name,end station latitude,\
    end station longitude,bikeid,usertype,birth year,gender\n";

/// Trip CSV with `n` rows for every `(start, end, n)`.
pub fn trips_csv(trips: &[(&str, &str, usize)]) -> String {
    let mut csv = HEADER.to_string();
    for (start, end, n) in trips {
        for _ in 0..*n {
            csv.push_str(&format!(
                "0,NULL,NULL,0,{start},0.0,0.0,0,{end},0.0,0.0,NULL,NULL,0,0\n"
            ));
        }
    }
    csv
}

pub fn zip_bytes(entry: &str, content: &str) -> Bytes {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(entry, zip::write::FileOptions::default())
        .unwrap();
    writer.write_all(content.as_bytes()).unwrap();
    Bytes::from(writer.finish().unwrap().into_inner())
}

/// Serves registered bodies by URL and 404s everything else.
#[derive(Default)]
pub struct FakeHost {
    bodies: HashMap<String, Bytes>,
    pub requested: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn serve(mut self, url: &str, body: Bytes) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHost {
    async fn get(&self, url: &str) -> reqwest::Result<HttpResponse> {
        self.requested.lock().unwrap().push(url.to_string());
        Ok(match self.bodies.get(url) {
            Some(body) => HttpResponse {
                status: StatusCode::OK,
                body: body.clone(),
            },
            None => HttpResponse {
                status: StatusCode::NOT_FOUND,
                body: Bytes::from_static(b"<Error><Code>NoSuchKey</Code></Error>"),
            },
        })
    }
}

pub fn table(name: &str) -> TableName {
    TableName::new(name).unwrap()
}

/// Route counts keyed by (start, end) name.
pub async fn counts(db: &Database, routes: &TableName) -> HashMap<(String, String), i64> {
    db.route_counts(routes)
        .await
        .unwrap()
        .into_iter()
        .map(|r| {
            (
                (
                    r.start_station_name.unwrap_or_default(),
                    r.end_station_name.unwrap_or_default(),
                ),
                r.num_trips,
            )
        })
        .collect()
}

pub fn expected(pairs: &[(&str, &str, i64)]) -> HashMap<(String, String), i64> {
    pairs
        .iter()
        .map(|(s, e, n)| ((s.to_string(), e.to_string()), *n))
        .collect()
}
