mod common;

use std::io;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use citibike::config::SourceConfig;
use citibike::db::{route_id, Database, Tables};
use citibike::pipeline::{Pipeline, RunReport, Schedule};
use citibike::source::{Period, TripSource};
use citibike::Error;

use common::{counts, expected, table, trips_csv, zip_bytes, FakeHost};

const BASE_URL: &str = "https://tripdata.test/tripdata";

async fn sqlite() -> Database {
    Database::connect("sqlite::memory:", 1).await.unwrap()
}

fn test_tables() -> Tables {
    Tables {
        primary: table("test_trip_fact"),
        staging: table("test_trip_fact_stg"),
        routes: table("test_most_used_routes"),
    }
}

fn archive_url(period: &str) -> String {
    format!("{BASE_URL}/{period}-citibike-tripdata.csv.zip")
}

fn archive(period: &str, trips: &[(&str, &str, usize)]) -> Bytes {
    zip_bytes(&format!("{period}-citibike-tripdata.csv"), &trips_csv(trips))
}

fn pipeline(db: Database, host: FakeHost, schedule: Schedule) -> Pipeline<FakeHost> {
    let config = SourceConfig {
        base_url: BASE_URL.to_string(),
        dataset: "citibike".to_string(),
    };
    Pipeline::new(db, TripSource::new(host, &config), test_tables(), schedule)
}

/// (A, B) is counted independently of (B, A), existing pairs are updated and
/// new pairs are added.
#[tokio::test]
async fn test_aggregations() {
    let db = sqlite().await;
    let tables = test_tables();
    db.run_migrations(&tables).await.unwrap();

    let first = trips_csv(&[("A", "B", 5), ("B", "A", 5)]);
    db.load_trips(first.as_bytes(), &tables.primary).await.unwrap();
    db.aggregate_routes(&tables.primary, &tables.routes).await.unwrap();
    assert_eq!(
        counts(&db, &tables.routes).await,
        expected(&[("A", "B", 5), ("B", "A", 5)])
    );

    let second = trips_csv(&[("A", "B", 5), ("C", "D", 5)]);
    db.load_trips(second.as_bytes(), &tables.staging).await.unwrap();
    db.aggregate_routes(&tables.staging, &tables.routes).await.unwrap();
    assert_eq!(
        counts(&db, &tables.routes).await,
        expected(&[("A", "B", 10), ("B", "A", 5), ("C", "D", 5)])
    );

    let ab = db
        .route_counts(&tables.routes)
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.start_station_name.as_deref() == Some("A"))
        .unwrap();
    assert_eq!(ab.route_id, route_id("A", "B"));
}

#[tokio::test]
async fn test_merge_is_additive() {
    let db = sqlite().await;
    let tables = test_tables();
    db.run_migrations(&tables).await.unwrap();

    let five = trips_csv(&[("X", "Y", 5)]);
    let three = trips_csv(&[("X", "Y", 3)]);
    db.load_trips(five.as_bytes(), &tables.primary).await.unwrap();
    db.load_trips(three.as_bytes(), &tables.staging).await.unwrap();

    db.aggregate_routes(&tables.primary, &tables.routes).await.unwrap();
    db.aggregate_routes(&tables.staging, &tables.routes).await.unwrap();

    assert_eq!(counts(&db, &tables.routes).await, expected(&[("X", "Y", 8)]));
}

#[tokio::test]
async fn test_single_direction_creates_no_reverse_route() {
    let db = sqlite().await;
    let tables = test_tables();
    db.run_migrations(&tables).await.unwrap();

    let csv = trips_csv(&[("S", "E", 7)]);
    db.load_trips(csv.as_bytes(), &tables.primary).await.unwrap();
    db.aggregate_routes(&tables.primary, &tables.routes).await.unwrap();

    let routes = counts(&db, &tables.routes).await;
    assert_eq!(routes, expected(&[("S", "E", 7)]));
    assert!(!routes.contains_key(&("E".to_string(), "S".to_string())));
}

/// Loads are plain appends, so the same stream twice doubles every count.
#[tokio::test]
async fn test_double_load_doubles_counts() {
    let db = sqlite().await;
    let tables = test_tables();
    db.run_migrations(&tables).await.unwrap();

    let csv = trips_csv(&[("A", "B", 5)]);
    db.load_trips(csv.as_bytes(), &tables.primary).await.unwrap();
    db.load_trips(csv.as_bytes(), &tables.primary).await.unwrap();
    assert_eq!(db.row_count(&tables.primary).await.unwrap(), 10);

    db.aggregate_routes(&tables.primary, &tables.routes).await.unwrap();
    assert_eq!(counts(&db, &tables.routes).await, expected(&[("A", "B", 10)]));
}

#[tokio::test]
async fn test_run_loads_primary_then_staging() {
    let db = sqlite().await;
    db.run_migrations(&test_tables()).await.unwrap();

    let host = FakeHost::default()
        .serve(&archive_url("201801"), archive("201801", &[("A", "B", 2)]))
        .serve(&archive_url("201802"), archive("201802", &[("A", "B", 3), ("B", "A", 1)]))
        .serve(&archive_url("201803"), archive("201803", &[("A", "B", 4), ("C", "D", 6)]));
    let schedule = Schedule {
        primary: Period::range(2018, 1, 2).unwrap(),
        staging: Period::new(2018, 3).unwrap(),
    };

    let pipeline = pipeline(db.clone(), host, schedule);
    let report = pipeline.run().await.unwrap();

    assert_eq!(
        report,
        RunReport {
            primary_rows: 6,
            staging_rows: 10,
            primary_routes: 2,
            staging_routes: 2,
        }
    );

    let tables = test_tables();
    assert_eq!(db.row_count(&tables.primary).await.unwrap(), 6);
    assert_eq!(db.row_count(&tables.staging).await.unwrap(), 10);
    assert_eq!(
        counts(&db, &tables.routes).await,
        expected(&[("A", "B", 9), ("B", "A", 1), ("C", "D", 6)])
    );
}

#[tokio::test]
async fn test_run_aborts_on_missing_staging_archive() {
    let db = sqlite().await;
    db.run_migrations(&test_tables()).await.unwrap();

    let host = FakeHost::default()
        .serve(&archive_url("201801"), archive("201801", &[("A", "B", 2)]));
    let schedule = Schedule {
        primary: vec![Period::new(2018, 1).unwrap()],
        staging: Period::new(2018, 7).unwrap(),
    };

    let pipeline = pipeline(db.clone(), host, schedule);
    let err = pipeline.run().await.unwrap_err();
    match err {
        Error::RetrievalStatus { url, status } => {
            assert_eq!(url, archive_url("201807"));
            assert_eq!(status.as_u16(), 404);
        }
        other => panic!("expected RetrievalStatus, got {other:?}"),
    }

    // Work committed before the failure stays in place
    let tables = test_tables();
    assert_eq!(db.row_count(&tables.primary).await.unwrap(), 2);
    assert_eq!(db.row_count(&tables.staging).await.unwrap(), 0);
    assert_eq!(counts(&db, &tables.routes).await, expected(&[("A", "B", 2)]));
}

#[tokio::test]
async fn test_run_stops_at_first_failed_month() {
    let db = sqlite().await;
    db.run_migrations(&test_tables()).await.unwrap();

    // 201802 is missing, so 201803 is never loaded
    let host = FakeHost::default()
        .serve(&archive_url("201801"), archive("201801", &[("A", "B", 1)]))
        .serve(&archive_url("201803"), archive("201803", &[("A", "B", 1)]));
    let schedule = Schedule {
        primary: Period::range(2018, 1, 3).unwrap(),
        staging: Period::new(2018, 4).unwrap(),
    };

    let pipeline = pipeline(db.clone(), host, schedule);
    assert!(pipeline.run().await.is_err());

    let tables = test_tables();
    assert_eq!(db.row_count(&tables.primary).await.unwrap(), 1);
    assert!(counts(&db, &tables.routes).await.is_empty());
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_run_logs_each_aggregation_once() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let db = sqlite().await;
    db.run_migrations(&test_tables()).await.unwrap();
    let host = FakeHost::default()
        .serve(&archive_url("201801"), archive("201801", &[("A", "B", 1)]))
        .serve(&archive_url("201802"), archive("201802", &[("B", "A", 1)]));
    let schedule = Schedule {
        primary: vec![Period::new(2018, 1).unwrap()],
        staging: Period::new(2018, 2).unwrap(),
    };
    pipeline(db, host, schedule).run().await.unwrap();

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert_eq!(
        output
            .matches("Aggregating 'test_trip_fact' to 'test_most_used_routes'")
            .count(),
        1
    );
    assert_eq!(
        output
            .matches("Aggregating 'test_trip_fact_stg' to 'test_most_used_routes'")
            .count(),
        1
    );
}
