//! Citi Bike loader - extract, load and aggregate monthly trip data
//!
//! Downloads the monthly trip archives, bulk-loads them into the primary and
//! staging fact tables and keeps `most_used_routes` up to date.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use citibike::config::Config;
use citibike::db::Database;
use citibike::pipeline::{Pipeline, Schedule};
use citibike::source::{BasicClient, TripSource};

const CONFIG_PATH: &str = "citibike";
const TOP_ROUTES: u32 = 5;

#[derive(Parser)]
#[command(name = "citibike")]
#[command(about = "Extract and load citibike trip data", long_about = None)]
struct Cli {
    /// Target database URI
    #[arg(short, long)]
    uri: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load(CONFIG_PATH, cli.uri.as_deref())?;

    init_logging(&config.logging.level);
    info!("Configuration loaded");

    let db = Database::connect(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to database")?;
    let tables = config.tables.resolve()?;
    db.run_migrations(&tables).await?;
    info!("Database initialized");

    let client = BasicClient::new(config.http.timeout_secs.map(Duration::from_secs))?;
    let source = TripSource::new(client, &config.source);
    let schedule = Schedule::from_config(&config.schedule)?;

    let pipeline = Pipeline::new(db, source, tables, schedule);
    let report = pipeline.run().await?;

    info!(
        "Run complete: {} primary rows, {} staging rows, {} + {} routes merged",
        report.primary_rows, report.staging_rows, report.primary_routes, report.staging_routes
    );

    let routes = &pipeline.tables().routes;
    for route in pipeline.database().top_routes(routes, TOP_ROUTES).await? {
        info!(
            "{} -> {}: {} trips",
            route.start_station_name.as_deref().unwrap_or("NULL"),
            route.end_station_name.as_deref().unwrap_or("NULL"),
            route.num_trips
        );
    }

    Ok(())
}

/// Timestamped lines on stdout; LOG_FORMAT=gcp switches to structured GCP
/// Cloud Logging. RUST_LOG overrides the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stdout)
            .init();
    }
}
