//! Fetch, load and aggregate orchestration
//!
//! The run is a fixed sequence with no branching on data:
//!
//! 1. every primary month is fetched and loaded into the primary fact table
//! 2. the primary fact table is aggregated into the routes table
//! 3. the staging month is fetched and loaded into the staging fact table
//! 4. the staging fact table is aggregated into the routes table
//!
//! The first failure aborts the run. Whatever was committed before it stays,
//! so re-running after a failure loads those months again.

use tracing::info;

use crate::config::ScheduleConfig;
use crate::db::{Database, TableName, Tables};
use crate::error::Result;
use crate::source::{BasicClient, HttpClient, Period, TripSource};

/// Which months go to the primary fact table and which one is staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub primary: Vec<Period>,
    pub staging: Period,
}

impl Schedule {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Ok(Self {
            primary: config.primary_periods()?,
            staging: config.staging_period()?,
        })
    }
}

/// Totals for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub primary_rows: u64,
    pub staging_rows: u64,
    pub primary_routes: u64,
    pub staging_routes: u64,
}

pub struct Pipeline<C = BasicClient> {
    db: Database,
    source: TripSource<C>,
    tables: Tables,
    schedule: Schedule,
}

impl<C: HttpClient> Pipeline<C> {
    pub fn new(db: Database, source: TripSource<C>, tables: Tables, schedule: Schedule) -> Self {
        Self {
            db,
            source,
            tables,
            schedule,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub async fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::default();

        info!(
            "Populating '{}' with {} month(s) of data",
            self.tables.primary,
            self.schedule.primary.len()
        );
        for period in &self.schedule.primary {
            report.primary_rows += self.load_period(*period, &self.tables.primary).await?;
        }

        report.primary_routes = self
            .db
            .aggregate_routes(&self.tables.primary, &self.tables.routes)
            .await?;

        info!(
            "Populating '{}' with {} data",
            self.tables.staging, self.schedule.staging
        );
        report.staging_rows = self
            .load_period(self.schedule.staging, &self.tables.staging)
            .await?;

        report.staging_routes = self
            .db
            .aggregate_routes(&self.tables.staging, &self.tables.routes)
            .await?;

        Ok(report)
    }

    /// Fetch one month and append it to `table`.
    pub async fn load_period(&self, period: Period, table: &TableName) -> Result<u64> {
        let mut archive = self.source.fetch(period).await?;
        let csv = archive.csv()?;
        self.db.load_trips(csv, table).await
    }
}
