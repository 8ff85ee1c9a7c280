//! Monthly trip archive retrieval
//!
//! Archives are published as `{YYYYMM}-{dataset}-tripdata.csv.zip` under a
//! common base URL, each holding a single CSV named after the archive.

mod archive;
mod client;
mod period;

pub use archive::TripArchive;
pub use client::{BasicClient, HttpClient, HttpResponse};
pub use period::Period;

use tracing::info;

use crate::config::SourceConfig;
use crate::error::{Error, Result};

pub struct TripSource<C = BasicClient> {
    client: C,
    base_url: String,
    dataset: String,
}

impl<C: HttpClient> TripSource<C> {
    pub fn new(client: C, config: &SourceConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            dataset: config.dataset.clone(),
        }
    }

    /// Name of the CSV entry inside the archive for `period`.
    pub fn entry_name(&self, period: Period) -> String {
        format!("{}-{}-tripdata.csv", period, self.dataset)
    }

    pub fn archive_url(&self, period: Period) -> String {
        format!("{}/{}.zip", self.base_url, self.entry_name(period))
    }

    /// Download the archive for `period` and check it holds the expected CSV.
    ///
    /// The whole body is buffered in memory before it is opened. Any
    /// non-success status is an error; nothing is retried.
    pub async fn fetch(&self, period: Period) -> Result<TripArchive> {
        let url = self.archive_url(period);
        let entry = self.entry_name(period);

        info!("Retrieving '{}'", url);
        let resp = match self.client.get(&url).await {
            Ok(resp) => resp,
            Err(source) => return Err(Error::Retrieval { url, source }),
        };
        if !resp.status.is_success() {
            return Err(Error::RetrievalStatus {
                url,
                status: resp.status,
            });
        }

        info!("Decompressing '{}' ({} KB)", entry, resp.body.len() / 1024);
        TripArchive::from_bytes(url, entry, resp.body)
    }
}
