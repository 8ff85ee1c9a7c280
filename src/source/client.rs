use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

/// Status and fully buffered body of a GET request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> reqwest::Result<HttpResponse>;
}

/// [`HttpClient`] backed by a plain `reqwest::Client`.
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    /// Without a timeout a stalled transfer blocks until the peer gives up.
    pub fn new(timeout: Option<Duration>) -> reqwest::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self(builder.build()?))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn get(&self, url: &str) -> reqwest::Result<HttpResponse> {
        let resp = self.0.get(url).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        Ok(HttpResponse { status, body })
    }
}
