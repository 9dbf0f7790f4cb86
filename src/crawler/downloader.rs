//! Transport seam used by `AsyncCrawler`.

use crate::error::ScanError;
use crate::http::{Request, Response};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::trace;

/// Performs the network exchange for one request.
#[async_trait]
pub trait Downloader: Send + Sync + 'static {
    async fn download(&self, request: Request) -> Result<Response, ScanError>;
}

/// `Downloader` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestDownloader {
    client: Client,
}

impl ReqwestDownloader {
    /// Creates a downloader with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, ScanError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("probe-core/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ReqwestDownloader { client })
    }

    pub fn with_client(client: Client) -> Self {
        ReqwestDownloader { client }
    }
}

#[async_trait]
impl Downloader for ReqwestDownloader {
    async fn download(&self, request: Request) -> Result<Response, ScanError> {
        trace!("Downloading {} {}", request.method, request.url);
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let url = response.url().clone();
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?;

        Ok(Response {
            url,
            status,
            headers,
            body,
        })
    }
}
