use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use super::{HttpClient, HttpRequest, HttpResponse};

/// Default time allowed for a single CRL download.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`HttpClient`] backed by reqwest.
///
/// ```ignore
/// use mdoc_security::definitions::x509::revocation::{ReqwestClient, SimpleRevocationFetcher};
///
/// let fetcher = SimpleRevocationFetcher::new(ReqwestClient::new()?);
/// ```
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    type Error = reqwest::Error;

    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, Self::Error> {
        let mut builder = self.client.get(&request.url);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status, body })
    }
}
