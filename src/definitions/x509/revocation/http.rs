//! Transport used to download CRLs.

use std::time::Duration;

use async_trait::async_trait;

/// A GET request for revocation data.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    /// Overrides the client's own timeout when set.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Plain HTTP transport with no knowledge of CRLs.
///
/// Content types are not checked: CRL servers are inconsistent about them and the body is
/// parsed as DER or PEM anyway.
#[async_trait]
pub trait HttpClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, Self::Error>;
}

#[derive(Debug, thiserror::Error)]
#[error("no HTTP client configured")]
pub struct NoHttpClientError;

/// `()` never reaches the network, so every CRL is unavailable.
#[async_trait]
impl HttpClient for () {
    type Error = NoHttpClientError;

    async fn request(&self, _request: HttpRequest) -> Result<HttpResponse, Self::Error> {
        Err(NoHttpClientError)
    }
}
