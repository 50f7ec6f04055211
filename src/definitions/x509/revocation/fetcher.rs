use std::time::Duration;

use async_trait::async_trait;
use x509_cert::crl::CertificateList;

use super::{
    error::CrlError,
    http::{HttpClient, HttpRequest},
    parse_crl,
};

/// Source of CRLs.
///
/// Implementations only download and parse; signature and freshness checks are done by
/// [`check_certificates_revocation`](super::check_certificates_revocation).
#[async_trait]
pub trait RevocationFetcher: Send + Sync {
    async fn fetch_crl(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<CertificateList, CrlError>;
}

/// Fetches every CRL through an [`HttpClient`], without caching.
pub struct SimpleRevocationFetcher<C> {
    http_client: C,
}

impl<C: HttpClient> SimpleRevocationFetcher<C> {
    pub fn new(http_client: C) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl<C: HttpClient> RevocationFetcher for SimpleRevocationFetcher<C> {
    async fn fetch_crl(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<CertificateList, CrlError> {
        let request = HttpRequest {
            url: url.to_string(),
            timeout,
        };

        let response = self
            .http_client
            .request(request)
            .await
            .map_err(|e| CrlError::Fetch {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        if response.status != 200 {
            return Err(CrlError::Fetch {
                url: url.to_string(),
                source: format!("HTTP status {}", response.status).into(),
            });
        }

        parse_crl(&response.body)
    }
}

/// Revocation checking without a network: every CRL is unavailable.
#[async_trait]
impl RevocationFetcher for () {
    async fn fetch_crl(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<CertificateList, CrlError> {
        SimpleRevocationFetcher::new(()).fetch_crl(url, timeout).await
    }
}
