//! Certificate revocation through CRL distribution points.
//!
//! [`HttpClient`] is the only platform-specific piece; CRL parsing, signature and freshness
//! checks live here.

mod error;
mod fetcher;
mod http;

#[cfg(feature = "reqwest")]
mod reqwest_client;

pub use error::{CrlError, RevocationStatus};
pub use fetcher::{RevocationFetcher, SimpleRevocationFetcher};
pub use http::{HttpClient, HttpRequest, HttpResponse, NoHttpClientError};

#[cfg(feature = "reqwest")]
pub use reqwest_client::{ReqwestClient, DEFAULT_TIMEOUT};

use std::time::Duration;

use const_oid::{AssociatedOid, ObjectIdentifier};
use der::{Decode, Encode};
use time::OffsetDateTime;
use tracing::{error, warn};
use x509_cert::{
    crl::CertificateList,
    ext::pkix::{
        name::{DistributionPointName, GeneralName},
        AuthorityKeyIdentifier, CrlDistributionPoints, CrlNumber, FreshestCrl, IssuerAltName,
    },
    Certificate,
};

use super::validation::signature::verify_signature;

const PEM_LABEL: &str = "X509 CRL";

const OID_ISSUING_DISTRIBUTION_POINT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.28");
const OID_CRL_REASON: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.21");
const OID_INVALIDITY_DATE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.24");
const OID_CERTIFICATE_ISSUER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.29");

/// CRL extensions that may be marked critical (RFC 5280 section 5.2).
const RECOGNIZED_CRL_EXTENSIONS: &[ObjectIdentifier] = &[
    AuthorityKeyIdentifier::OID,
    IssuerAltName::OID,
    CrlNumber::OID,
    OID_ISSUING_DISTRIBUTION_POINT,
    FreshestCrl::OID,
];

const RECOGNIZED_CRL_ENTRY_EXTENSIONS: &[ObjectIdentifier] =
    &[OID_CRL_REASON, OID_INVALIDITY_DATE, OID_CERTIFICATE_ISSUER];

/// Parse a CRL encoded as DER or as PEM with the `X509 CRL` label.
pub fn parse_crl(bytes: &[u8]) -> Result<CertificateList, CrlError> {
    if bytes.starts_with(b"-----BEGIN") {
        let (label, der) = pem_rfc7468::decode_vec(bytes)
            .map_err(|e| CrlError::Parse(e.into()))?;
        if label != PEM_LABEL {
            return Err(CrlError::Parse(
                pem_rfc7468::Error::UnexpectedTypeLabel {
                    expected: PEM_LABEL,
                }
                .into(),
            ));
        }
        return Ok(CertificateList::from_der(&der)?);
    }

    Ok(CertificateList::from_der(bytes)?)
}

/// URIs of the CRL distribution points of a certificate.
pub fn extract_crl_urls(cert: &Certificate) -> Result<Vec<String>, CrlError> {
    let Some(ext) = cert
        .tbs_certificate
        .extensions
        .iter()
        .flatten()
        .find(|ext| ext.extn_id == CrlDistributionPoints::OID)
    else {
        return Err(CrlError::NoDistributionPoint);
    };

    let crl_dps = CrlDistributionPoints::from_der(ext.extn_value.as_bytes())?;
    let urls: Vec<String> = crl_dps
        .0
        .iter()
        .filter_map(|dp| match dp.distribution_point.as_ref() {
            Some(DistributionPointName::FullName(names)) => Some(names),
            _ => None,
        })
        .flatten()
        .filter_map(|gn| match gn {
            GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
            _ => None,
        })
        .collect();

    if urls.is_empty() {
        return Err(CrlError::NoDistributionPoint);
    }

    Ok(urls)
}

/// Check that `signing_cert` issued the CRL, that the CRL is fresh at `at`, and that it carries
/// no critical extension this module does not understand.
pub fn validate_crl_signature(
    crl: &CertificateList,
    signing_cert: &Certificate,
    at: OffsetDateTime,
) -> Result<(), CrlError> {
    if crl.tbs_cert_list.issuer != signing_cert.tbs_certificate.subject {
        return Err(CrlError::IssuerMismatch);
    }

    validate_crl_validity(crl, at)?;
    validate_crl_extensions(crl)?;

    let tbs = crl.tbs_cert_list.to_der().map_err(|e| {
        error!("failed to encode CRL TBS: {e:?}");
        CrlError::SignatureInvalid
    })?;

    if !verify_signature(
        signing_cert,
        &crl.signature_algorithm.oid,
        crl.signature.raw_bytes(),
        &tbs,
    ) {
        return Err(CrlError::SignatureInvalid);
    }

    Ok(())
}

fn validate_crl_extensions(crl: &CertificateList) -> Result<(), CrlError> {
    let unrecognized = crl
        .tbs_cert_list
        .crl_extensions
        .iter()
        .flatten()
        .find(|ext| ext.critical && !RECOGNIZED_CRL_EXTENSIONS.contains(&ext.extn_id))
        .or_else(|| {
            crl.tbs_cert_list
                .revoked_certificates
                .iter()
                .flatten()
                .flat_map(|revoked| revoked.crl_entry_extensions.iter().flatten())
                .find(|ext| {
                    ext.critical && !RECOGNIZED_CRL_ENTRY_EXTENSIONS.contains(&ext.extn_id)
                })
        });

    match unrecognized {
        Some(ext) => Err(CrlError::UnrecognizedCriticalExtension {
            oid: ext.extn_id.to_string(),
        }),
        None => Ok(()),
    }
}

fn validate_crl_validity(crl: &CertificateList, at: OffsetDateTime) -> Result<(), CrlError> {
    let this_update = OffsetDateTime::from(crl.tbs_cert_list.this_update.to_system_time());
    if at < this_update {
        return Err(CrlError::NotYetValid {
            this_update: this_update.to_string(),
        });
    }

    if let Some(next_update) = &crl.tbs_cert_list.next_update {
        let next_update = OffsetDateTime::from(next_update.to_system_time());
        if at > next_update {
            return Err(CrlError::Expired {
                next_update: next_update.to_string(),
            });
        }
    }

    Ok(())
}

/// Look up the serial number of `cert` in the CRL.
pub fn check_revocation(cert: &Certificate, crl: &CertificateList) -> RevocationStatus {
    let serial = &cert.tbs_certificate.serial_number;

    let listed = crl
        .tbs_cert_list
        .revoked_certificates
        .iter()
        .flatten()
        .any(|revoked| &revoked.serial_number == serial);

    if listed {
        RevocationStatus::Revoked {
            serial: hex::encode_upper(serial.as_bytes()),
        }
    } else {
        RevocationStatus::Valid
    }
}

/// Check `certificates` against the CRLs published by `crl_issuer`.
///
/// The distribution points of `crl_issuer` are tried in order and the first CRL that downloads
/// and validates decides. The first listed certificate is reported.
pub async fn check_certificates_revocation(
    revocation_fetcher: &impl RevocationFetcher,
    certificates: &[&Certificate],
    crl_issuer: &Certificate,
    at: OffsetDateTime,
    timeout: Option<Duration>,
) -> Result<RevocationStatus, CrlError> {
    let urls = extract_crl_urls(crl_issuer)?;
    let mut errors = Vec::new();

    for url in &urls {
        match fetch_and_validate_crl(revocation_fetcher, crl_issuer, url, at, timeout).await {
            Ok(crl) => {
                return Ok(certificates
                    .iter()
                    .map(|cert| check_revocation(cert, &crl))
                    .find(|status| matches!(status, RevocationStatus::Revoked { .. }))
                    .unwrap_or(RevocationStatus::Valid));
            }
            Err(e) => {
                warn!("CRL check failed for URL {url}: {e}");
                errors.push(format!("{url}: {e}"));
            }
        }
    }

    Err(CrlError::AllUrlsFailed { errors })
}

async fn fetch_and_validate_crl(
    revocation_fetcher: &impl RevocationFetcher,
    crl_signing_cert: &Certificate,
    url: &str,
    at: OffsetDateTime,
    timeout: Option<Duration>,
) -> Result<CertificateList, CrlError> {
    let crl = revocation_fetcher.fetch_crl(url, timeout).await?;
    validate_crl_signature(&crl, crl_signing_cert, at)?;
    Ok(crl)
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::definitions::x509::test::{
        create_crl, create_crl_with_validity, issue_end_entity, self_signed_root,
        CertificateProfile, StaticCrlFetcher,
    };

    const CRL_URL: &str = "http://example.com/root.crl";

    #[test]
    fn crl_urls_of_root_and_bare_reader() {
        let (root, root_key) = self_signed_root(CRL_URL);
        assert_eq!(extract_crl_urls(&root).unwrap(), vec![CRL_URL.to_string()]);

        let (reader, _) = issue_end_entity(&root, &root_key, CertificateProfile::BareReader);
        assert!(matches!(
            extract_crl_urls(&reader),
            Err(CrlError::NoDistributionPoint)
        ));
    }

    #[test]
    fn der_and_pem_crls() {
        let (root, root_key) = self_signed_root(CRL_URL);
        let der = create_crl(&root, &root_key, &[]);
        let pem =
            pem_rfc7468::encode_string(PEM_LABEL, pem_rfc7468::LineEnding::LF, &der).unwrap();

        let from_der = parse_crl(&der).unwrap();
        let from_pem = parse_crl(pem.as_bytes()).unwrap();
        assert_eq!(from_der, from_pem);

        let wrong_label =
            pem_rfc7468::encode_string("CERTIFICATE", pem_rfc7468::LineEnding::LF, &der).unwrap();
        assert!(parse_crl(wrong_label.as_bytes()).is_err());
        assert!(parse_crl(&der[1..]).is_err());
    }

    #[test]
    fn crl_signed_by_another_key() {
        let (root, _) = self_signed_root(CRL_URL);
        let (impostor, impostor_key) = self_signed_root(CRL_URL);
        let crl = parse_crl(&create_crl(&impostor, &impostor_key, &[])).unwrap();

        assert!(validate_crl_signature(&crl, &impostor, OffsetDateTime::now_utc()).is_ok());
        assert!(matches!(
            validate_crl_signature(&crl, &root, OffsetDateTime::now_utc()),
            Err(CrlError::SignatureInvalid)
        ));
    }

    #[test]
    fn stale_crl() {
        let (root, root_key) = self_signed_root(CRL_URL);
        let now = SystemTime::now();
        let day = Duration::from_secs(86400);
        let crl = parse_crl(&create_crl_with_validity(
            &root,
            &root_key,
            &[],
            now - 2 * day,
            now - day,
        ))
        .unwrap();

        assert!(matches!(
            validate_crl_signature(&crl, &root, OffsetDateTime::now_utc()),
            Err(CrlError::Expired { .. })
        ));
        assert!(matches!(
            validate_crl_signature(&crl, &root, OffsetDateTime::now_utc() - 3 * day),
            Err(CrlError::NotYetValid { .. })
        ));
    }

    #[test]
    fn listed_serial_is_revoked() {
        let (root, root_key) = self_signed_root(CRL_URL);
        let (reader, _) = issue_end_entity(&root, &root_key, CertificateProfile::Reader);
        let serial = reader.tbs_certificate.serial_number.clone();
        let crl = parse_crl(&create_crl(&root, &root_key, &[serial.clone()])).unwrap();

        assert_eq!(
            check_revocation(&reader, &crl),
            RevocationStatus::Revoked {
                serial: hex::encode_upper(serial.as_bytes())
            }
        );
        assert_eq!(check_revocation(&root, &crl), RevocationStatus::Valid);
    }

    #[test_log::test(tokio::test)]
    async fn root_crl_covers_end_entity_and_root() {
        let (root, root_key) = self_signed_root(CRL_URL);
        let (reader, _) = issue_end_entity(&root, &root_key, CertificateProfile::Reader);
        let now = OffsetDateTime::now_utc();

        let clean = StaticCrlFetcher::default().with(CRL_URL, create_crl(&root, &root_key, &[]));
        let status = check_certificates_revocation(&clean, &[&reader, &root], &root, now, None)
            .await
            .unwrap();
        assert_eq!(status, RevocationStatus::Valid);

        let root_serial = root.tbs_certificate.serial_number.clone();
        let revoked_root = StaticCrlFetcher::default()
            .with(CRL_URL, create_crl(&root, &root_key, &[root_serial]));
        let status =
            check_certificates_revocation(&revoked_root, &[&reader, &root], &root, now, None)
                .await
                .unwrap();
        assert!(matches!(status, RevocationStatus::Revoked { .. }));
    }

    #[test_log::test(tokio::test)]
    async fn unavailable_crl() {
        let (root, _) = self_signed_root(CRL_URL);
        let result =
            check_certificates_revocation(&(), &[&root], &root, OffsetDateTime::now_utc(), None)
                .await;
        match result {
            Err(CrlError::AllUrlsFailed { errors }) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].starts_with(CRL_URL));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
