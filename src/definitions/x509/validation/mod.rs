//! Trust validation of the x5chain of an issuer or reader authentication structure.

use std::time::Duration;

use error::{ErrorWithContext, TrustError};
use extensions::{
    duplicate_extensions, issuer_alternative_name::issuer_alt_names,
    validate_document_signer_certificate_extensions, validate_mdoc_reader_certificate_extensions,
};
use serde::Deserialize;
use signature::issuer_signed_subject;
use time::OffsetDateTime;
use validity::check_validity_period_at;
use x509_cert::Certificate;

use super::{
    revocation::{check_certificates_revocation, RevocationFetcher, RevocationStatus},
    util::common_name_or_unknown,
    CertificateWithDer, X5Chain,
};

pub mod error;
mod extensions;
pub(super) mod signature;
mod validity;

/// First message of every untrusted decision.
pub const NOT_MATCHED_WITH_ROOTS: &str = "not matched with root certificates";

/// What the end-entity certificate is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateUsage {
    /// Document signer certificate of an issuer authentication structure.
    MdocAuth,
    /// Reader authentication certificate.
    MdocReaderAuth,
}

/// Options for certificate chain validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ValidationOptions {
    /// The time to validate at. Defaults to the current system time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub validation_time: Option<OffsetDateTime>,
    /// Fetch CRLs from the distribution points of the root certificate.
    pub check_revocation: bool,
    /// Report extension profile findings for the end-entity certificate.
    pub check_extension_policy: bool,
    /// Per-request CRL download timeout, on top of the HTTP client's own timeout.
    pub crl_timeout_secs: Option<u64>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            validation_time: None,
            check_revocation: true,
            check_extension_policy: true,
            crl_timeout_secs: None,
        }
    }
}

impl ValidationOptions {
    /// The configured validation time, or now.
    pub fn validation_time(&self) -> OffsetDateTime {
        self.validation_time.unwrap_or_else(OffsetDateTime::now_utc)
    }

    fn crl_timeout(&self) -> Option<Duration> {
        self.crl_timeout_secs.map(Duration::from_secs)
    }
}

/// Outcome of [`is_mdoc_x5c_valid`].
#[derive(Debug, Clone)]
pub struct TrustDecision {
    pub is_valid: bool,
    /// Findings in the order they were made; a rejected chain starts with
    /// [`NOT_MATCHED_WITH_ROOTS`].
    pub validation_messages: Vec<String>,
    /// The root that anchored the chain.
    pub root_certificate: Option<CertificateWithDer>,
}

impl TrustDecision {
    fn untrusted(mut validation_messages: Vec<String>) -> Self {
        validation_messages.insert(0, NOT_MATCHED_WITH_ROOTS.to_string());
        Self {
            is_valid: false,
            validation_messages,
            root_certificate: None,
        }
    }
}

/// Decide whether `chain` is anchored at one of `roots`.
///
/// Structural and validity-period defects of chain certificates reject the chain. Extension
/// profile findings are reported but do not. Roots are tried in order and the first one that
/// anchors the chain, matches the reader's issuer alternative names and has not revoked the
/// end-entity certificate or itself is recorded in the decision.
pub async fn is_mdoc_x5c_valid(
    chain: &X5Chain,
    usage: CertificateUsage,
    roots: &[CertificateWithDer],
    revocation_fetcher: &impl RevocationFetcher,
    options: &ValidationOptions,
) -> TrustDecision {
    let validation_time = options.validation_time();
    let end_entity = &chain.end_entity_certificate().inner;

    let mut findings: Vec<(TrustError, String)> = vec![];
    for (index, certificate) in chain.iter().enumerate() {
        let context: fn(TrustError) -> String = if index == 0 {
            ErrorWithContext::end_entity
        } else {
            ErrorWithContext::intermediate
        };

        for error in structural_errors(&certificate.inner) {
            let message = context(error.clone());
            findings.push((error, message));
        }
        for error in check_validity_period_at(&certificate.inner, validation_time) {
            let error = TrustError::CertificateExpired(error.to_string());
            let message = context(error.clone());
            findings.push((error, message));
        }
    }

    if options.check_extension_policy {
        let policy_errors = match usage {
            CertificateUsage::MdocAuth => validate_document_signer_certificate_extensions(end_entity),
            CertificateUsage::MdocReaderAuth => {
                validate_mdoc_reader_certificate_extensions(end_entity)
            }
        };
        for error in policy_errors.into_iter().map(TrustError::PolicyViolation) {
            let message = ErrorWithContext::end_entity(error.clone());
            findings.push((error, message));
        }
    }

    let fatal = findings.iter().any(|(error, _)| error.is_fatal());
    let mut messages: Vec<String> = findings.into_iter().map(|(_, message)| message).collect();

    if fatal {
        tracing::debug!("chain rejected before root matching: {messages:?}");
        return TrustDecision::untrusted(messages);
    }

    for root in roots {
        match match_root(chain, usage, root, revocation_fetcher, options, validation_time).await {
            Ok(root_messages) => {
                tracing::debug!(
                    "chain of '{}' anchored at '{}'",
                    common_name_or_unknown(end_entity),
                    root.common_name()
                );
                messages.extend(root_messages);
                return TrustDecision {
                    is_valid: true,
                    validation_messages: messages,
                    root_certificate: Some(root.clone()),
                };
            }
            Err(root_messages) => {
                tracing::debug!("root '{}' rejected: {root_messages:?}", root.common_name());
                messages.extend(root_messages);
            }
        }
    }

    TrustDecision::untrusted(messages)
}

/// Anchor the chain at `root`. Both outcomes carry the messages found along the way.
async fn match_root(
    chain: &X5Chain,
    usage: CertificateUsage,
    root: &CertificateWithDer,
    revocation_fetcher: &impl RevocationFetcher,
    options: &ValidationOptions,
    validation_time: OffsetDateTime,
) -> Result<Vec<String>, Vec<String>> {
    let end_entity = &chain.end_entity_certificate().inner;

    let validity_errors: Vec<String> = check_validity_period_at(&root.inner, validation_time)
        .into_iter()
        .map(|e| ErrorWithContext::root(TrustError::CertificateExpired(e.to_string())))
        .collect();
    if !validity_errors.is_empty() {
        return Err(validity_errors);
    }

    if let Some(error) = path_error(chain, &root.inner) {
        return Err(vec![ErrorWithContext::chain(error)]);
    }

    if usage == CertificateUsage::MdocReaderAuth {
        let mut leaf_names = issuer_alt_names(end_entity);
        let mut root_names = issuer_alt_names(&root.inner);
        leaf_names.sort();
        root_names.sort();
        if leaf_names != root_names {
            return Err(vec![ErrorWithContext::root(TrustError::ChainNotTrusted(
                format!(
                    "issuer alternative names {leaf_names:?} do not match {root_names:?}"
                ),
            ))]);
        }
    }

    if !options.check_revocation {
        return Ok(vec![]);
    }

    match check_certificates_revocation(
        revocation_fetcher,
        &[end_entity, &root.inner],
        &root.inner,
        validation_time,
        options.crl_timeout(),
    )
    .await
    {
        Ok(RevocationStatus::Valid) => Ok(vec![]),
        Ok(RevocationStatus::Revoked { serial }) => Err(vec![ErrorWithContext::revocation(
            TrustError::CertificateRevoked { serial },
        )]),
        Err(e) => {
            tracing::warn!("revocation status unknown: {e}");
            Ok(vec![ErrorWithContext::revocation(e)])
        }
    }
}

/// Every certificate must be issued and signed by the next one, the last by `root`. A chain
/// that already ends with the root itself needs no extra link.
fn path_error(chain: &X5Chain, root: &Certificate) -> Option<TrustError> {
    let certificates: Vec<&Certificate> = chain.iter().map(|c| &c.inner).collect();
    let last = certificates[certificates.len() - 1];
    let links = certificates
        .windows(2)
        .map(|window| (window[0], window[1]))
        .chain((last != root).then_some((last, root)));

    for (subject, issuer) in links {
        if subject.tbs_certificate.issuer != issuer.tbs_certificate.subject {
            return Some(TrustError::ChainNotTrusted(format!(
                "certificate '{}' not issued by '{}'",
                common_name_or_unknown(subject),
                common_name_or_unknown(issuer)
            )));
        }
        if !issuer_signed_subject(subject, issuer) {
            return Some(TrustError::ChainNotTrusted(format!(
                "certificate '{}' not signed by '{}'",
                common_name_or_unknown(subject),
                common_name_or_unknown(issuer)
            )));
        }
    }

    None
}

fn structural_errors(certificate: &Certificate) -> Vec<TrustError> {
    let tbs = &certificate.tbs_certificate;
    let mut errors = vec![];

    if tbs.subject.0.is_empty() {
        errors.push("subject is empty".to_string());
    }
    if certificate.signature.raw_bytes().is_empty() {
        errors.push("signature is empty".to_string());
    }
    if tbs.serial_number.as_bytes().is_empty() {
        errors.push("serial number is missing".to_string());
    }
    for oid in duplicate_extensions(certificate) {
        errors.push(format!("extension {oid} occurs more than once"));
    }

    errors
        .into_iter()
        .map(TrustError::CertificateStructuralError)
        .collect()
}
