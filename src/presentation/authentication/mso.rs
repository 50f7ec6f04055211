//! Issuer authentication: the MSO signature, its digests over the disclosed elements and its
//! validity period.
use crate::cose::sign1::CoseSigner;
use crate::cose::{self, sign1, MaybeTagged, VerificationResult};
use crate::definitions::helpers::{tag24, Tag24};
use crate::definitions::issuer_signed::{IssuerAuth, IssuerNamespaces, IssuerSigned, IssuerSignedItemBytes};
use crate::definitions::mso::{DigestAlgorithm, Mso};
use crate::definitions::x509::revocation::RevocationFetcher;
use crate::definitions::x509::{
    certificate_info, is_mdoc_x5c_valid, CertificateUsage, CertificateWithDer, ValidationOptions,
    X5Chain,
};
use std::collections::BTreeMap;
use std::fmt;

/// Element identifiers per namespace.
pub type ElementIdentifiers = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MsoValidationError {
    #[error("document type is '{actual}', expected '{expected}'")]
    DocTypeMismatch { expected: String, actual: String },
    #[error("unsupported digest algorithm '{0}'")]
    UnsupportedDigestAlgorithm(String),
    #[error("no digest values for {}", Identifiers(.0))]
    MissingDigestValues(ElementIdentifiers),
    #[error("digest values do not match for {}", Identifiers(.0))]
    InvalidDigestValues(ElementIdentifiers),
    #[error("issuer signature verification failed: {0}")]
    SignatureVerificationFailed(String),
    #[error("{0}")]
    ValidityWindowViolation(String),
    #[error("issuer certificate chain is not trusted: {}", .0.join("; "))]
    IssuerTrustFailed(Vec<String>),
    #[error("invalid mobile security object: {0}")]
    InvalidMso(String),
    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    MultipleErrors(Vec<MsoValidationError>),
}

struct Identifiers<'a>(&'a ElementIdentifiers);

impl fmt::Display for Identifiers<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (namespace, identifiers) in self.0 {
            for identifier in identifiers {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{namespace}/{identifier}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Digests the tag 24 encoding of an issuer signed item, as received.
pub fn digest(alg: DigestAlgorithm, item: &IssuerSignedItemBytes) -> Result<Vec<u8>, tag24::Error> {
    Ok(alg.digest(&item.to_tagged_bytes()?))
}

/// Disclosed elements without a digest in the MSO, and those whose digest differs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestReport {
    pub missing: ElementIdentifiers,
    pub invalid: ElementIdentifiers,
}

impl DigestReport {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    fn errors(self) -> Vec<MsoValidationError> {
        let mut errors = vec![];
        if !self.missing.is_empty() {
            errors.push(MsoValidationError::MissingDigestValues(self.missing));
        }
        if !self.invalid.is_empty() {
            errors.push(MsoValidationError::InvalidDigestValues(self.invalid));
        }
        errors
    }
}

/// Checks every disclosed item against the digest the MSO lists for its digest ID.
pub fn validate_digests(namespaces: &IssuerNamespaces, mso: &Mso) -> Result<DigestReport, MsoValidationError> {
    let alg = mso
        .digest_algorithm()
        .map_err(MsoValidationError::UnsupportedDigestAlgorithm)?;

    let mut report = DigestReport::default();
    for (namespace, items) in namespaces {
        let digests = mso.value_digests.get(namespace);
        for item in items {
            let signed_item = item.as_ref();
            let identifier = signed_item.element_identifier.clone();
            let Some(expected) = digests.and_then(|d| d.get(&signed_item.digest_id)) else {
                tracing::warn!("no digest for {namespace}/{identifier}");
                report.missing.entry(namespace.clone()).or_default().push(identifier);
                continue;
            };
            let matches = digest(alg, item)
                .map(|actual| actual == expected.as_ref())
                .unwrap_or(false);
            if !matches {
                tracing::warn!("digest mismatch for {namespace}/{identifier}");
                report.invalid.entry(namespace.clone()).or_default().push(identifier);
            }
        }
    }
    Ok(report)
}

/// Runs every issuer authentication rule and reports all failures together.
///
/// The rules are, in order: document type, digest algorithm, digests of the disclosed elements,
/// validity period, issuer signature by an end-entity certificate, and trust in the issuer chain.
pub async fn validate_mso(
    issuer_signed: &IssuerSigned,
    expected_doc_type: &str,
    roots: &[CertificateWithDer],
    revocation_fetcher: &impl RevocationFetcher,
    options: &ValidationOptions,
) -> Result<Mso, MsoValidationError> {
    let issuer_auth = &issuer_signed.issuer_auth;
    let payload = issuer_auth
        .payload
        .as_deref()
        .ok_or_else(|| MsoValidationError::InvalidMso("issuer auth carries no payload".into()))?;
    let mso = Mso::from_payload(payload).map_err(|e| MsoValidationError::InvalidMso(e.to_string()))?;
    let now = options.validation_time();

    let mut errors = vec![];

    if mso.doc_type != expected_doc_type {
        errors.push(MsoValidationError::DocTypeMismatch {
            expected: expected_doc_type.to_string(),
            actual: mso.doc_type.clone(),
        });
    }

    let empty = IssuerNamespaces::new();
    match validate_digests(issuer_signed.namespaces.as_ref().unwrap_or(&empty), &mso) {
        Ok(report) => errors.extend(report.errors()),
        Err(e) => errors.push(e),
    }

    if !mso.validity_info.contains(now) {
        errors.push(MsoValidationError::ValidityWindowViolation(format!(
            "validation time {now} is outside of the MSO validity {} to {}",
            mso.validity_info.valid_from, mso.validity_info.valid_until
        )));
    }

    match issuer_chain(issuer_auth) {
        Err(e) => errors.push(MsoValidationError::SignatureVerificationFailed(e)),
        Ok(chain) => {
            let signer = chain.end_entity_certificate();
            if !certificate_info(signer).is_valid_at(mso.validity_info.signed) {
                errors.push(MsoValidationError::ValidityWindowViolation(format!(
                    "MSO signed at {} outside of the document signer certificate validity",
                    mso.validity_info.signed
                )));
            }

            if let Err(reason) = verify_issuer_signature(issuer_auth, payload, signer) {
                errors.push(MsoValidationError::SignatureVerificationFailed(reason));
            }

            let decision = is_mdoc_x5c_valid(
                &chain,
                CertificateUsage::MdocAuth,
                roots,
                revocation_fetcher,
                options,
            )
            .await;
            if !decision.is_valid {
                errors.push(MsoValidationError::IssuerTrustFailed(decision.validation_messages));
            }
        }
    }

    match errors.len() {
        0 => Ok(mso),
        1 => Err(errors.remove(0)),
        _ => Err(MsoValidationError::MultipleErrors(errors)),
    }
}

fn issuer_chain(issuer_auth: &IssuerAuth) -> Result<X5Chain, String> {
    let x5chain = sign1::x5chain(issuer_auth).ok_or("issuer auth carries no x5chain")?;
    X5Chain::from_cbor(x5chain.clone()).map_err(|e| format!("invalid x5chain: {e}"))
}

fn verify_issuer_signature(
    issuer_auth: &IssuerAuth,
    payload: &[u8],
    signer: &CertificateWithDer,
) -> Result<(), String> {
    if signer.is_self_issued() {
        return Err("the first x5chain certificate is not an end-entity certificate".into());
    }
    let public_key = signer
        .public_key()
        .map_err(|e| format!("document signer key: {e}"))?;
    match sign1::verify_detached(issuer_auth, payload, &public_key) {
        VerificationResult::Success => Ok(()),
        other => other.into_result(),
    }
}

/// Signs `mso` as an issuer would, embedding `MobileSecurityObjectBytes` as the payload.
pub fn make_issuer_auth<S>(mso: &Mso, signer: &S, chain: &X5Chain) -> Result<IssuerAuth, cose::Error>
where
    S: CoseSigner + ?Sized,
{
    let payload = Tag24::new(mso.clone())
        .and_then(|mso| mso.to_tagged_bytes())
        .map_err(|e| cose::Error::Signing(e.to_string()))?;
    let mut cose_sign1 = sign1::make_detached(&payload, signer, Some(chain))?;
    cose_sign1.payload = Some(payload);
    Ok(MaybeTagged::new(false, cose_sign1))
}
