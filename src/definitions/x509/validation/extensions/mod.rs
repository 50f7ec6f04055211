//! Extension profile checks for mdoc reader authentication and document signer certificates.
//!
//! Findings are returned as messages; whether they reject a chain is decided by the caller.

mod authority_info_access;
mod authority_key_identifier;
mod crl_distribution_points;
mod extended_key_usage;
pub(crate) mod issuer_alternative_name;
mod key_usage;
mod subject_key_identifier;

use std::collections::BTreeSet;
use std::ops::Deref;

use authority_info_access::AuthorityInfoAccessValidator;
use authority_key_identifier::AuthorityKeyIdentifierValidator;
use const_oid::db;
use const_oid::AssociatedOid;
use const_oid::ObjectIdentifier;
use crl_distribution_points::CrlDistributionPointsValidator;
use extended_key_usage::{
    document_signer_extended_key_usage_oid, mdoc_reader_extended_key_usage_oid,
    ExtendedKeyUsageValidator,
};
use issuer_alternative_name::IssuerAlternativeNameValidator;
use key_usage::KeyUsageValidator;
use subject_key_identifier::SubjectKeyIdentifierValidator;
use x509_cert::ext::{
    pkix::{FreshestCrl, InhibitAnyPolicy, NameConstraints, PolicyConstraints, PolicyMappings},
    Extension,
};
use x509_cert::Certificate;

use super::signature::ECDSA_SIGNATURE_ALGORITHMS;

type Error = String;

/// Validate mdoc reader authentication certificate extensions according to 18013-5 Annex B.
pub fn validate_mdoc_reader_certificate_extensions(certificate: &Certificate) -> Vec<Error> {
    tracing::debug!("validating mdoc reader certificate extensions...");

    let extensions = certificate.tbs_certificate.extensions.iter().flatten();

    let mut errors: Vec<Error> = check_for_disallowed_x509_extensions(extensions.clone());

    errors.extend(
        ExtensionValidators::default()
            .with(SubjectKeyIdentifierValidator::from_certificate(certificate))
            .with(AuthorityKeyIdentifierValidator)
            .with(KeyUsageValidator::digital_signature())
            .with(ExtendedKeyUsageValidator {
                expected_oid: mdoc_reader_extended_key_usage_oid(),
            })
            .with(CrlDistributionPointsValidator)
            .with(AuthorityInfoAccessValidator)
            .with(IssuerAlternativeNameValidator)
            .validate_extensions(extensions),
    );

    errors.extend(check_signature_algorithm(certificate));

    errors
}

/// Validate document signer certificate extensions according to 18013-5 Annex B.
pub fn validate_document_signer_certificate_extensions(certificate: &Certificate) -> Vec<Error> {
    tracing::debug!("validating document signer certificate extensions...");

    let extensions = certificate.tbs_certificate.extensions.iter().flatten();

    let mut errors: Vec<Error> = check_for_disallowed_x509_extensions(extensions.clone());

    errors.extend(
        ExtensionValidators::default()
            .with(SubjectKeyIdentifierValidator::from_certificate(certificate))
            .with(KeyUsageValidator::digital_signature())
            .with(ExtendedKeyUsageValidator {
                expected_oid: document_signer_extended_key_usage_oid(),
            })
            .with(CrlDistributionPointsValidator)
            .with(IssuerAlternativeNameValidator)
            .validate_extensions(extensions),
    );

    errors.extend(check_signature_algorithm(certificate));

    errors
}

/// Extension OIDs that occur more than once in the certificate.
pub fn duplicate_extensions(certificate: &Certificate) -> Vec<ObjectIdentifier> {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for ext in certificate.tbs_certificate.extensions.iter().flatten() {
        if !seen.insert(ext.extn_id) {
            duplicates.insert(ext.extn_id);
        }
    }
    duplicates.into_iter().collect()
}

fn check_signature_algorithm(certificate: &Certificate) -> Option<Error> {
    let oid = certificate.signature_algorithm.oid;
    if ECDSA_SIGNATURE_ALGORITHMS.contains(&oid) {
        None
    } else {
        Some(format!(
            "signature algorithm must be ECDSA with SHA-256, SHA-384 or SHA-512, found {}",
            oid_name(&oid)
        ))
    }
}

#[derive(Default)]
struct ExtensionValidators(Vec<Box<dyn ExtensionValidator>>);

struct RequiredExtension {
    found: bool,
    validator: Box<dyn ExtensionValidator>,
}

impl RequiredExtension {
    fn new(validator: Box<dyn ExtensionValidator>) -> Self {
        Self {
            found: false,
            validator,
        }
    }
}

impl Deref for RequiredExtension {
    type Target = Box<dyn ExtensionValidator>;

    fn deref(&self) -> &Self::Target {
        &self.validator
    }
}

trait ExtensionValidator {
    fn oid(&self) -> ObjectIdentifier;
    fn ext_name(&self) -> &'static str;
    fn validate(&self, extension: &Extension) -> Vec<Error>;
}

impl ExtensionValidators {
    fn with<V: ExtensionValidator + 'static>(mut self, validator: V) -> Self {
        self.0.push(Box::new(validator));
        self
    }

    fn validate_extensions<'a, Extensions>(self, extensions: Extensions) -> Vec<Error>
    where
        Extensions: IntoIterator<Item = &'a Extension>,
    {
        let mut validation_errors = vec![];

        let mut validators: Vec<RequiredExtension> =
            self.0.into_iter().map(RequiredExtension::new).collect();

        for ext in extensions {
            if let Some(validator) = validators
                .iter_mut()
                .find(|validator| validator.oid() == ext.extn_id)
            {
                tracing::debug!("validating required extension: {}", ext.extn_id);
                validation_errors.extend(
                    validator
                        .validate(ext)
                        .into_iter()
                        .map(|e| format!("{}: {e}", validator.ext_name())),
                );
                validator.found = true;
            } else if ext.critical {
                tracing::debug!(
                    "critical, non-required extension causing an error: {}",
                    ext.extn_id
                );
                validation_errors.push(format!(
                    "contains unknown critical extension: {}",
                    ext.extn_id
                ));
            } else {
                tracing::debug!("non-critical, non-required extension ignored: {}", ext.extn_id)
            }
        }

        validation_errors.extend(
            validators
                .iter()
                .filter(|v| !v.found)
                .map(|v| format!("{}: required extension not found", v.ext_name())),
        );

        validation_errors
    }
}

fn oid_name(oid: &ObjectIdentifier) -> String {
    db::DB
        .by_oid(oid)
        .map(|s| s.to_string())
        .unwrap_or(oid.to_string())
}

/// As identified in 18013-5 Annex B, section B.1.1.
fn check_for_disallowed_x509_extensions<'a, E>(extensions: E) -> Vec<Error>
where
    E: Iterator<Item = &'a Extension> + Clone,
{
    let disallowed_extensions = [
        PolicyMappings::OID,
        NameConstraints::OID,
        PolicyConstraints::OID,
        InhibitAnyPolicy::OID,
        FreshestCrl::OID,
    ];

    extensions
        .map(|e| e.extn_id)
        .filter(|id| disallowed_extensions.contains(id))
        .map(|id| format!("extension is not allowed: {}", oid_name(&id)))
        .collect()
}
