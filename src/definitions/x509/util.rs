use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use const_oid::db::{
    self,
    rfc4519::{COMMON_NAME, COUNTRY_NAME},
    rfc5912::{ID_EC_PUBLIC_KEY, SECP_256_R_1, SECP_384_R_1, SECP_521_R_1},
};
use const_oid::ObjectIdentifier;
use sha1::{Digest, Sha1};
use time::OffsetDateTime;
use der::{
    asn1::{Ia5StringRef, PrintableStringRef, TeletexStringRef, Utf8StringRef},
    Tag, Tagged,
};
use x509_cert::{attr::AttributeValue, name::Name, Certificate};

use crate::definitions::device_key::EC2Curve;
use crate::key_agreement::EcPublicKey;

use super::x5chain::CertificateWithDer;

/// The curve named by an `id-ecPublicKey` subject public key info.
pub fn public_key_curve(certificate: &Certificate) -> Result<EC2Curve> {
    let spki = &certificate.tbs_certificate.subject_public_key_info;
    if spki.algorithm.oid != ID_EC_PUBLIC_KEY {
        bail!("public key algorithm {} is not id-ecPublicKey", spki.algorithm.oid)
    }
    let curve: ObjectIdentifier = spki
        .algorithm
        .parameters
        .as_ref()
        .context("public key has no curve parameters")?
        .decode_as()
        .context("public key curve parameters are not a named curve")?;
    match curve {
        SECP_256_R_1 => Ok(EC2Curve::P256),
        SECP_384_R_1 => Ok(EC2Curve::P384),
        SECP_521_R_1 => Ok(EC2Curve::P521),
        other => Err(anyhow!("unsupported curve: {other}")),
    }
}

/// The EC public key of a certificate, on whichever supported curve it declares.
pub fn public_key(certificate: &Certificate) -> Result<EcPublicKey> {
    let curve = public_key_curve(certificate)?;
    let point = certificate
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes();
    EcPublicKey::from_sec1_bytes(curve, point).context("could not parse public key from certificate")
}

fn first_rdn<'a>(name: &'a Name, oid: ObjectIdentifier) -> Option<&'a str> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .filter(|attribute| attribute.oid == oid)
        .find_map(|attribute| attribute_value_to_str(&attribute.value))
}

pub fn common_name_or_unknown(certificate: &Certificate) -> &str {
    first_rdn(&certificate.tbs_certificate.subject, COMMON_NAME).unwrap_or("Unknown")
}

pub fn attribute_value_to_str(av: &AttributeValue) -> Option<&str> {
    match av.tag() {
        Tag::PrintableString => PrintableStringRef::try_from(av).ok().map(|s| s.as_str()),
        Tag::Utf8String => Utf8StringRef::try_from(av).ok().map(|s| s.as_str()),
        Tag::Ia5String => Ia5StringRef::try_from(av).ok().map(|s| s.as_str()),
        Tag::TeletexString => TeletexStringRef::try_from(av).ok().map(|s| s.as_str()),
        _ => None,
    }
}

fn oid_name(oid: &ObjectIdentifier) -> String {
    db::DB
        .by_oid(oid)
        .map(|s| s.to_string())
        .unwrap_or_else(|| oid.to_string())
}

fn colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Summary of a certificate for display to a holder or verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub common_name: Option<String>,
    pub subject: String,
    pub issuer: String,
    /// Upper case hex of the serial number content octets.
    pub serial_number: String,
    /// Colon separated SHA-1 of the DER encoding.
    pub thumbprint: String,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub issuing_country: Option<String>,
    pub signature_algorithm: String,
    pub public_key_algorithm: String,
}

impl CertificateInfo {
    /// The fields under the data element names used when presenting certificate details.
    pub fn data_elements(&self) -> BTreeMap<&'static str, String> {
        let mut elements = BTreeMap::from([
            ("certificate_serial_number", self.serial_number.clone()),
            ("certificate_public_key_algorithm", self.public_key_algorithm.clone()),
            ("certificate_signature_algorithm", self.signature_algorithm.clone()),
            ("certificate_thumbprint", self.thumbprint.clone()),
            ("certificate_issuer", self.issuer.clone()),
            ("certificate_subject", self.subject.clone()),
            ("certificate_valid_from", self.not_before.to_string()),
            ("certificate_valid_until", self.not_after.to_string()),
        ]);
        if let Some(country) = &self.issuing_country {
            elements.insert("issuing_country", country.clone());
        }
        elements
    }

    pub fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

pub fn certificate_info(certificate: &CertificateWithDer) -> CertificateInfo {
    let tbs = &certificate.inner.tbs_certificate;
    let public_key_algorithm = match public_key_curve(&certificate.inner) {
        Ok(curve) => format!("EC {curve}"),
        Err(_) => oid_name(&tbs.subject_public_key_info.algorithm.oid),
    };
    CertificateInfo {
        common_name: first_rdn(&tbs.subject, COMMON_NAME).map(str::to_string),
        subject: tbs.subject.to_string(),
        issuer: tbs.issuer.to_string(),
        serial_number: hex::encode_upper(tbs.serial_number.as_bytes()),
        thumbprint: colon_hex(&Sha1::digest(certificate.der())),
        not_before: OffsetDateTime::from(tbs.validity.not_before.to_system_time()),
        not_after: OffsetDateTime::from(tbs.validity.not_after.to_system_time()),
        issuing_country: first_rdn(&tbs.subject, COUNTRY_NAME)
            .or_else(|| first_rdn(&tbs.issuer, COUNTRY_NAME))
            .map(str::to_string),
        signature_algorithm: oid_name(&certificate.inner.signature_algorithm.oid),
        public_key_algorithm,
    }
}
