//! A small PKI for the integration tests: one authority per trust list, issuing reader and
//! document signer certificates with the extensions ISO 18013-5 Annex B asks for.
use std::time::{Duration, SystemTime};

use anyhow::Result;
use const_oid::{db::rfc5912::ECDSA_WITH_SHA_256, ObjectIdentifier};
use der::{asn1::OctetString, Encode};
use mdoc_security::definitions::x509::{CertificateWithDer, X5Chain};
use p256::ecdsa::{Signature, SigningKey};
use rand::random;
use sha1::{Digest, Sha1};
use signature::Signer;
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    crl::{CertificateList, RevokedCert, TbsCertList},
    ext::pkix::{
        crl::dp::DistributionPoint,
        name::{DistributionPointName, GeneralName},
        AccessDescription, AuthorityInfoAccessSyntax, AuthorityKeyIdentifier, BasicConstraints,
        CrlDistributionPoints, ExtendedKeyUsage, IssuerAltName, KeyUsage, KeyUsages,
        SubjectKeyIdentifier,
    },
    spki::{AlgorithmIdentifierOwned, SignatureBitStringEncoding, SubjectPublicKeyInfoOwned},
    time::{Time, Validity},
    Certificate, Version,
};

#[allow(dead_code)]
pub const DOC_TYPE: &str = "org.iso.18013.5.1.mDL";
#[allow(dead_code)]
pub const NAMESPACE: &str = "org.iso.18013.5.1";

const ISSUER_EMAIL: &str = "iaca@example.com";
const MDOC_READER_EKU: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.0.18013.5.1.6");
const DOCUMENT_SIGNER_EKU: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.0.18013.5.1.2");
const OCSP: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Usage {
    DocumentSigner,
    Reader,
}

/// A self-signed root publishing its CRL at `crl_url`.
pub struct Authority {
    pub certificate: Certificate,
    key: SigningKey,
    crl_url: String,
}

fn key_identifier(spki: &SubjectPublicKeyInfoOwned) -> Result<OctetString> {
    Ok(OctetString::new(
        Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec(),
    )?)
}

fn crl_distribution_points(crl_url: &str) -> Result<CrlDistributionPoints> {
    Ok(CrlDistributionPoints(vec![DistributionPoint {
        distribution_point: Some(DistributionPointName::FullName(vec![
            GeneralName::UniformResourceIdentifier(crl_url.to_string().try_into()?),
        ])),
        reasons: None,
        crl_issuer: None,
    }]))
}

fn issuer_alt_name() -> Result<IssuerAltName> {
    Ok(IssuerAltName(vec![GeneralName::Rfc822Name(
        ISSUER_EMAIL.to_string().try_into()?,
    )]))
}

fn sign(mut builder: CertificateBuilder<'_, SigningKey>, key: &SigningKey) -> Result<Certificate> {
    let signature: Signature = key.try_sign(&builder.finalize()?)?;
    Ok(builder.assemble(signature.to_der().to_bitstring()?)?)
}

#[allow(dead_code)]
impl Authority {
    pub fn new(name: &str, crl_url: &str) -> Result<Self> {
        let key = SigningKey::random(&mut rand::thread_rng());
        let spki = SubjectPublicKeyInfoOwned::from_key(*key.verifying_key())?;
        let ski = key_identifier(&spki)?;

        let mut builder = CertificateBuilder::new(
            Profile::Manual { issuer: None },
            random::<u64>().into(),
            Validity::from_now(Duration::from_secs(3600))?,
            format!("CN={name},C=US").parse()?,
            spki,
            &key,
        )?;
        builder.add_extension(&SubjectKeyIdentifier(ski))?;
        builder.add_extension(&KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign))?;
        builder.add_extension(&BasicConstraints {
            ca: true,
            path_len_constraint: Some(0),
        })?;
        builder.add_extension(&issuer_alt_name()?)?;
        builder.add_extension(&crl_distribution_points(crl_url)?)?;
        let certificate = sign(builder, &key)?;

        Ok(Self {
            certificate,
            key,
            crl_url: crl_url.to_string(),
        })
    }

    pub fn trust_anchor(&self) -> Result<CertificateWithDer> {
        CertificateWithDer::from_cert(self.certificate.clone())
    }

    pub fn issue(&self, usage: Usage) -> Result<(Certificate, SigningKey)> {
        let key = SigningKey::random(&mut rand::thread_rng());
        let spki = SubjectPublicKeyInfoOwned::from_key(*key.verifying_key())?;
        let ski = key_identifier(&spki)?;
        let aki = key_identifier(&self.certificate.tbs_certificate.subject_public_key_info)?;
        let subject = match usage {
            Usage::DocumentSigner => "CN=document signer,C=US",
            Usage::Reader => "CN=reader,C=US",
        };

        let mut builder = CertificateBuilder::new(
            Profile::Manual {
                issuer: Some(self.certificate.tbs_certificate.subject.clone()),
            },
            random::<u64>().into(),
            Validity::from_now(Duration::from_secs(600))?,
            subject.parse()?,
            spki,
            &self.key,
        )?;
        builder.add_extension(&SubjectKeyIdentifier(ski))?;
        builder.add_extension(&AuthorityKeyIdentifier {
            key_identifier: Some(aki),
            ..Default::default()
        })?;
        builder.add_extension(&KeyUsage(KeyUsages::DigitalSignature.into()))?;
        builder.add_extension(&issuer_alt_name()?)?;
        builder.add_extension(&crl_distribution_points(&self.crl_url)?)?;
        match usage {
            Usage::DocumentSigner => {
                builder.add_extension(&ExtendedKeyUsage(vec![DOCUMENT_SIGNER_EKU]))?;
            }
            Usage::Reader => {
                builder.add_extension(&ExtendedKeyUsage(vec![MDOC_READER_EKU]))?;
                builder.add_extension(&AuthorityInfoAccessSyntax(vec![AccessDescription {
                    access_method: OCSP,
                    access_location: GeneralName::UniformResourceIdentifier(
                        "http://example.com/ocsp".to_string().try_into()?,
                    ),
                }]))?;
            }
        }

        Ok((sign(builder, &self.key)?, key))
    }

    /// A DER encoded CRL listing `revoked`, valid for a day.
    pub fn crl(&self, revoked: &[&Certificate]) -> Result<Vec<u8>> {
        let now = SystemTime::now();
        let this_update = Time::try_from(now - Duration::from_secs(60))?;
        let algorithm = AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA_256,
            parameters: None,
        };
        let revoked_certificates: Vec<RevokedCert> = revoked
            .iter()
            .map(|certificate| RevokedCert {
                serial_number: certificate.tbs_certificate.serial_number.clone(),
                revocation_date: this_update,
                crl_entry_extensions: None,
            })
            .collect();

        let tbs_cert_list = TbsCertList {
            version: Version::V2,
            signature: algorithm.clone(),
            issuer: self.certificate.tbs_certificate.subject.clone(),
            this_update,
            next_update: Some(Time::try_from(now + Duration::from_secs(86400))?),
            revoked_certificates: (!revoked_certificates.is_empty())
                .then_some(revoked_certificates),
            crl_extensions: None,
        };
        let signature: Signature = self.key.try_sign(&tbs_cert_list.to_der()?)?;

        Ok(CertificateList {
            tbs_cert_list,
            signature_algorithm: algorithm,
            signature: signature.to_der().to_bitstring()?,
        }
        .to_der()?)
    }
}

/// The chain carried in a COSE header: the end-entity certificate alone.
#[allow(dead_code)]
pub fn x5chain(certificate: &Certificate) -> Result<X5Chain> {
    X5Chain::builder()
        .with_certificate(certificate.clone())?
        .build()
}
