use crate::cbor::Value;
use crate::definitions::helpers::NonEmptyVec;
use crate::key_agreement::EcPublicKey;

use anyhow::{anyhow, bail, Context, Error, Result};
use x509_cert::der::{Decode, Encode};
use x509_cert::certificate::Certificate;

use super::util::{common_name_or_unknown, public_key};

/// See: <https://www.iana.org/assignments/cose/cose.xhtml#header-parameters>
pub const X5CHAIN_COSE_HEADER_LABEL: i64 = 0x21;

/// X.509 certificate with the DER representation held in memory for ease of serialization.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CertificateWithDer {
    pub inner: Certificate,
    der: Vec<u8>,
}

impl CertificateWithDer {
    pub fn from_pem(bytes: &[u8]) -> Result<Self> {
        let bytes = pem_rfc7468::decode_vec(bytes)
            .map_err(|e| anyhow!("unable to parse certificate from PEM encoding: {e}"))?
            .1;
        CertificateWithDer::from_der(&bytes)
    }

    pub fn from_der(bytes: &[u8]) -> Result<Self> {
        let inner = Certificate::from_der(bytes)
            .context("unable to parse certificate from DER encoding")?;
        Ok(Self {
            inner,
            der: bytes.to_vec(),
        })
    }

    pub fn from_cert(certificate: Certificate) -> Result<Self> {
        let der = certificate.to_der()?;
        Ok(Self {
            inner: certificate,
            der,
        })
    }

    /// The bytes the certificate was parsed from.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn public_key(&self) -> Result<EcPublicKey> {
        public_key(&self.inner)
    }

    pub fn common_name(&self) -> &str {
        common_name_or_unknown(&self.inner)
    }

    /// A certificate whose issuer is its own subject.
    pub fn is_self_issued(&self) -> bool {
        self.inner.tbs_certificate.issuer == self.inner.tbs_certificate.subject
    }
}

/// An ordered certificate chain, end-entity first.
#[derive(Debug, Clone)]
pub struct X5Chain(NonEmptyVec<CertificateWithDer>);

impl X5Chain {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// A single certificate is carried as a byte string, more than one as an array.
    pub fn into_cbor(&self) -> Value {
        match self.0.as_ref() {
            [cert] => Value::Bytes(cert.der.clone()),
            certs => Value::Array(
                certs
                    .iter()
                    .map(|x509| Value::Bytes(x509.der.clone()))
                    .collect(),
            ),
        }
    }

    pub fn from_cbor(cbor: Value) -> Result<Self, Error> {
        match cbor {
            Value::Bytes(bytes) => Self::builder().with_der_certificate(&bytes)?.build(),
            Value::Array(x509s) => x509s
                .iter()
                .try_fold(Self::builder(), |builder, x509| match x509 {
                    Value::Bytes(bytes) => builder.with_der_certificate(bytes),
                    _ => bail!(
                        "expected x509 certificate in the x5chain to be a cbor encoded bytestring, but received: {x509:?}"
                    ),
                })?
                .build(),
            _ => bail!(
                "expected x5chain to be a cbor encoded bytestring or array, but received: {cbor:?}"
            ),
        }
    }

    /// Retrieve the end-entity certificate.
    pub fn end_entity_certificate(&self) -> &CertificateWithDer {
        &self.0[0]
    }

    /// Retrieve the public key of the end-entity certificate.
    pub fn end_entity_public_key(&self) -> Result<EcPublicKey> {
        self.end_entity_certificate().public_key()
    }

    pub fn end_entity_common_name(&self) -> &str {
        self.end_entity_certificate().common_name()
    }

    /// Retrieve the last certificate of the chain.
    pub fn root_entity_certificate(&self) -> &CertificateWithDer {
        &self.0[self.0.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate over the certificates in the chain.
    pub fn iter(&self) -> impl Iterator<Item = &CertificateWithDer> {
        self.0.iter()
    }
}

#[derive(Default, Debug, Clone)]
pub struct Builder {
    certs: Vec<CertificateWithDer>,
}

impl Builder {
    pub fn with_certificate(mut self, cert: Certificate) -> Result<Builder> {
        let x509 = CertificateWithDer::from_cert(cert)?;
        self.certs.push(x509);
        Ok(self)
    }

    pub fn with_pem_certificate(mut self, data: &[u8]) -> Result<Builder> {
        let x509 = CertificateWithDer::from_pem(data)?;
        self.certs.push(x509);
        Ok(self)
    }

    pub fn with_der_certificate(mut self, data: &[u8]) -> Result<Builder> {
        let x509 = CertificateWithDer::from_der(data)?;
        self.certs.push(x509);
        Ok(self)
    }

    pub fn build(self) -> Result<X5Chain> {
        Ok(X5Chain(self.certs.try_into().context(
            "at least one certificate must be given to the builder",
        )?))
    }
}
