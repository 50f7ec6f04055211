//! Reader authentication: the reader signs its items request with a certificate the holder can
//! validate against its own list of trusted reader roots.
use crate::cbor::{self, CborError, Value};
use crate::cose::sign1::CoseSigner;
use crate::cose::{self, sign1, MaybeTagged};
use crate::definitions::helpers::tag24;
use crate::definitions::reader_auth::{ItemsRequestBytes, ReaderAuth, ReaderAuthentication};
use crate::definitions::session::SessionTranscript;
use crate::definitions::x509::revocation::RevocationFetcher;
use crate::definitions::x509::{
    is_mdoc_x5c_valid, CertificateUsage, CertificateWithDer, TrustDecision, ValidationOptions,
    X5Chain,
};
use coset::CoseSign1;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to encode ReaderAuthentication: {0}")]
    Encoding(#[from] CborError),
    #[error(transparent)]
    ItemsRequest(#[from] tag24::Error),
    #[error(transparent)]
    Cose(#[from] cose::Error),
}

/// Outcome of [MdocReaderAuthentication::validate_reader_auth].
///
/// The signature and the certificate chain are always both checked.
#[derive(Debug, Clone)]
pub struct ReaderAuthOutcome {
    pub signature_valid: bool,
    pub trust: TrustDecision,
    /// A signature failure comes first, followed by the chain validation messages.
    pub messages: Vec<String>,
}

impl ReaderAuthOutcome {
    pub fn is_valid(&self) -> bool {
        self.signature_valid && self.trust.is_valid
    }
}

#[derive(Debug, Clone)]
pub struct MdocReaderAuthentication {
    pub transcript: SessionTranscript,
}

impl MdocReaderAuthentication {
    pub fn new(transcript: SessionTranscript) -> Self {
        Self { transcript }
    }

    fn reader_authentication_bytes(&self, items_request_bytes: &[u8]) -> Result<Vec<u8>, Error> {
        let items_request = ItemsRequestBytes::from_bytes(items_request_bytes.to_vec())?;
        Ok(ReaderAuthentication::new(self.transcript.clone(), items_request).to_tagged_bytes()?)
    }

    /// The reader side: signs `items_request_bytes` and attaches the reader certificate chain.
    pub fn make_reader_auth<S>(
        &self,
        items_request_bytes: &[u8],
        signer: &S,
        reader_cert_chain: &X5Chain,
    ) -> Result<ReaderAuth, Error>
    where
        S: CoseSigner + ?Sized,
    {
        let payload = self.reader_authentication_bytes(items_request_bytes)?;
        let cose_sign1 = sign1::make_detached(&payload, signer, Some(reader_cert_chain))?;
        Ok(MaybeTagged::new(false, cose_sign1))
    }

    /// The holder side: checks the reader signature over the items request it received and
    /// validates the reader certificate chain against `roots`.
    pub async fn validate_reader_auth(
        &self,
        reader_auth_cbor: &[u8],
        reader_cert_chain: &X5Chain,
        items_request_bytes: &[u8],
        roots: &[CertificateWithDer],
        revocation_fetcher: &impl RevocationFetcher,
        options: &ValidationOptions,
    ) -> ReaderAuthOutcome {
        let signature = self.verify_signature(reader_auth_cbor, reader_cert_chain, items_request_bytes);
        let trust = is_mdoc_x5c_valid(
            reader_cert_chain,
            CertificateUsage::MdocReaderAuth,
            roots,
            revocation_fetcher,
            options,
        )
        .await;

        let mut messages = vec![];
        if let Err(reason) = &signature {
            tracing::warn!("reader authentication signature rejected: {reason}");
            messages.push(format!("reader signature is not valid: {reason}"));
        }
        messages.extend(trust.validation_messages.iter().cloned());

        ReaderAuthOutcome {
            signature_valid: signature.is_ok(),
            trust,
            messages,
        }
    }

    fn verify_signature(
        &self,
        reader_auth_cbor: &[u8],
        reader_cert_chain: &X5Chain,
        items_request_bytes: &[u8],
    ) -> Result<(), String> {
        let payload = self
            .reader_authentication_bytes(items_request_bytes)
            .map_err(|e| e.to_string())?;
        let public_key = reader_cert_chain
            .end_entity_public_key()
            .map_err(|e| format!("reader certificate key: {e}"))?;
        sign1::verify_detached_cbor(reader_auth_cbor, &payload, &public_key).into_result()
    }
}

/// The certificate chain in the unprotected header of a reader authentication structure.
pub fn reader_certificate_chain(reader_auth: &CoseSign1) -> anyhow::Result<X5Chain> {
    let chain = sign1::x5chain(reader_auth)
        .ok_or_else(|| anyhow::anyhow!("reader authentication carries no x5chain"))?;
    X5Chain::from_cbor(chain.clone())
}

/// Encodes a [ReaderAuth] as carried in a `DocRequest`.
pub fn encode_reader_auth(reader_auth: &ReaderAuth) -> Result<Vec<u8>, Error> {
    let value: Value = reader_auth.to_cbor_value()?;
    Ok(cbor::to_vec(&value)?)
}
