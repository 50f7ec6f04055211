//! Device authentication: the mdoc proves possession of the device key named in the MSO.
use crate::cbor;
use crate::cose::{self, mac0, sign1, MaybeTagged, VerificationResult};
use crate::definitions::device_signed::{
    self, device_namespaces_bytes, DeviceAuth, DeviceAuthentication,
};
use crate::definitions::session::{self, SessionTranscript};
use crate::key_agreement::{self, EcPrivateKey, EcPublicKey, SharedSecret};
use crate::presentation::session_encryption::{self, hkdf_sha256};
use crate::secure_area::{self, KeyRef};
use coset::iana;
use zeroize::Zeroizing;

const EMAC_KEY: &[u8] = b"EMacKey";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    DeviceAuthentication(#[from] device_signed::Error),
    #[error(transparent)]
    Transcript(#[from] session::Error),
    #[error("device key: {0}")]
    SecureArea(#[from] secure_area::Error),
    #[error(transparent)]
    KeyAgreement(#[from] key_agreement::Error),
    #[error("unable to derive EMacKey: {0}")]
    KeyDerivation(#[from] session_encryption::Error),
    #[error(transparent)]
    Cose(#[from] cose::Error),
    #[error("device authentication failed: {0}")]
    Verification(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// How the mdoc authenticates: a MAC unless a signature is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceAuthMethod {
    Signature,
    #[default]
    Mac,
}

/// `EMacKey = HKDF-SHA256(ECDH(device key, reader ephemeral key), SessionTranscriptBytes, "EMacKey")`
fn emac_key(shared_secret: &SharedSecret, transcript: &SessionTranscript) -> Result<Zeroizing<[u8; 32]>> {
    Ok(hkdf_sha256(
        shared_secret.as_bytes(),
        &transcript.to_tagged_bytes()?,
        EMAC_KEY,
    )?)
}

fn device_authentication_bytes(
    transcript: &SessionTranscript,
    doc_type: &str,
    namespaces_bytes: Option<Vec<u8>>,
) -> Result<Vec<u8>> {
    Ok(DeviceAuthentication::new(
        transcript.clone(),
        doc_type.to_string(),
        device_namespaces_bytes(namespaces_bytes)?,
    )
    .to_tagged_bytes()?)
}

/// The holder side of device authentication for one session.
#[derive(Debug)]
pub struct MdocAuthentication<'a> {
    pub transcript: SessionTranscript,
    /// The device key of the document, as listed in its MSO.
    pub device_key: KeyRef<'a>,
    pub e_reader_key: EcPublicKey,
}

impl<'a> MdocAuthentication<'a> {
    pub fn new(transcript: SessionTranscript, device_key: KeyRef<'a>, e_reader_key: EcPublicKey) -> Self {
        Self {
            transcript,
            device_key,
            e_reader_key,
        }
    }

    /// Signs or MACs `DeviceAuthenticationBytes` for the document of type `doc_type`.
    ///
    /// `device_namespaces_bytes` are the encoded device signed elements; `None` stands for the
    /// empty map.
    pub async fn get_device_auth_for_transfer(
        &self,
        doc_type: &str,
        device_namespaces_bytes: Option<Vec<u8>>,
        method: DeviceAuthMethod,
    ) -> Result<DeviceAuth> {
        let payload = device_authentication_bytes(&self.transcript, doc_type, device_namespaces_bytes)?;
        match method {
            DeviceAuthMethod::Signature => {
                let info = self
                    .device_key
                    .secure_area
                    .key_batch_info(self.device_key.id)
                    .await?;
                let prepared = sign1::PreparedCoseSign1::new(
                    info.curve.signature_algorithm(),
                    &payload,
                    None,
                )?;
                let signature = self
                    .device_key
                    .sign(info.curve.signature_algorithm(), prepared.signature_payload())
                    .await?;
                Ok(DeviceAuth::DeviceSignature(MaybeTagged::new(
                    false,
                    prepared.finalize(signature),
                )))
            }
            DeviceAuthMethod::Mac => {
                let shared_secret = self.device_key.agree(&self.e_reader_key).await?;
                let key = emac_key(&shared_secret, &self.transcript)?;
                let mac = mac0::make_detached(&payload, &key[..], iana::Algorithm::HMAC_256_256)?;
                Ok(DeviceAuth::DeviceMac(MaybeTagged::new(false, mac)))
            }
        }
    }
}

/// The reader side: checks a [DeviceAuth] against its own transcript.
///
/// `device_key` is the key from the validated MSO, `e_reader_key` the reader's ephemeral private
/// key, needed for the MAC form only.
pub fn verify_device_auth(
    transcript: &SessionTranscript,
    device_auth: &DeviceAuth,
    doc_type: &str,
    device_namespaces_bytes: Option<Vec<u8>>,
    device_key: &EcPublicKey,
    e_reader_key: &EcPrivateKey,
) -> Result<()> {
    let payload = device_authentication_bytes(transcript, doc_type, device_namespaces_bytes)?;
    let result = match device_auth {
        DeviceAuth::DeviceSignature(cose_sign1) => {
            sign1::verify_detached(cose_sign1, &payload, device_key)
        }
        DeviceAuth::DeviceMac(cose_mac0) => {
            let shared_secret = key_agreement::agree(e_reader_key, device_key)?;
            let key = emac_key(&shared_secret, transcript)?;
            mac0::verify_detached(cose_mac0, &payload, &key[..])
        }
    };
    match result {
        VerificationResult::Success => Ok(()),
        VerificationResult::Failure(reason) => {
            tracing::warn!("device authentication rejected: {reason}");
            Err(Error::Verification(reason))
        }
        VerificationResult::Error(e) => Err(e.into()),
    }
}

/// Encoded form of a [DeviceAuth], for transports that carry it separately.
pub fn encode_device_auth(device_auth: &DeviceAuth) -> Result<Vec<u8>> {
    let value = match device_auth {
        DeviceAuth::DeviceSignature(s) => s.to_cbor_value()?,
        DeviceAuth::DeviceMac(m) => m.to_cbor_value()?,
    };
    Ok(cbor::to_vec(&value).map_err(cose::Error::from)?)
}
