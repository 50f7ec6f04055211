//! Capability interface over the place where device private keys live.
//!
//! Keys are addressed by a batch identifier and an index inside the batch. Private key material
//! never crosses this interface: callers get signatures and shared secrets back.
use crate::definitions::device_key::{CoseKey, EC2Curve};
use crate::key_agreement::{self, EcPublicKey, SharedSecret};
use async_trait::async_trait;
use coset::iana;
use serde::Deserialize;

pub mod software;

pub use software::SoftwareSecureArea;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("no key {index} in batch '{id}'")]
    UnknownKey { id: String, index: usize },
    #[error("key batch '{0}' already exists")]
    BatchExists(String),
    #[error("key is locked: {0}")]
    Locked(String),
    #[error("one-time key {index} in batch '{id}' was already used")]
    KeyExhausted { id: String, index: usize },
    #[error("algorithm {0:?} does not match the key")]
    UnsupportedAlgorithm(iana::Algorithm),
    #[error("invalid key options: {0}")]
    InvalidOptions(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("secure area storage failure: {0}")]
    Storage(String),
    #[error(transparent)]
    KeyAgreement(#[from] key_agreement::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for key_agreement::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::KeyAgreement(e) => e,
            other => key_agreement::Error::KeyUnavailable(other.to_string()),
        }
    }
}

/// How the keys of a batch may be used by credential presentations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CredentialPolicy {
    /// Each key is used for a single presentation, then refused.
    OneTimeUse,
    /// Keys are used in rotation without a limit.
    #[default]
    RotateUse,
}

/// Parameters of [SecureArea::create_key_batch].
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeyOptions {
    pub curve: EC2Curve,
    pub batch_size: usize,
    pub credential_policy: CredentialPolicy,
    /// When set, every use of the keys has to present the same bytes.
    pub unlock_data: Option<Vec<u8>>,
}

impl Default for KeyOptions {
    fn default() -> Self {
        Self {
            curve: EC2Curve::P256,
            batch_size: 1,
            credential_policy: CredentialPolicy::default(),
            unlock_data: None,
        }
    }
}

/// Public information about a key batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBatchInfo {
    pub secure_area_name: &'static str,
    pub curve: EC2Curve,
    /// Per key, the number of signatures and agreements it took part in.
    pub used_counts: Vec<u64>,
    pub credential_policy: CredentialPolicy,
}

#[async_trait]
pub trait SecureArea: Send + Sync {
    fn name(&self) -> &'static str;

    /// Creates `options.batch_size` keys under `id` and returns their public keys.
    async fn create_key_batch(&self, id: &str, options: KeyOptions) -> Result<Vec<CoseKey>>;

    /// Produces a raw `r || s` ECDSA signature over `data` with the key at `index`.
    async fn sign(
        &self,
        id: &str,
        index: usize,
        algorithm: iana::Algorithm,
        data: &[u8],
        unlock_data: Option<&[u8]>,
    ) -> Result<Vec<u8>>;

    /// ECDH between the key at `index` and `public_key`.
    async fn key_agreement(
        &self,
        id: &str,
        index: usize,
        public_key: &EcPublicKey,
        unlock_data: Option<&[u8]>,
    ) -> Result<SharedSecret>;

    /// Removes `batch_size` keys starting at `start_index`. The batch disappears with its last key.
    async fn delete_key_batch(&self, id: &str, start_index: usize, batch_size: usize)
        -> Result<()>;

    async fn key_batch_info(&self, id: &str) -> Result<KeyBatchInfo>;
}

/// A key inside a [SecureArea], with the unlock data needed to use it.
#[derive(Clone, Copy)]
pub struct KeyRef<'a> {
    pub secure_area: &'a dyn SecureArea,
    pub id: &'a str,
    pub index: usize,
    pub unlock_data: Option<&'a [u8]>,
}

impl<'a> KeyRef<'a> {
    pub fn new(secure_area: &'a dyn SecureArea, id: &'a str, index: usize) -> Self {
        Self {
            secure_area,
            id,
            index,
            unlock_data: None,
        }
    }

    pub fn with_unlock_data(mut self, unlock_data: &'a [u8]) -> Self {
        self.unlock_data = Some(unlock_data);
        self
    }

    pub async fn sign(&self, algorithm: iana::Algorithm, data: &[u8]) -> Result<Vec<u8>> {
        self.secure_area
            .sign(self.id, self.index, algorithm, data, self.unlock_data)
            .await
    }

    pub async fn agree(&self, public_key: &EcPublicKey) -> Result<SharedSecret> {
        self.secure_area
            .key_agreement(self.id, self.index, public_key, self.unlock_data)
            .await
    }
}

impl std::fmt::Debug for KeyRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRef")
            .field("secure_area", &self.secure_area.name())
            .field("id", &self.id)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}
