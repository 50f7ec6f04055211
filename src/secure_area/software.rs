//! An in-memory [SecureArea] for holders without key hardware, and for tests.
use super::{CredentialPolicy, Error, KeyBatchInfo, KeyOptions, Result, SecureArea};
use crate::cose::sign1::CoseSigner;
use crate::cose::SignatureAlgorithm;
use crate::definitions::device_key::CoseKey;
use crate::key_agreement::{self, EcPrivateKey, EcPublicKey, SharedSecret};
use async_trait::async_trait;
use coset::iana;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use zeroize::Zeroizing;

const NAME: &str = "SoftwareSecureArea";

struct KeyBatch {
    keys: Vec<Option<EcPrivateKey>>,
    used_counts: Vec<u64>,
    options: KeyOptions,
    unlock_data: Option<Zeroizing<Vec<u8>>>,
}

impl KeyBatch {
    fn info(&self) -> KeyBatchInfo {
        KeyBatchInfo {
            secure_area_name: NAME,
            curve: self.options.curve,
            used_counts: self.used_counts.clone(),
            credential_policy: self.options.credential_policy,
        }
    }

    /// Checks unlock data and the credential policy. The use is counted separately, once the
    /// operation has succeeded.
    fn usable_key(
        &self,
        id: &str,
        index: usize,
        unlock_data: Option<&[u8]>,
    ) -> Result<&EcPrivateKey> {
        if let Some(expected) = &self.unlock_data {
            match unlock_data {
                None => return Err(Error::Locked("unlock data required".into())),
                Some(given) if given != expected.as_slice() => {
                    return Err(Error::Locked("unlock data does not match".into()))
                }
                Some(_) => (),
            }
        }
        let unknown = || Error::UnknownKey {
            id: id.to_string(),
            index,
        };
        let count = self.used_counts.get(index).ok_or_else(unknown)?;
        if self.options.credential_policy == CredentialPolicy::OneTimeUse && *count > 0 {
            return Err(Error::KeyExhausted {
                id: id.to_string(),
                index,
            });
        }
        self.keys
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(unknown)
    }

    fn count_use(&mut self, index: usize) {
        if let Some(count) = self.used_counts.get_mut(index) {
            *count += 1;
        }
    }
}

/// Keys are generated with the operating system RNG and kept in process memory.
#[derive(Default)]
pub struct SoftwareSecureArea {
    batches: Mutex<HashMap<String, KeyBatch>>,
}

impl SoftwareSecureArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an existing key as a batch of one, for fixed test vectors.
    pub fn import_key(&self, id: &str, key: EcPrivateKey, options: KeyOptions) -> Result<CoseKey> {
        let public_key = key.public_key().to_cose_key();
        let batch = KeyBatch {
            keys: vec![Some(key)],
            used_counts: vec![0],
            unlock_data: options.unlock_data.clone().map(Zeroizing::new),
            options: KeyOptions {
                batch_size: 1,
                ..options
            },
        };
        self.insert(id, batch)?;
        Ok(public_key)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, KeyBatch>>> {
        self.batches
            .lock()
            .map_err(|_| Error::Storage("key store lock poisoned".into()))
    }

    fn insert(&self, id: &str, batch: KeyBatch) -> Result<()> {
        let mut batches = self.lock()?;
        if batches.contains_key(id) {
            return Err(Error::BatchExists(id.to_string()));
        }
        batches.insert(id.to_string(), batch);
        Ok(())
    }
}

#[async_trait]
impl SecureArea for SoftwareSecureArea {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create_key_batch(&self, id: &str, options: KeyOptions) -> Result<Vec<CoseKey>> {
        if options.batch_size == 0 {
            return Err(Error::InvalidOptions("batch size must be at least 1".into()));
        }
        // The whole batch is generated before anything is stored.
        let keys: Vec<EcPrivateKey> = (0..options.batch_size)
            .map(|_| EcPrivateKey::random(options.curve))
            .collect();
        let public_keys = keys.iter().map(|k| k.public_key().to_cose_key()).collect();
        let batch = KeyBatch {
            used_counts: vec![0; keys.len()],
            keys: keys.into_iter().map(Some).collect(),
            unlock_data: options.unlock_data.clone().map(Zeroizing::new),
            options,
        };
        self.insert(id, batch)?;
        tracing::debug!("created key batch '{id}'");
        Ok(public_keys)
    }

    async fn sign(
        &self,
        id: &str,
        index: usize,
        algorithm: iana::Algorithm,
        data: &[u8],
        unlock_data: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let mut batches = self.lock()?;
        let batch = batches.get_mut(id).ok_or_else(|| Error::UnknownKey {
            id: id.to_string(),
            index,
        })?;
        let key = batch.usable_key(id, index, unlock_data)?;
        if key.algorithm() != algorithm {
            return Err(Error::UnsupportedAlgorithm(algorithm));
        }
        tracing::debug!("signing with {algorithm:?}, key batch '{id}' index {index}");
        let signature = key
            .sign_raw(data)
            .map_err(|e| Error::Signing(e.to_string()))?;
        batch.count_use(index);
        Ok(signature)
    }

    async fn key_agreement(
        &self,
        id: &str,
        index: usize,
        public_key: &EcPublicKey,
        unlock_data: Option<&[u8]>,
    ) -> Result<SharedSecret> {
        let mut batches = self.lock()?;
        let batch = batches.get_mut(id).ok_or_else(|| Error::UnknownKey {
            id: id.to_string(),
            index,
        })?;
        let key = batch.usable_key(id, index, unlock_data)?;
        let shared_secret = key_agreement::agree(key, public_key)?;
        batch.count_use(index);
        Ok(shared_secret)
    }

    async fn delete_key_batch(
        &self,
        id: &str,
        start_index: usize,
        batch_size: usize,
    ) -> Result<()> {
        let mut batches = self.lock()?;
        let Some(batch) = batches.get_mut(id) else {
            return Ok(());
        };
        for slot in batch.keys.iter_mut().skip(start_index).take(batch_size) {
            *slot = None;
        }
        if batch.keys.iter().all(Option::is_none) {
            batches.remove(id);
            tracing::debug!("deleted key batch '{id}'");
        }
        Ok(())
    }

    async fn key_batch_info(&self, id: &str) -> Result<KeyBatchInfo> {
        self.lock()?
            .get(id)
            .map(KeyBatch::info)
            .ok_or_else(|| Error::UnknownKey {
                id: id.to_string(),
                index: 0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cose::sign1::CoseVerifier;
    use crate::definitions::device_key::EC2Curve;

    #[test_log::test(tokio::test)]
    async fn batch_lifecycle() {
        let area = SoftwareSecureArea::new();
        let keys = area
            .create_key_batch(
                "pid",
                KeyOptions {
                    batch_size: 3,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(keys.len(), 3);
        assert!(area.create_key_batch("pid", KeyOptions::default()).await.is_err());

        let public_key = EcPublicKey::from_cose_key(&keys[1]).unwrap();
        let signature = area
            .sign("pid", 1, iana::Algorithm::ES256, b"data", None)
            .await
            .unwrap();
        assert!(public_key.verify_raw(b"data", &signature).is_ok());
        assert!(matches!(
            area.sign("pid", 1, iana::Algorithm::ES384, b"data", None).await,
            Err(Error::UnsupportedAlgorithm(_))
        ));

        let info = area.key_batch_info("pid").await.unwrap();
        assert_eq!(info.used_counts, vec![0, 1, 0]);
        assert_eq!(info.secure_area_name, "SoftwareSecureArea");

        area.delete_key_batch("pid", 0, 2).await.unwrap();
        assert!(matches!(
            area.sign("pid", 0, iana::Algorithm::ES256, b"data", None).await,
            Err(Error::UnknownKey { .. })
        ));
        area.delete_key_batch("pid", 2, 1).await.unwrap();
        assert!(area.key_batch_info("pid").await.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn agreement_matches_software_keys() {
        let area = SoftwareSecureArea::new();
        let device = EcPrivateKey::random(EC2Curve::P384);
        let device_public = device.public_key();
        area.import_key("device", device, KeyOptions {
            curve: EC2Curve::P384,
            ..Default::default()
        })
        .unwrap();
        let reader = EcPrivateKey::random(EC2Curve::P384);
        let from_area = area
            .key_agreement("device", 0, &reader.public_key(), None)
            .await
            .unwrap();
        let from_reader = key_agreement::agree(&reader, &device_public).unwrap();
        assert_eq!(from_area.as_bytes(), from_reader.as_bytes());

        let p256 = EcPrivateKey::random(EC2Curve::P256).public_key();
        assert!(matches!(
            area.key_agreement("device", 0, &p256, None).await,
            Err(Error::KeyAgreement(key_agreement::Error::CurveMismatch { .. }))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn unlock_data_and_one_time_use() {
        let area = SoftwareSecureArea::new();
        area.create_key_batch(
            "mdl",
            KeyOptions {
                credential_policy: CredentialPolicy::OneTimeUse,
                unlock_data: Some(b"1234".to_vec()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            area.sign("mdl", 0, iana::Algorithm::ES256, b"x", None).await,
            Err(Error::Locked(_))
        ));
        assert!(matches!(
            area.sign("mdl", 0, iana::Algorithm::ES256, b"x", Some(b"0000")).await,
            Err(Error::Locked(_))
        ));
        area.sign("mdl", 0, iana::Algorithm::ES256, b"x", Some(b"1234"))
            .await
            .unwrap();
        assert!(matches!(
            area.sign("mdl", 0, iana::Algorithm::ES256, b"x", Some(b"1234")).await,
            Err(Error::KeyExhausted { .. })
        ));
        // Refused uses are not counted.
        assert_eq!(area.key_batch_info("mdl").await.unwrap().used_counts, vec![1]);
    }

    #[test_log::test(tokio::test)]
    async fn refused_operations_leave_one_time_key_usable() {
        let area = SoftwareSecureArea::new();
        area.create_key_batch(
            "once",
            KeyOptions {
                credential_policy: CredentialPolicy::OneTimeUse,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            area.sign("once", 0, iana::Algorithm::ES384, b"x", None).await,
            Err(Error::UnsupportedAlgorithm(iana::Algorithm::ES384))
        ));
        let p384 = EcPrivateKey::random(EC2Curve::P384).public_key();
        assert!(matches!(
            area.key_agreement("once", 0, &p384, None).await,
            Err(Error::KeyAgreement(key_agreement::Error::CurveMismatch { .. }))
        ));
        assert_eq!(area.key_batch_info("once").await.unwrap().used_counts, vec![0]);

        area.sign("once", 0, iana::Algorithm::ES256, b"x", None)
            .await
            .unwrap();
        assert_eq!(area.key_batch_info("once").await.unwrap().used_counts, vec![1]);
        assert!(matches!(
            area.sign("once", 0, iana::Algorithm::ES256, b"x", None).await,
            Err(Error::KeyExhausted { .. })
        ));
    }
}
