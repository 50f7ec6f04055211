//! Session encryption between an mdoc and a reader.
//!
//! Each direction has its own key, derived from the ECDH shared secret and the session
//! transcript, and its own message counter. The counter is the last four bytes of the AES-GCM
//! nonce and is never carried on the wire.
use crate::definitions::helpers::ByteStr;
use crate::definitions::session::{self, SessionData, SessionEstablishment, SessionTranscript};
use crate::key_agreement::{self, EcPrivateKey, EcPublicKey, SharedSecret};
use crate::secure_area::KeyRef;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Nonce identifier of ciphertext produced by the reader.
const READER_IDENTIFIER: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 0];
/// Nonce identifier of ciphertext produced by the mdoc.
const DEVICE_IDENTIFIER: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 1];

const SK_DEVICE: &[u8] = b"SKDevice";
const SK_READER: &[u8] = b"SKReader";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Covers a wrong key as well as tampered data.
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("message counter exhausted, the session must end")]
    CounterExhausted,
    #[error("key derivation failed")]
    KeyDerivation,
    #[error(transparent)]
    KeyAgreement(#[from] key_agreement::Error),
    #[error(transparent)]
    Transcript(#[from] session::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The holder device.
    Mdoc,
    Reader,
}

/// HKDF-SHA256 with a 32 byte output.
pub(crate) fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let mut okm = Zeroizing::new([0u8; 32]);
    Hkdf::<Sha256>::new(Some(salt), ikm)
        .expand(info, &mut okm[..])
        .map_err(|_| Error::KeyDerivation)?;
    Ok(okm)
}

/// The channel state of one session.
///
/// Methods take `&mut self`; a session is used by one task at a time.
pub struct SessionEncryption {
    role: Role,
    shared_secret: SharedSecret,
    transcript_bytes: Vec<u8>,
    send_counter: u32,
    receive_counter: u32,
}

impl std::fmt::Debug for SessionEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEncryption")
            .field("role", &self.role)
            .field("send_counter", &self.send_counter)
            .field("receive_counter", &self.receive_counter)
            .finish_non_exhaustive()
    }
}

impl SessionEncryption {
    pub fn new(role: Role, shared_secret: SharedSecret, transcript: &SessionTranscript) -> Result<Self> {
        Ok(Self {
            role,
            shared_secret,
            transcript_bytes: transcript.to_tagged_bytes()?,
            send_counter: 1,
            receive_counter: 1,
        })
    }

    /// The mdoc side: its ephemeral device key and the reader's ephemeral key.
    pub fn for_mdoc(
        e_device_key: &EcPrivateKey,
        e_reader_key: &EcPublicKey,
        transcript: &SessionTranscript,
    ) -> Result<Self> {
        let shared_secret = key_agreement::agree(e_device_key, e_reader_key)?;
        Self::new(Role::Mdoc, shared_secret, transcript)
    }

    /// The reader side: its ephemeral reader key and the device key from the engagement.
    pub fn for_reader(
        e_reader_key: &EcPrivateKey,
        e_device_key: &EcPublicKey,
        transcript: &SessionTranscript,
    ) -> Result<Self> {
        let shared_secret = key_agreement::agree(e_reader_key, e_device_key)?;
        Self::new(Role::Reader, shared_secret, transcript)
    }

    /// Like [SessionEncryption::for_mdoc] or [SessionEncryption::for_reader], with the local key
    /// held by a secure area.
    pub async fn from_secure_area(
        role: Role,
        key: KeyRef<'_>,
        remote: &EcPublicKey,
        transcript: &SessionTranscript,
    ) -> Result<Self> {
        let shared_secret = key
            .agree(remote)
            .await
            .map_err(key_agreement::Error::from)?;
        Self::new(role, shared_secret, transcript)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the ciphertext in question was produced by the mdoc.
    fn device_origin(&self, is_encrypt: bool) -> bool {
        (self.role == Role::Mdoc) == is_encrypt
    }

    /// `SKDevice` for mdoc-to-reader traffic, `SKReader` for reader-to-mdoc traffic.
    pub fn derive_key(&self, is_encrypt: bool) -> Result<Zeroizing<[u8; 32]>> {
        let info = if self.device_origin(is_encrypt) {
            SK_DEVICE
        } else {
            SK_READER
        };
        hkdf_sha256(self.shared_secret.as_bytes(), &self.transcript_bytes, info)
    }

    pub fn make_nonce(&self, counter: u32, is_encrypt: bool) -> [u8; 12] {
        let identifier = if self.device_origin(is_encrypt) {
            DEVICE_IDENTIFIER
        } else {
            READER_IDENTIFIER
        };
        let mut nonce = [0u8; 12];
        nonce[..8].copy_from_slice(&identifier);
        nonce[8..].copy_from_slice(&counter.to_be_bytes());
        nonce
    }

    /// Returns `ciphertext || tag`; the nonce is implied by the counter.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let next = self
            .send_counter
            .checked_add(1)
            .ok_or(Error::CounterExhausted)?;
        let key = self.derive_key(true)?;
        let nonce = self.make_nonce(self.send_counter, true);
        let ciphertext = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]))
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::EncryptionFailed)?;
        self.send_counter = next;
        Ok(ciphertext)
    }

    /// Opens the next message of the peer. A failure leaves the counters untouched.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let next = self
            .receive_counter
            .checked_add(1)
            .ok_or(Error::CounterExhausted)?;
        let key = self.derive_key(false)?;
        let nonce = self.make_nonce(self.receive_counter, false);
        let plaintext = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]))
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| {
                tracing::warn!("session message could not be decrypted");
                Error::DecryptionFailed
            })?;
        self.receive_counter = next;
        Ok(plaintext)
    }

    pub fn encrypt_session_data(&mut self, plaintext: &[u8]) -> Result<SessionData> {
        Ok(SessionData {
            data: Some(ByteStr::from(self.encrypt(plaintext)?)),
            status: None,
        })
    }

    pub fn decrypt_session_establishment(
        &mut self,
        establishment: &SessionEstablishment,
    ) -> Result<Vec<u8>> {
        self.decrypt(establishment.data.as_ref())
    }

    /// The payload of a [SessionData], or `None` when it only carries a status.
    pub fn decrypt_session_data(&mut self, session_data: &SessionData) -> Result<Option<Vec<u8>>> {
        session_data
            .data
            .as_ref()
            .map(|data| self.decrypt(data.as_ref()))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::device_key::EC2Curve;
    use crate::definitions::session::test::transcript;
    use crate::key_agreement::tests::{DEVICE_EPHEMERAL_D, READER_EPHEMERAL_D};
    use crate::secure_area::{KeyOptions, SoftwareSecureArea};
    use hex_literal::hex;

    const SK_READER_VECTOR: [u8; 32] =
        hex!("b7dee98df4b766af945e553f04be595a51938b4b702103db78b6fe61f76a39a3");
    const SK_DEVICE_VECTOR: [u8; 32] =
        hex!("391971a59bf8135befc22fd3e3430e71b6f4dda826cb339959f7bebbc90c42f6");
    const REQUEST: [u8; 13] = hex!("a16776657273696f6e63312e30");
    const REQUEST_CIPHERTEXT: [u8; 29] =
        hex!("2d0aed63306e75edfe0634c217caab542a639de6445f8f2eea2c491fb9");
    const RESPONSE: [u8; 9] = hex!("a16673746174757300");
    const RESPONSE_CIPHERTEXT: [u8; 25] =
        hex!("fc80eef1899bb8e45c385a93dec489943426b8766338f7f5dd");
    const SECOND_RESPONSE_CIPHERTEXT: [u8; 25] =
        hex!("ba01a80154164e0d5c8f9662e93f011dda03c63258f87a79f6");

    fn keys() -> (EcPrivateKey, EcPrivateKey) {
        (
            EcPrivateKey::from_slice(EC2Curve::P256, &DEVICE_EPHEMERAL_D).unwrap(),
            EcPrivateKey::from_slice(EC2Curve::P256, &READER_EPHEMERAL_D).unwrap(),
        )
    }

    fn sessions() -> (SessionEncryption, SessionEncryption) {
        let (device, reader) = keys();
        let transcript = transcript();
        (
            SessionEncryption::for_mdoc(&device, &reader.public_key(), &transcript).unwrap(),
            SessionEncryption::for_reader(&reader, &device.public_key(), &transcript).unwrap(),
        )
    }

    #[test]
    fn session_keys() {
        let (mdoc, reader) = sessions();
        assert_eq!(*mdoc.derive_key(true).unwrap(), SK_DEVICE_VECTOR);
        assert_eq!(*mdoc.derive_key(false).unwrap(), SK_READER_VECTOR);
        assert_eq!(*reader.derive_key(true).unwrap(), SK_READER_VECTOR);
        assert_eq!(*reader.derive_key(false).unwrap(), SK_DEVICE_VECTOR);
    }

    #[test]
    fn nonces() {
        let (mdoc, reader) = sessions();
        assert_eq!(mdoc.make_nonce(1, true), hex!("000000000000000100000001"));
        assert_eq!(mdoc.make_nonce(1, false), hex!("000000000000000000000001"));
        assert_eq!(reader.make_nonce(7, true), hex!("000000000000000000000007"));
        assert_eq!(reader.make_nonce(7, false), hex!("000000000000000100000007"));
    }

    #[test]
    fn reference_ciphertexts() {
        let (mut mdoc, mut reader) = sessions();
        assert_eq!(reader.encrypt(&REQUEST).unwrap(), REQUEST_CIPHERTEXT);
        assert_eq!(mdoc.decrypt(&REQUEST_CIPHERTEXT).unwrap(), REQUEST);

        assert_eq!(mdoc.encrypt(&RESPONSE).unwrap(), RESPONSE_CIPHERTEXT);
        assert_eq!(mdoc.encrypt(&RESPONSE).unwrap(), SECOND_RESPONSE_CIPHERTEXT);
        assert_eq!(reader.decrypt(&RESPONSE_CIPHERTEXT).unwrap(), RESPONSE);
        assert_eq!(reader.decrypt(&SECOND_RESPONSE_CIPHERTEXT).unwrap(), RESPONSE);
    }

    #[test]
    fn nonces_increase_with_each_message() {
        let (mut mdoc, _) = sessions();
        let mut nonces = vec![];
        for _ in 0..5 {
            nonces.push(mdoc.make_nonce(mdoc.send_counter, true));
            mdoc.encrypt(b"payload").unwrap();
        }
        for pair in nonces.windows(2) {
            assert_eq!(pair[0][..8], pair[1][..8]);
            assert!(pair[0][8..] < pair[1][8..]);
        }
        // Decrypting does not touch the send counter.
        assert_eq!(mdoc.send_counter, 6);
        assert_eq!(mdoc.receive_counter, 1);
    }

    #[test]
    fn tampered_message_is_rejected_without_state_change() {
        let (mut mdoc, mut reader) = sessions();
        let mut ciphertext = reader.encrypt(&REQUEST).unwrap();
        ciphertext[0] ^= 1;
        assert!(matches!(mdoc.decrypt(&ciphertext), Err(Error::DecryptionFailed)));
        assert!(matches!(mdoc.decrypt(&[0u8; 4]), Err(Error::DecryptionFailed)));
        ciphertext[0] ^= 1;
        assert_eq!(mdoc.decrypt(&ciphertext).unwrap(), REQUEST);

        // A message from the wrong direction does not open either.
        let own = mdoc.encrypt(&RESPONSE).unwrap();
        assert!(matches!(mdoc.decrypt(&own), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn exhausted_counter() {
        let (mut mdoc, _) = sessions();
        mdoc.send_counter = u32::MAX;
        assert!(matches!(mdoc.encrypt(b"x"), Err(Error::CounterExhausted)));
        assert_eq!(mdoc.send_counter, u32::MAX);
    }

    #[test]
    fn session_messages() {
        let (mut mdoc, mut reader) = sessions();
        let establishment = SessionEstablishment {
            e_reader_key: None,
            data: reader.encrypt(&REQUEST).unwrap().into(),
        };
        assert_eq!(mdoc.decrypt_session_establishment(&establishment).unwrap(), REQUEST);

        let response = mdoc.encrypt_session_data(&RESPONSE).unwrap();
        assert!(!response.is_termination());
        assert_eq!(reader.decrypt_session_data(&response).unwrap().unwrap(), RESPONSE);

        let termination = SessionData {
            data: None,
            status: Some(session::Status::SessionTermination),
        };
        assert!(reader.decrypt_session_data(&termination).unwrap().is_none());
    }

    #[test_log::test(tokio::test)]
    async fn secure_area_key() {
        let (device, reader) = keys();
        let device_public = device.public_key();
        let area = SoftwareSecureArea::new();
        area.import_key("session", device, KeyOptions::default()).unwrap();

        let mut mdoc = SessionEncryption::from_secure_area(
            Role::Mdoc,
            KeyRef::new(&area, "session", 0),
            &reader.public_key(),
            &transcript(),
        )
        .await
        .unwrap();
        let mut reader =
            SessionEncryption::for_reader(&reader, &device_public, &transcript()).unwrap();
        assert_eq!(mdoc.encrypt(&RESPONSE).unwrap(), RESPONSE_CIPHERTEXT);
        assert_eq!(reader.decrypt(&RESPONSE_CIPHERTEXT).unwrap(), RESPONSE);

        let missing = SessionEncryption::from_secure_area(
            Role::Mdoc,
            KeyRef::new(&area, "absent", 0),
            &device_public,
            &transcript(),
        )
        .await;
        assert!(matches!(
            missing,
            Err(Error::KeyAgreement(key_agreement::Error::KeyUnavailable(_)))
        ));
    }
}
