use const_oid::{
    db::rfc5912::{ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512},
    ObjectIdentifier,
};
use der::Encode;
use p256::NistP256;
use p384::NistP384;
use p521::NistP521;
use sha2::{Digest, Sha256, Sha384, Sha512};
use signature::hazmat::PrehashVerifier;
use x509_cert::Certificate;

use crate::definitions::x509::util::public_key;
use crate::key_agreement::EcPublicKey;

/// The certificate and CRL signature algorithms accepted by this crate.
pub const ECDSA_SIGNATURE_ALGORITHMS: [ObjectIdentifier; 3] =
    [ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512];

fn prehash(algorithm: &ObjectIdentifier, data: &[u8]) -> Option<Vec<u8>> {
    match *algorithm {
        ECDSA_WITH_SHA_256 => Some(Sha256::digest(data).to_vec()),
        ECDSA_WITH_SHA_384 => Some(Sha384::digest(data).to_vec()),
        ECDSA_WITH_SHA_512 => Some(Sha512::digest(data).to_vec()),
        _ => None,
    }
}

macro_rules! verify_der_prehash {
    ($curve:ty, $key:expr, $prehash:expr, $signature:expr) => {{
        let verifying_key = ecdsa::VerifyingKey::<$curve>::from($key);
        ecdsa::Signature::<$curve>::from_der($signature)
            .and_then(|signature| verifying_key.verify_prehash($prehash, &signature))
    }};
}

/// Verify a DER encoded ECDSA signature made by the key of `signing_cert` over `data`.
///
/// The digest is the one named by `algorithm`; the curve is the one of the certificate key.
pub fn verify_signature(
    signing_cert: &Certificate,
    algorithm: &ObjectIdentifier,
    signature: &[u8],
    data: &[u8],
) -> bool {
    let Some(prehash) = prehash(algorithm, data) else {
        tracing::warn!("unsupported signature algorithm: {algorithm}");
        return false;
    };

    let key = match public_key(signing_cert) {
        Ok(key) => key,
        Err(e) => {
            tracing::error!("failed to decode issuer public key: {e:?}");
            return false;
        }
    };

    let result = match &key {
        EcPublicKey::P256(pk) => verify_der_prehash!(NistP256, pk, &prehash, signature),
        EcPublicKey::P384(pk) => verify_der_prehash!(NistP384, pk, &prehash, signature),
        EcPublicKey::P521(pk) => verify_der_prehash!(NistP521, pk, &prehash, signature),
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::info!("signature could not be validated: {e:?}");
            false
        }
    }
}

/// Check that the issuer certificate signed the subject certificate.
pub fn issuer_signed_subject(subject: &Certificate, issuer: &Certificate) -> bool {
    let tbs = match subject.tbs_certificate.to_der() {
        Ok(tbs) => tbs,
        Err(e) => {
            tracing::error!("failed to encode subject tbs: {e:?}");
            return false;
        }
    };

    verify_signature(
        issuer,
        &subject.signature_algorithm.oid,
        subject.signature.raw_bytes(),
        &tbs,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::definitions::x509::test::{
        issue_end_entity, self_signed_p384_root, self_signed_root, CertificateProfile,
    };

    #[test]
    fn correct_signature() {
        let (root, root_key) = self_signed_root("http://example.com/crl");
        let (leaf, _) = issue_end_entity(&root, &root_key, CertificateProfile::DocumentSigner);
        assert!(issuer_signed_subject(&leaf, &root));
        assert!(issuer_signed_subject(&root, &root));
    }

    #[test]
    fn incorrect_signature() {
        let (root, root_key) = self_signed_root("http://example.com/crl");
        let (other_root, _) = self_signed_root("http://example.com/crl");
        let (leaf, _) = issue_end_entity(&root, &root_key, CertificateProfile::DocumentSigner);
        assert!(!issuer_signed_subject(&leaf, &other_root));
        assert!(!issuer_signed_subject(&root, &leaf));
    }

    #[test]
    fn p384_issuer() {
        let key = p384::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let root = self_signed_p384_root(&key, "http://example.com/crl");
        assert!(issuer_signed_subject(&root, &root));
        assert_eq!(root.signature_algorithm.oid, ECDSA_WITH_SHA_384);
    }
}
