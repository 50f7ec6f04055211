use crate::cbor::{self, Value};
use crate::cose::{
    declared_algorithm, to_be_authenticated, Context, Error, MaybeTagged, Result,
    SignatureAlgorithm, VerificationResult,
};
use crate::definitions::x509::x5chain::{X5Chain, X5CHAIN_COSE_HEADER_LABEL};
use crate::key_agreement::{EcPrivateKey, EcPublicKey};
use coset::{iana, CoseSign1, CoseSign1Builder, HeaderBuilder};

/// A signer producing raw `r || s` ECDSA signatures, as COSE requires.
pub trait CoseSigner: SignatureAlgorithm {
    fn sign_raw(&self, data: &[u8]) -> Result<Vec<u8>, signature::Error>;
}

/// A verifier of raw `r || s` ECDSA signatures.
pub trait CoseVerifier: SignatureAlgorithm {
    fn verify_raw(&self, data: &[u8], signature: &[u8]) -> Result<(), signature::Error>;
}

fn check_algorithm(alg: iana::Algorithm) -> Result<()> {
    match alg {
        iana::Algorithm::ES256 | iana::Algorithm::ES384 | iana::Algorithm::ES512 => Ok(()),
        other => Err(Error::UnsupportedAlgorithm(format!(
            "{other:?} is not an ECDSA algorithm"
        ))),
    }
}

/// A COSE_Sign1 waiting for its signature, so the signing key may live somewhere asynchronous.
#[derive(Debug, Clone)]
pub struct PreparedCoseSign1 {
    cose_sign1: CoseSign1,
    signature_payload: Vec<u8>,
}

impl PreparedCoseSign1 {
    /// Builds the protected header `{1: alg}`, puts the optional certificate chain in the
    /// unprotected header and computes the `Sig_structure` over the detached `payload`.
    pub fn new(alg: iana::Algorithm, payload: &[u8], x5chain: Option<&X5Chain>) -> Result<Self> {
        check_algorithm(alg)?;
        let mut unprotected = HeaderBuilder::new();
        if let Some(chain) = x5chain {
            unprotected = unprotected.value(X5CHAIN_COSE_HEADER_LABEL, chain.into_cbor());
        }
        let cose_sign1 = CoseSign1Builder::new()
            .protected(HeaderBuilder::new().algorithm(alg).build())
            .unprotected(unprotected.build())
            .build();
        let signature_payload =
            to_be_authenticated(Context::Signature1, &cose_sign1.protected, payload);
        Ok(Self {
            cose_sign1,
            signature_payload,
        })
    }

    pub fn signature_payload(&self) -> &[u8] {
        &self.signature_payload
    }

    pub fn finalize(self, signature: Vec<u8>) -> CoseSign1 {
        let mut cose_sign1 = self.cose_sign1;
        cose_sign1.signature = signature;
        cose_sign1
    }
}

/// Signs `payload` without embedding it.
pub fn make_detached<S>(payload: &[u8], signer: &S, x5chain: Option<&X5Chain>) -> Result<CoseSign1>
where
    S: CoseSigner + ?Sized,
{
    let prepared = PreparedCoseSign1::new(signer.algorithm(), payload, x5chain)?;
    let signature = signer
        .sign_raw(prepared.signature_payload())
        .map_err(|e| Error::Signing(e.to_string()))?;
    Ok(prepared.finalize(signature))
}

/// Verifies a detached COSE_Sign1 against `payload`.
///
/// The algorithm of the structure must be ES256, ES384 or ES512 and must be the algorithm of the
/// verifying key.
pub fn verify_detached<V>(cose_sign1: &CoseSign1, payload: &[u8], verifier: &V) -> VerificationResult
where
    V: CoseVerifier + ?Sized,
{
    let alg = match declared_algorithm(&cose_sign1.protected.header).and_then(|alg| {
        check_algorithm(alg)?;
        Ok(alg)
    }) {
        Ok(alg) => alg,
        Err(e) => return VerificationResult::Error(e),
    };
    if alg != verifier.algorithm() {
        return VerificationResult::Error(Error::UnsupportedAlgorithm(format!(
            "structure declares {alg:?} but the key is for {:?}",
            verifier.algorithm()
        )));
    }
    let tbs = to_be_authenticated(Context::Signature1, &cose_sign1.protected, payload);
    match verifier.verify_raw(&tbs, &cose_sign1.signature) {
        Ok(()) => VerificationResult::Success,
        Err(e) => VerificationResult::Failure(format!("signature is invalid: {e}")),
    }
}

/// Decodes `bytes` as a (possibly tagged) COSE_Sign1 and verifies it.
pub fn verify_detached_cbor<V>(bytes: &[u8], payload: &[u8], verifier: &V) -> VerificationResult
where
    V: CoseVerifier + ?Sized,
{
    let decoded = cbor::from_slice::<Value>(bytes)
        .map_err(Error::from)
        .and_then(|value| MaybeTagged::<CoseSign1>::from_cbor_value(value, "COSE_Sign1"));
    match decoded {
        Ok(cose_sign1) => verify_detached(&cose_sign1, payload, verifier),
        Err(e) => VerificationResult::Error(e),
    }
}

/// The certificate chain carried in the unprotected header, if any.
pub fn x5chain(cose_sign1: &CoseSign1) -> Option<&Value> {
    cose_sign1
        .unprotected
        .rest
        .iter()
        .chain(cose_sign1.protected.header.rest.iter())
        .find(|(label, _)| *label == coset::Label::Int(X5CHAIN_COSE_HEADER_LABEL))
        .map(|(_, value)| value)
}

macro_rules! ecdsa_impls {
    ($module:ident, $alg:expr) => {
        mod $module {
            use super::{CoseSigner, CoseVerifier};
            use crate::cose::SignatureAlgorithm;
            use coset::iana;
            use ::$module::ecdsa::{Signature, SigningKey, VerifyingKey};
            use signature::{Signer, Verifier};

            impl SignatureAlgorithm for SigningKey {
                fn algorithm(&self) -> iana::Algorithm {
                    $alg
                }
            }

            impl SignatureAlgorithm for VerifyingKey {
                fn algorithm(&self) -> iana::Algorithm {
                    $alg
                }
            }

            impl CoseSigner for SigningKey {
                fn sign_raw(&self, data: &[u8]) -> Result<Vec<u8>, signature::Error> {
                    let signature: Signature = self.try_sign(data)?;
                    Ok(signature.to_bytes().to_vec())
                }
            }

            impl CoseVerifier for VerifyingKey {
                fn verify_raw(&self, data: &[u8], signature: &[u8]) -> Result<(), signature::Error> {
                    let signature = Signature::from_slice(signature)?;
                    self.verify(data, &signature)
                }
            }
        }
    };
}

ecdsa_impls!(p256, iana::Algorithm::ES256);
ecdsa_impls!(p384, iana::Algorithm::ES384);
ecdsa_impls!(p521, iana::Algorithm::ES512);

impl SignatureAlgorithm for EcPrivateKey {
    fn algorithm(&self) -> iana::Algorithm {
        self.curve().signature_algorithm()
    }
}

impl CoseSigner for EcPrivateKey {
    fn sign_raw(&self, data: &[u8]) -> Result<Vec<u8>, signature::Error> {
        match self {
            EcPrivateKey::P256(sk) => ::p256::ecdsa::SigningKey::from(sk).sign_raw(data),
            EcPrivateKey::P384(sk) => ::p384::ecdsa::SigningKey::from(sk).sign_raw(data),
            EcPrivateKey::P521(sk) => ::p521::ecdsa::SigningKey::from_bytes(&sk.to_bytes())?.sign_raw(data),
        }
    }
}

impl SignatureAlgorithm for EcPublicKey {
    fn algorithm(&self) -> iana::Algorithm {
        self.curve().signature_algorithm()
    }
}

impl CoseVerifier for EcPublicKey {
    fn verify_raw(&self, data: &[u8], signature: &[u8]) -> Result<(), signature::Error> {
        match self {
            EcPublicKey::P256(pk) => ::p256::ecdsa::VerifyingKey::from(pk).verify_raw(data, signature),
            EcPublicKey::P384(pk) => ::p384::ecdsa::VerifyingKey::from(pk).verify_raw(data, signature),
            EcPublicKey::P521(pk) => {
                ::p521::ecdsa::VerifyingKey::from_affine(*pk.as_affine())?
                    .verify_raw(data, signature)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor;
    use crate::definitions::device_key::EC2Curve;
    use hex_literal::hex;

    #[test]
    fn all_curves_sign_and_verify() {
        for curve in [EC2Curve::P256, EC2Curve::P384, EC2Curve::P521] {
            let key = EcPrivateKey::random(curve);
            let payload = b"detached payload";
            let sign1 = make_detached(payload, &key, None).unwrap();
            assert!(sign1.payload.is_none());
            assert_eq!(sign1.signature.len(), 2 * curve.field_size());
            assert!(verify_detached(&sign1, payload, &key.public_key()).is_success());
        }
    }

    #[test]
    fn tampering_fails() {
        let key = EcPrivateKey::random(EC2Curve::P256);
        let payload = b"detached payload".to_vec();
        let sign1 = make_detached(&payload, &key, None).unwrap();

        let mut bad_payload = payload.clone();
        bad_payload[0] ^= 0x01;
        assert!(matches!(
            verify_detached(&sign1, &bad_payload, &key.public_key()),
            VerificationResult::Failure(_)
        ));

        for bit in [0usize, 77, 511] {
            let mut bad = sign1.clone();
            bad.signature[bit / 8] ^= 1 << (bit % 8);
            assert!(!verify_detached(&bad, &payload, &key.public_key()).is_success());
        }
    }

    #[test]
    fn wrong_key_algorithm_fails_closed() {
        let key = EcPrivateKey::random(EC2Curve::P256);
        let other = EcPrivateKey::random(EC2Curve::P384);
        let sign1 = make_detached(b"x", &key, None).unwrap();
        assert!(matches!(
            verify_detached(&sign1, b"x", &other.public_key()),
            VerificationResult::Error(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn unknown_algorithm_fails_closed() {
        let key = EcPrivateKey::random(EC2Curve::P256);
        let mut sign1 = make_detached(b"x", &key, None).unwrap();
        sign1.protected = coset::ProtectedHeader {
            original_data: None,
            header: HeaderBuilder::new().algorithm(iana::Algorithm::EdDSA).build(),
        };
        assert!(matches!(
            verify_detached(&sign1, b"x", &key.public_key()),
            VerificationResult::Error(Error::UnsupportedAlgorithm(_))
        ));
        sign1.protected = Default::default();
        assert!(!verify_detached(&sign1, b"x", &key.public_key()).is_success());
    }

    #[test]
    fn mac0_bytes_are_not_a_sign1() {
        let key = EcPrivateKey::random(EC2Curve::P256);
        let bytes = hex!("d18443a10105a0f6420000");
        assert!(matches!(
            verify_detached_cbor(&bytes, b"x", &key.public_key()),
            VerificationResult::Error(Error::WrongCoseType { .. })
        ));
    }

    #[test]
    fn signature_from_independent_implementation() {
        // ES256 over DeviceAuthenticationBytes, produced outside this crate.
        let device_key = EcPrivateKey::from_slice(
            EC2Curve::P256,
            &crate::key_agreement::tests::DEVICE_STATIC_D,
        )
        .unwrap();
        let payload = crate::definitions::device_signed::tests::DEVICE_AUTHENTICATION_BYTES;
        let signature = hex!("48f312364c7a796d90ccedf2e765576e3a00a79b4cc7a91bd16e56d5d3bc6c99158ff4b93092790afd30386a3f382b1afe33d41d86c5a3e1ea3e4fa55fc51a30");
        let mut bytes = hex!("8443a10126a0f65840").to_vec();
        bytes.extend_from_slice(&signature);
        let sign1: MaybeTagged<CoseSign1> = cbor::from_slice(&bytes).unwrap();
        assert!(verify_detached(&sign1, payload, &device_key.public_key()).is_success());
        assert_eq!(
            to_be_authenticated(Context::Signature1, &sign1.protected, payload),
            crate::definitions::device_signed::tests::SIG_STRUCTURE
        );
    }
}
