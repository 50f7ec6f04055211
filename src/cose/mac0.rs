use crate::cbor::{self, Value};
use crate::cose::{
    declared_algorithm, to_be_authenticated, Context, Error, MaybeTagged, Result,
    VerificationResult,
};
use coset::{iana, CoseMac0, CoseMac0Builder, HeaderBuilder, ProtectedHeader};
use hmac::{digest::KeyInit, Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};

fn check_algorithm(alg: iana::Algorithm) -> Result<()> {
    match alg {
        iana::Algorithm::HMAC_256_256
        | iana::Algorithm::HMAC_384_384
        | iana::Algorithm::HMAC_512_512 => Ok(()),
        other => Err(Error::UnsupportedAlgorithm(format!(
            "{other:?} is not an HMAC algorithm"
        ))),
    }
}

fn new_mac<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<M> {
    let mut mac = <M as KeyInit>::new_from_slice(key).map_err(|e| Error::InvalidKey(e.to_string()))?;
    mac.update(data);
    Ok(mac)
}

fn compute(alg: iana::Algorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    Ok(match alg {
        iana::Algorithm::HMAC_256_256 => new_mac::<Hmac<Sha256>>(key, data)?.finalize().into_bytes().to_vec(),
        iana::Algorithm::HMAC_384_384 => new_mac::<Hmac<Sha384>>(key, data)?.finalize().into_bytes().to_vec(),
        iana::Algorithm::HMAC_512_512 => new_mac::<Hmac<Sha512>>(key, data)?.finalize().into_bytes().to_vec(),
        other => return Err(Error::UnsupportedAlgorithm(format!("{other:?}"))),
    })
}

fn verify_tag(alg: iana::Algorithm, key: &[u8], data: &[u8], tag: &[u8]) -> Result<bool> {
    let verified = match alg {
        iana::Algorithm::HMAC_256_256 => new_mac::<Hmac<Sha256>>(key, data)?.verify_slice(tag),
        iana::Algorithm::HMAC_384_384 => new_mac::<Hmac<Sha384>>(key, data)?.verify_slice(tag),
        iana::Algorithm::HMAC_512_512 => new_mac::<Hmac<Sha512>>(key, data)?.verify_slice(tag),
        other => return Err(Error::UnsupportedAlgorithm(format!("{other:?}"))),
    };
    Ok(verified.is_ok())
}

/// MACs `payload` without embedding it.
pub fn make_detached(payload: &[u8], key: &[u8], alg: iana::Algorithm) -> Result<CoseMac0> {
    check_algorithm(alg)?;
    let protected = ProtectedHeader {
        original_data: None,
        header: HeaderBuilder::new().algorithm(alg).build(),
    };
    let tag = compute(alg, key, &to_be_authenticated(Context::Mac0, &protected, payload))?;
    Ok(CoseMac0Builder::new()
        .protected(protected.header)
        .tag(tag)
        .build())
}

/// Verifies a detached COSE_Mac0 against `payload`. The tag comparison is constant time.
pub fn verify_detached(cose_mac0: &CoseMac0, payload: &[u8], key: &[u8]) -> VerificationResult {
    let alg = match declared_algorithm(&cose_mac0.protected.header).and_then(|alg| {
        check_algorithm(alg)?;
        Ok(alg)
    }) {
        Ok(alg) => alg,
        Err(e) => return VerificationResult::Error(e),
    };
    let data = to_be_authenticated(Context::Mac0, &cose_mac0.protected, payload);
    match verify_tag(alg, key, &data, &cose_mac0.tag) {
        Ok(true) => VerificationResult::Success,
        Ok(false) => VerificationResult::Failure("MAC tag does not match".to_string()),
        Err(e) => VerificationResult::Error(e),
    }
}

/// Decodes `bytes` as a (possibly tagged) COSE_Mac0 and verifies it.
pub fn verify_detached_cbor(bytes: &[u8], payload: &[u8], key: &[u8]) -> VerificationResult {
    let decoded = cbor::from_slice::<Value>(bytes)
        .map_err(Error::from)
        .and_then(|value| MaybeTagged::<CoseMac0>::from_cbor_value(value, "COSE_Mac0"));
    match decoded {
        Ok(cose_mac0) => verify_detached(&cose_mac0, payload, key),
        Err(e) => VerificationResult::Error(e),
    }
}
