//! Detached COSE_Sign1 and COSE_Mac0 structures, restricted to the algorithms of ISO/IEC 18013-5.
//!
//! The payload is never carried inside the structure. Both sides rebuild the to-be-signed bytes
//! from the protected header and the payload they hold, see [to_be_authenticated].
use crate::cbor::{CborError, Value};
use coset::{
    iana, mac_structure_data, sig_structure_data, AsCborValue, Header, MacContext,
    ProtectedHeader, RegisteredLabelWithPrivate, SignatureContext, TaggedCborSerializable,
};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::ops::{Deref, DerefMut};

pub mod mac0;
pub mod sign1;

pub use coset::{CoseMac0, CoseSign1};

/// Trait to represent the signature algorithm of a signer or verifier.
pub trait SignatureAlgorithm {
    fn algorithm(&self) -> iana::Algorithm;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("expected a {expected}, received {found}")]
    WrongCoseType {
        expected: &'static str,
        found: String,
    },
    #[error("unable to produce signature: {0}")]
    Signing(String),
    #[error("invalid MAC key: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Cbor(#[from] CborError),
}

impl From<coset::CoseError> for Error {
    fn from(e: coset::CoseError) -> Self {
        Error::Cbor(e.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Outcome of verifying a signature or MAC.
///
/// `Failure` means the check ran and did not pass; `Error` means it could not run at all, for
/// example because the algorithm is not acceptable. Neither is ever treated as success.
#[derive(Debug)]
#[must_use]
pub enum VerificationResult {
    Success,
    Failure(String),
    Error(Error),
}

impl VerificationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationResult::Success)
    }

    pub fn into_result(self) -> Result<(), String> {
        match self {
            VerificationResult::Success => Ok(()),
            VerificationResult::Failure(reason) => Err(reason),
            VerificationResult::Error(e) => Err(e.to_string()),
        }
    }
}

/// The two COSE structures this crate authenticates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Signature1,
    Mac0,
}

/// `Sig_structure = ["Signature1", protected, external_aad, payload]` or
/// `MAC_structure = ["MAC0", protected, external_aad, payload]`, always with an empty external aad.
///
/// A protected header decoded from the wire keeps its original bytes.
pub fn to_be_authenticated(context: Context, protected: &ProtectedHeader, payload: &[u8]) -> Vec<u8> {
    match context {
        Context::Signature1 => sig_structure_data(
            SignatureContext::CoseSign1,
            protected.clone(),
            None,
            &[],
            payload,
        ),
        Context::Mac0 => mac_structure_data(MacContext::CoseMac0, protected.clone(), &[], payload),
    }
}

/// The algorithm declared in a protected header, if it is a registered one.
pub(crate) fn declared_algorithm(protected: &Header) -> Result<iana::Algorithm> {
    match &protected.alg {
        Some(RegisteredLabelWithPrivate::Assigned(alg)) => Ok(*alg),
        Some(other) => Err(Error::UnsupportedAlgorithm(format!("{other:?}"))),
        None => Err(Error::UnsupportedAlgorithm(
            "no algorithm in protected header".to_string(),
        )),
    }
}

/// A COSE structure that remembers whether it was received with its CBOR tag.
#[derive(Debug, Clone, PartialEq)]
pub struct MaybeTagged<T> {
    pub tagged: bool,
    pub inner: T,
}

impl<T> MaybeTagged<T> {
    pub fn new(tagged: bool, inner: T) -> Self {
        Self { tagged, inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> Deref for MaybeTagged<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for MaybeTagged<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: AsCborValue + TaggedCborSerializable + Clone> MaybeTagged<T> {
    pub fn to_cbor_value(&self) -> Result<Value> {
        let value = self.inner.clone().to_cbor_value()?;
        Ok(if self.tagged {
            Value::Tag(T::TAG, Box::new(value))
        } else {
            value
        })
    }

    /// Accepts the untagged form, or the form tagged with `T::TAG`. Any other tag is a different
    /// COSE structure and is rejected.
    pub fn from_cbor_value(value: Value, expected: &'static str) -> Result<Self> {
        match value {
            Value::Tag(tag, inner) if tag == T::TAG => Ok(Self::new(true, T::from_cbor_value(*inner)?)),
            Value::Tag(tag, _) => Err(Error::WrongCoseType {
                expected,
                found: format!("CBOR tag {tag}"),
            }),
            value => Ok(Self::new(false, T::from_cbor_value(value)?)),
        }
    }
}

impl Serialize for MaybeTagged<CoseSign1> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_cbor_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MaybeTagged<CoseSign1> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        Self::from_cbor_value(Value::deserialize(d)?, "COSE_Sign1").map_err(de::Error::custom)
    }
}

impl Serialize for MaybeTagged<CoseMac0> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_cbor_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MaybeTagged<CoseMac0> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        Self::from_cbor_value(Value::deserialize(d)?, "COSE_Mac0").map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor;
    use coset::{CoseSign1Builder, HeaderBuilder};
    use hex_literal::hex;

    #[test]
    fn tag_is_preserved() {
        let sign1 = CoseSign1Builder::new()
            .protected(HeaderBuilder::new().algorithm(iana::Algorithm::ES256).build())
            .signature(vec![0; 4])
            .build();
        let tagged = MaybeTagged::new(true, sign1.clone());
        let bytes = cbor::to_vec(&tagged).unwrap();
        assert_eq!(bytes, hex!("d28443a10126a0f64400000000"));
        let decoded: MaybeTagged<CoseSign1> = cbor::from_slice(&bytes).unwrap();
        assert!(decoded.tagged);

        let untagged = cbor::to_vec(&MaybeTagged::new(false, sign1)).unwrap();
        assert_eq!(untagged, hex!("8443a10126a0f64400000000"));
    }

    #[test]
    fn mac0_tag_is_not_a_sign1() {
        // 17(COSE_Mac0)
        let bytes = hex!("d18443a10105a0f64400000000");
        assert!(cbor::from_slice::<MaybeTagged<CoseSign1>>(&bytes).is_err());
        assert!(cbor::from_slice::<MaybeTagged<CoseMac0>>(&bytes).unwrap().tagged);
    }
}
