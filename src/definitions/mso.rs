//! The mobile security object, the issuer-signed digest table of a document.
use crate::cbor::{self, CborError, Value};
use crate::definitions::{helpers::ByteStr, DeviceKeyInfo, ValidityInfo};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::collections::BTreeMap;
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};

pub type DigestId = u64;
pub type DigestIds = BTreeMap<DigestId, ByteStr>;

/// `MobileSecurityObject`.
///
/// The digest algorithm is kept as the text the issuer wrote so an MSO with an unsupported
/// algorithm can still be decoded and reported on, see [Mso::digest_algorithm].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mso {
    pub version: String,
    #[serde(rename = "digestAlgorithm")]
    pub digest_algorithm_name: String,
    pub value_digests: BTreeMap<String, DigestIds>,
    pub device_key_info: DeviceKeyInfo,
    pub doc_type: String,
    pub validity_info: ValidityInfo,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Deserialize, Serialize, Display, EnumString, AsRefStr)]
pub enum DigestAlgorithm {
    #[serde(rename = "SHA-256")]
    #[strum(serialize = "SHA-256")]
    SHA256,
    #[serde(rename = "SHA-384")]
    #[strum(serialize = "SHA-384")]
    SHA384,
    #[serde(rename = "SHA-512")]
    #[strum(serialize = "SHA-512")]
    SHA512,
}

impl DigestAlgorithm {
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::SHA256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::SHA384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::SHA512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// `MobileSecurityObjectBytes = #6.24(bstr .cbor MobileSecurityObject)`, the payload of the
/// issuer signature.
pub type MobileSecurityObjectBytes = crate::definitions::helpers::Tag24<Mso>;

impl Mso {
    /// The declared digest algorithm, or its name when it is not one of SHA-256/384/512.
    pub fn digest_algorithm(&self) -> Result<DigestAlgorithm, String> {
        DigestAlgorithm::from_str(&self.digest_algorithm_name)
            .map_err(|_| self.digest_algorithm_name.clone())
    }

    /// Decodes the payload of an issuer signature: a tag 24 byte string wrapping the MSO.
    pub fn from_payload(payload: &[u8]) -> Result<Self, CborError> {
        match cbor::from_slice::<Value>(payload)? {
            Value::Tag(24, inner) => match *inner {
                Value::Bytes(bytes) => cbor::from_slice(&bytes),
                _ => Err(CborError::UnexpectedItem("tag 24 content", "byte string")),
            },
            _ => Err(CborError::UnexpectedItem("MSO payload", "tag 24")),
        }
    }
}
