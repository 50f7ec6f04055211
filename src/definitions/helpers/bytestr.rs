use crate::cbor::Value as CborValue;
use serde::{Deserialize, Serialize};

/// A CBOR byte string (major type 2), as opposed to an array of integers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "CborValue", into = "CborValue")]
pub struct ByteStr(Vec<u8>);

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Expected to parse a CBOR byte string, received: '{0:?}'")]
    NotAByteString(CborValue),
}

impl ByteStr {
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for ByteStr {
    fn from(bytes: Vec<u8>) -> ByteStr {
        ByteStr(bytes)
    }
}

impl From<ByteStr> for Vec<u8> {
    fn from(ByteStr(bytes): ByteStr) -> Vec<u8> {
        bytes
    }
}

impl AsRef<[u8]> for ByteStr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<ByteStr> for CborValue {
    fn from(ByteStr(bytes): ByteStr) -> CborValue {
        CborValue::Bytes(bytes)
    }
}

impl TryFrom<CborValue> for ByteStr {
    type Error = Error;

    fn try_from(v: CborValue) -> Result<ByteStr> {
        if let CborValue::Bytes(bytes) = v {
            Ok(ByteStr(bytes))
        } else {
            Err(Error::NotAByteString(v))
        }
    }
}

#[cfg(test)]
mod test {
    use super::ByteStr;
    use crate::cbor;

    #[test]
    fn encodes_as_major_type_two() {
        let bytes = ByteStr::from(vec![1, 2, 3]);
        assert_eq!(cbor::to_vec(&bytes).unwrap(), vec![0x43, 1, 2, 3]);
    }

    #[test]
    fn array_is_not_a_byte_string() {
        assert!(cbor::from_slice::<ByteStr>(&[0x83, 1, 2, 3]).is_err());
    }
}
