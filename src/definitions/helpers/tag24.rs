//! Support for embedded
//! [CBOR Data Items](https://www.ietf.org/rfc/rfc8949.html#name-encoded-cbor-data-item),
//! also known as a tagged data item with tag number 24.
use crate::cbor::{self, CborError, Value};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A wrapper for a struct that is to be encoded as a CBOR tagged item, with tag number 24.
///
/// If this struct is created through deserializing CBOR, then the original byte representation is
/// preserved for future serializing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag24<T> {
    inner: T,
    pub inner_bytes: Vec<u8>,
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Expected a CBOR byte string, received: '{0:?}'")]
    InvalidTag24(Box<Value>),
    #[error("Expected a CBOR tagged data item with tag number 24, received: '{0:?}'")]
    NotATag24(Value),
    #[error("Unable to encode value as CBOR: {0}")]
    UnableToEncode(CborError),
    #[error("Unable to decode bytes to inner type: {0}")]
    UnableToDecode(CborError),
}

impl<T> Tag24<T> {
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// The CBOR encoding of the tagged item itself, `#6.24(bstr .cbor T)`.
    pub fn to_tagged_bytes(&self) -> Result<Vec<u8>> {
        cbor::to_vec(&Value::Tag(24, Box::new(Value::Bytes(self.inner_bytes.clone()))))
            .map_err(Error::UnableToEncode)
    }
}

impl<T: Serialize + de::DeserializeOwned> Tag24<T> {
    pub fn new(inner: T) -> Result<Tag24<T>> {
        let inner_bytes = cbor::to_vec(&inner).map_err(Error::UnableToEncode)?;
        let inner = cbor::from_slice(&inner_bytes).map_err(Error::UnableToDecode)?;
        Ok(Self { inner, inner_bytes })
    }
}

impl<T: de::DeserializeOwned> Tag24<T> {
    /// Wraps bytes received from a peer, keeping them for re-encoding.
    pub fn from_bytes(inner_bytes: Vec<u8>) -> Result<Tag24<T>> {
        let inner = cbor::from_slice(&inner_bytes).map_err(Error::UnableToDecode)?;
        Ok(Self { inner, inner_bytes })
    }
}

impl<T: de::DeserializeOwned> TryFrom<Value> for Tag24<T> {
    type Error = Error;

    fn try_from(v: Value) -> Result<Tag24<T>> {
        match v {
            Value::Tag(24, inner_value) => match *inner_value {
                Value::Bytes(inner_bytes) => Tag24::from_bytes(inner_bytes),
                other => Err(Error::InvalidTag24(Box::new(other))),
            },
            _ => Err(Error::NotATag24(v)),
        }
    }
}

impl<T> From<Tag24<T>> for Value {
    fn from(Tag24 { inner_bytes, .. }: Tag24<T>) -> Value {
        Value::Tag(24, Box::new(Value::Bytes(inner_bytes)))
    }
}

impl<T> AsRef<T> for Tag24<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}

impl<T> Serialize for Tag24<T> {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        Value::Tag(24, Box::new(Value::Bytes(self.inner_bytes.clone()))).serialize(s)
    }
}

impl<'de, T: de::DeserializeOwned> Deserialize<'de> for Tag24<T> {
    fn deserialize<D>(d: D) -> std::result::Result<Tag24<T>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(d)?
            .try_into()
            .map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::Tag24;
    use crate::cbor::{self, Value};

    #[test]
    fn received_bytes_are_preserved() {
        // Non-canonical length encoding of "abc": a re-serialization would differ.
        let inner = vec![0x78, 0x03, b'a', b'b', b'c'];
        let tagged: Tag24<String> = Tag24::from_bytes(inner.clone()).unwrap();
        assert_eq!(tagged.as_ref(), "abc");

        let encoded = cbor::to_vec(&tagged).unwrap();
        let mut expected = vec![0xd8, 0x18, 0x45];
        expected.extend_from_slice(&inner);
        assert_eq!(encoded, expected);
        assert_eq!(tagged.to_tagged_bytes().unwrap(), expected);
    }

    #[test]
    fn wrong_tag_is_rejected() {
        let value = Value::Tag(25, Box::new(Value::Bytes(vec![0xa0])));
        assert!(Tag24::<Value>::try_from(value).is_err());
    }

    #[test]
    fn deserialize_through_cbor() {
        let bytes = [0xd8, 0x18, 0x41, 0xa0];
        let tagged: Tag24<Value> = cbor::from_slice(&bytes).unwrap();
        assert_eq!(tagged.inner_bytes, vec![0xa0]);
        assert_eq!(tagged.into_inner(), Value::Map(vec![]));
    }
}
