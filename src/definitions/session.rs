//! Session establishment messages and the session transcript.
//!
//! The [SessionTranscript] is the value every signature, MAC and session key of a presentation is
//! bound to. Its first two elements are tag 24 wrapped byte strings which keep the bytes they
//! were received as, so encoding a transcript built from a peer's messages yields exactly the bytes
//! the peer used.
use crate::cbor::{self, CborError, Value};
use crate::definitions::device_key::CoseKey;
use crate::definitions::helpers::{tag24, ByteStr, Tag24};
use serde::{Deserialize, Serialize};

pub type EReaderKeyBytes = Tag24<CoseKey>;
pub type EDeviceKeyBytes = Tag24<CoseKey>;
/// The device engagement structure itself is opaque to this crate, apart from the device key.
pub type DeviceEngagementBytes = Tag24<Value>;
pub type SessionTranscriptBytes = Tag24<SessionTranscript>;

/// `SessionTranscript = [DeviceEngagementBytes / null, EReaderKeyBytes / null, Handover]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionTranscript(
    pub Option<DeviceEngagementBytes>,
    pub Option<EReaderKeyBytes>,
    pub Handover,
);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Handover {
    /// QR engagement, encoded as `null`.
    Qr,
    /// `[HandoverSelect, HandoverRequest / null]` NDEF messages.
    Nfc(ByteStr, Option<ByteStr>),
    /// Any other handover structure, carried as is.
    Other(Value),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to encode session transcript: {0}")]
    Encoding(#[from] CborError),
    #[error(transparent)]
    Tag24(#[from] tag24::Error),
    #[error("device engagement is absent from the session transcript")]
    MissingDeviceEngagement,
    #[error("device engagement does not carry a device key: {0}")]
    MissingDeviceKey(&'static str),
}

impl SessionTranscript {
    pub fn new(
        device_engagement_bytes: Option<DeviceEngagementBytes>,
        e_reader_key_bytes: Option<EReaderKeyBytes>,
        handover: Handover,
    ) -> Self {
        Self(device_engagement_bytes, e_reader_key_bytes, handover)
    }

    /// CBOR encoding of the transcript array.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(cbor::to_vec(self)?)
    }

    /// `SessionTranscriptBytes = #6.24(bstr .cbor SessionTranscript)`, the HKDF salt.
    pub fn to_tagged_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(Tag24::new(self.clone())?.to_tagged_bytes()?)
    }

    /// Extracts `EDeviceKey` from `DeviceEngagement = {0: version, 1: Security, ...}` where
    /// `Security = [cipherSuiteIdentifier, EDeviceKeyBytes]`.
    pub fn e_device_key(&self) -> Result<CoseKey, Error> {
        let engagement = self.0.as_ref().ok_or(Error::MissingDeviceEngagement)?;
        let Value::Map(entries) = engagement.as_ref() else {
            return Err(Error::MissingDeviceKey("device engagement is not a map"));
        };
        let security = entries
            .iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == 1))
            .map(|(_, v)| v)
            .ok_or(Error::MissingDeviceKey("no security element"))?;
        let Value::Array(security) = security else {
            return Err(Error::MissingDeviceKey("security element is not an array"));
        };
        let key_bytes = security
            .get(1)
            .cloned()
            .ok_or(Error::MissingDeviceKey("security element has no key"))?;
        let key: EDeviceKeyBytes = key_bytes.try_into()?;
        Ok(key.into_inner())
    }
}

impl From<Handover> for Value {
    fn from(h: Handover) -> Value {
        match h {
            Handover::Qr => Value::Null,
            Handover::Nfc(select, request) => Value::Array(vec![
                select.into(),
                request.map(Into::into).unwrap_or(Value::Null),
            ]),
            Handover::Other(v) => v,
        }
    }
}

impl TryFrom<Value> for Handover {
    type Error = std::convert::Infallible;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        Ok(match v {
            Value::Null => Handover::Qr,
            Value::Array(items) => match <[Value; 2]>::try_from(items) {
                Ok([Value::Bytes(select), Value::Bytes(request)]) => {
                    Handover::Nfc(select.into(), Some(request.into()))
                }
                Ok([Value::Bytes(select), Value::Null]) => Handover::Nfc(select.into(), None),
                Ok(pair) => Handover::Other(Value::Array(Vec::from(pair))),
                Err(items) => Handover::Other(Value::Array(items)),
            },
            other => Handover::Other(other),
        })
    }
}

/// First message from the reader, carrying its ephemeral key and the encrypted request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEstablishment {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub e_reader_key: Option<EReaderKeyBytes>,
    pub data: ByteStr,
}

/// Any later message in either direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionData {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<ByteStr>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<Status>,
}

impl SessionData {
    /// A payload without a status is a normal message, a status alone ends the session.
    pub fn is_termination(&self) -> bool {
        self.data.is_none() && self.status.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum Status {
    SessionEncryptionError,
    CborDecodingError,
    SessionTermination,
}

impl From<Status> for u64 {
    fn from(s: Status) -> u64 {
        match s {
            Status::SessionEncryptionError => 10,
            Status::CborDecodingError => 11,
            Status::SessionTermination => 20,
        }
    }
}

impl TryFrom<u64> for Status {
    type Error = String;

    fn try_from(n: u64) -> Result<Status, String> {
        match n {
            10 => Ok(Status::SessionEncryptionError),
            11 => Ok(Status::CborDecodingError),
            20 => Ok(Status::SessionTermination),
            _ => Err(format!("unknown session status code {n}")),
        }
    }
}
