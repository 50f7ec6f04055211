//! Device signed data and the DeviceAuthentication structure it is bound to.
//!
//! Only the COSE envelope ([DeviceAuth]) travels on the wire; the verifier rebuilds
//! [DeviceAuthentication] from its own session transcript.
use crate::cbor::{self, CborError, Value};
use crate::cose::MaybeTagged;
use crate::definitions::{helpers::Tag24, session::SessionTranscript};
use coset::{CoseMac0, CoseSign1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSigned {
    #[serde(rename = "nameSpaces")]
    pub namespaces: DeviceNamespacesBytes,
    pub device_auth: DeviceAuth,
}

pub type DeviceNamespacesBytes = Tag24<DeviceNamespaces>;
pub type DeviceNamespaces = BTreeMap<String, DeviceSignedItems>;
pub type DeviceSignedItems = BTreeMap<String, Value>;

/// `DeviceAuth = {"deviceSignature": COSE_Sign1} / {"deviceMac": COSE_Mac0}`
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceAuth {
    DeviceSignature(MaybeTagged<CoseSign1>),
    DeviceMac(MaybeTagged<CoseMac0>),
}

/// `DeviceAuthentication = ["DeviceAuthentication", SessionTranscript, DocType, DeviceNameSpacesBytes]`
#[derive(Clone, Debug, Serialize)]
pub struct DeviceAuthentication(
    &'static str,
    SessionTranscript,
    String,
    DeviceNamespacesBytes,
);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to encode DeviceAuthentication: {0}")]
    UnableToEncode(#[from] CborError),
    #[error(transparent)]
    Tag24(#[from] crate::definitions::helpers::tag24::Error),
}

impl DeviceAuthentication {
    pub fn new(
        transcript: SessionTranscript,
        doc_type: String,
        namespaces_bytes: DeviceNamespacesBytes,
    ) -> Self {
        Self(
            "DeviceAuthentication",
            transcript,
            doc_type,
            namespaces_bytes,
        )
    }

    /// `DeviceAuthenticationBytes = #6.24(bstr .cbor DeviceAuthentication)`, the detached
    /// payload of the device signature or MAC.
    pub fn to_tagged_bytes(&self) -> Result<Vec<u8>, Error> {
        let inner = cbor::to_vec(self)?;
        Ok(cbor::to_vec(&Value::Tag(24, Box::new(Value::Bytes(inner))))?)
    }
}

/// Device namespaces as received, or the empty map when the device signs no elements.
pub fn device_namespaces_bytes(raw: Option<Vec<u8>>) -> Result<DeviceNamespacesBytes, Error> {
    Ok(match raw {
        Some(bytes) => Tag24::from_bytes(bytes)?,
        None => Tag24::new(DeviceNamespaces::new())?,
    })
}
