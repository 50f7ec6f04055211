//! ReaderAuthentication, the structure a reader signs to authenticate an items request.
use crate::cbor::{self, CborError, Value};
use crate::cose::MaybeTagged;
use crate::definitions::{helpers::Tag24, session::SessionTranscript};
use coset::CoseSign1;
use serde::Serialize;

/// `ItemsRequestBytes = #6.24(bstr .cbor ItemsRequest)`, kept as received.
pub type ItemsRequestBytes = Tag24<Value>;

/// `ReaderAuth = COSE_Sign1` with a detached payload and the reader certificate chain.
pub type ReaderAuth = MaybeTagged<CoseSign1>;

/// `ReaderAuthentication = ["ReaderAuthentication", SessionTranscript, ItemsRequestBytes]`
#[derive(Clone, Debug, Serialize)]
pub struct ReaderAuthentication(&'static str, SessionTranscript, ItemsRequestBytes);

impl ReaderAuthentication {
    pub fn new(transcript: SessionTranscript, items_request: ItemsRequestBytes) -> Self {
        Self("ReaderAuthentication", transcript, items_request)
    }

    /// `ReaderAuthenticationBytes = #6.24(bstr .cbor ReaderAuthentication)`
    pub fn to_tagged_bytes(&self) -> Result<Vec<u8>, CborError> {
        let inner = cbor::to_vec(self)?;
        cbor::to_vec(&Value::Tag(24, Box::new(Value::Bytes(inner))))
    }
}
