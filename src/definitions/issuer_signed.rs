//! Issuer signed data elements and the issuer authentication over them.
use crate::cose::MaybeTagged;
use crate::definitions::{
    helpers::{ByteStr, Tag24},
    DigestId,
};
use crate::cbor::Value;
use coset::CoseSign1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSigned {
    #[serde(skip_serializing_if = "Option::is_none", rename = "nameSpaces", default)]
    pub namespaces: Option<IssuerNamespaces>,
    pub issuer_auth: IssuerAuth,
}

/// COSE_Sign1 with the MSO bytes as payload and the document signer chain under label 33.
pub type IssuerAuth = MaybeTagged<CoseSign1>;

pub type IssuerNamespaces = BTreeMap<String, Vec<IssuerSignedItemBytes>>;

/// Kept as received: the digests in the MSO are over these exact bytes.
pub type IssuerSignedItemBytes = Tag24<IssuerSignedItem>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSignedItem {
    #[serde(rename = "digestID")]
    pub digest_id: DigestId,
    pub random: ByteStr,
    pub element_identifier: String,
    pub element_value: Value,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cbor;

    #[test]
    fn item_bytes_survive_reencoding() {
        let item = IssuerSignedItem {
            digest_id: 0,
            random: vec![0].into(),
            element_identifier: "family_name".into(),
            element_value: Value::Text("Doe".into()),
        };
        let bytes = Tag24::new(item.clone()).unwrap();
        let encoded = cbor::to_vec(&bytes).unwrap();
        let decoded: IssuerSignedItemBytes = cbor::from_slice(&encoded).unwrap();
        assert_eq!(decoded.inner_bytes, bytes.inner_bytes);
        assert_eq!(decoded.as_ref(), &item);
    }
}
