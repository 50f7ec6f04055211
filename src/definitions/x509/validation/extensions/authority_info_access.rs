use const_oid::{AssociatedOid, ObjectIdentifier};
use der::Decode;
use x509_cert::ext::{
    pkix::{name::GeneralName, AuthorityInfoAccessSyntax},
    Extension,
};

use super::{Error, ExtensionValidator};

const OCSP_ACCESS_METHOD: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1");

/// Reader certificates must point at an OCSP responder.
pub struct AuthorityInfoAccessValidator;

impl AuthorityInfoAccessValidator {
    fn check(aia: AuthorityInfoAccessSyntax) -> Option<Error> {
        let has_ocsp = aia.0.iter().any(|description| {
            description.access_method == OCSP_ACCESS_METHOD
                && matches!(
                    description.access_location,
                    GeneralName::UniformResourceIdentifier(_)
                )
        });
        if has_ocsp {
            None
        } else {
            Some("missing OCSP access description".into())
        }
    }
}

impl ExtensionValidator for AuthorityInfoAccessValidator {
    fn oid(&self) -> ObjectIdentifier {
        AuthorityInfoAccessSyntax::OID
    }

    fn ext_name(&self) -> &'static str {
        "AuthorityInfoAccess"
    }

    fn validate(&self, extension: &Extension) -> Vec<Error> {
        match AuthorityInfoAccessSyntax::from_der(extension.extn_value.as_bytes()) {
            Ok(aia) => Self::check(aia).into_iter().collect(),
            Err(e) => vec![format!("failed to decode: {e}")],
        }
    }
}
