use const_oid::AssociatedOid;
use const_oid::ObjectIdentifier;
use der::Decode;
use x509_cert::ext::{pkix::ExtendedKeyUsage, Extension};

use super::Error;
use super::ExtensionValidator;

/// ExtendedKeyUsage validation: the expected purpose must be among the listed ones.
pub struct ExtendedKeyUsageValidator {
    pub expected_oid: ObjectIdentifier,
}

impl ExtendedKeyUsageValidator {
    fn check(&self, eku: ExtendedKeyUsage) -> Option<Error> {
        if eku.0.contains(&self.expected_oid) {
            None
        } else {
            Some(format!(
                "expected '{}', found '{:?}'",
                self.expected_oid, eku.0
            ))
        }
    }
}

impl ExtensionValidator for ExtendedKeyUsageValidator {
    fn oid(&self) -> const_oid::ObjectIdentifier {
        ExtendedKeyUsage::OID
    }

    fn ext_name(&self) -> &'static str {
        "ExtendedKeyUsage"
    }

    fn validate(&self, extension: &Extension) -> Vec<Error> {
        match ExtendedKeyUsage::from_der(extension.extn_value.as_bytes()) {
            Ok(eku) => self.check(eku).into_iter().collect(),
            Err(e) => vec![format!("failed to decode: {e}")],
        }
    }
}

pub const fn document_signer_extended_key_usage_oid() -> ObjectIdentifier {
    ObjectIdentifier::new_unwrap("1.0.18013.5.1.2")
}

pub const fn mdoc_reader_extended_key_usage_oid() -> ObjectIdentifier {
    ObjectIdentifier::new_unwrap("1.0.18013.5.1.6")
}

#[cfg(test)]
#[rstest::rstest]
#[case::ok(ExtendedKeyUsage(vec![mdoc_reader_extended_key_usage_oid()]), true)]
#[case::wrong(ExtendedKeyUsage(vec![document_signer_extended_key_usage_oid()]), false)]
#[case::missing(ExtendedKeyUsage(vec![]), false)]
#[case::among_others(ExtendedKeyUsage(vec![ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.2"), mdoc_reader_extended_key_usage_oid()]), true)]
fn test(#[case] eku: ExtendedKeyUsage, #[case] valid: bool) {
    let outcome = ExtendedKeyUsageValidator {
        expected_oid: mdoc_reader_extended_key_usage_oid(),
    }
    .check(eku);
    assert_eq!(outcome.is_none(), valid)
}
