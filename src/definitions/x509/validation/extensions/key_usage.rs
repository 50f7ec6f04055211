use const_oid::AssociatedOid;
use der::{flagset::FlagSet, Decode};
use x509_cert::ext::{
    pkix::{KeyUsage, KeyUsages},
    Extension,
};

use super::{Error, ExtensionValidator};

/// KeyUsage validation: every required usage must be asserted, others may be present.
pub struct KeyUsageValidator {
    required: FlagSet<KeyUsages>,
}

impl KeyUsageValidator {
    pub fn digital_signature() -> Self {
        Self {
            required: KeyUsages::DigitalSignature.into(),
        }
    }

    fn check(&self, ku: KeyUsage) -> Option<Error> {
        if !ku.0.contains(self.required) {
            Some(format!(
                "expected {:?}, found {:?}",
                self.required.into_iter().collect::<Vec<KeyUsages>>(),
                ku.0.into_iter().collect::<Vec<KeyUsages>>()
            ))
        } else {
            None
        }
    }
}

impl ExtensionValidator for KeyUsageValidator {
    fn oid(&self) -> const_oid::ObjectIdentifier {
        KeyUsage::OID
    }

    fn ext_name(&self) -> &'static str {
        "KeyUsage"
    }

    fn validate(&self, extension: &Extension) -> Vec<Error> {
        let bytes = extension.extn_value.as_bytes();
        let key_usage = KeyUsage::from_der(bytes);

        if !extension.critical {
            tracing::warn!("expected KeyUsage extension to be critical",)
        }

        match key_usage {
            Ok(ku) => self.check(ku).into_iter().collect(),
            Err(e) => vec![format!("failed to decode: {e}")],
        }
    }
}

#[cfg(test)]
#[rstest::rstest]
#[case::exact(KeyUsage(KeyUsages::DigitalSignature.into()), true)]
#[case::extra(KeyUsage(KeyUsages::DigitalSignature | KeyUsages::NonRepudiation), true)]
#[case::other(KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign), false)]
#[case::missing(KeyUsage(FlagSet::default()), false)]
fn test(#[case] ku: KeyUsage, #[case] valid: bool) {
    let outcome = KeyUsageValidator::digital_signature().check(ku);
    assert_eq!(outcome.is_none(), valid)
}
