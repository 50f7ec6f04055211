use const_oid::{AssociatedOid, ObjectIdentifier};
use der::Decode;
use sha1::{Digest, Sha1};
use x509_cert::{
    ext::{pkix::SubjectKeyIdentifier, Extension},
    Certificate,
};

use super::Error;
use super::ExtensionValidator;

/// The key identifier must be the SHA-1 of the subject public key bits.
pub struct SubjectKeyIdentifierValidator {
    subject_public_key_bitstring_raw_bytes: Vec<u8>,
}

impl SubjectKeyIdentifierValidator {
    pub fn from_certificate(certificate: &Certificate) -> Self {
        Self {
            subject_public_key_bitstring_raw_bytes: certificate
                .tbs_certificate
                .subject_public_key_info
                .subject_public_key
                .raw_bytes()
                .to_owned(),
        }
    }

    fn check(&self, ski: SubjectKeyIdentifier) -> Option<Error> {
        let digest = Sha1::digest(&self.subject_public_key_bitstring_raw_bytes);

        if digest.as_slice() != ski.0.as_bytes() {
            Some("public key digest did not match the expected value".into())
        } else {
            None
        }
    }
}

impl ExtensionValidator for SubjectKeyIdentifierValidator {
    fn oid(&self) -> ObjectIdentifier {
        SubjectKeyIdentifier::OID
    }

    fn ext_name(&self) -> &'static str {
        "SubjectKeyIdentifier"
    }

    fn validate(&self, extension: &Extension) -> Vec<Error> {
        match SubjectKeyIdentifier::from_der(extension.extn_value.as_bytes()) {
            Ok(ski) => self.check(ski).into_iter().collect(),
            Err(e) => vec![format!("failed to decode: {e}")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::x509::test::self_signed_root;

    fn ski_extension(certificate: &Certificate) -> &Extension {
        certificate
            .tbs_certificate
            .extensions
            .iter()
            .flatten()
            .find(|ext| ext.extn_id == SubjectKeyIdentifier::OID)
            .unwrap()
    }

    #[test]
    fn matching_identifier() {
        let (root, _) = self_signed_root("http://example.com/crl");
        let skiv = SubjectKeyIdentifierValidator::from_certificate(&root);
        assert!(skiv.validate(ski_extension(&root)).is_empty());
    }

    #[test]
    fn identifier_of_another_key() {
        let (root, _) = self_signed_root("http://example.com/crl");
        let (other, _) = self_signed_root("http://example.com/crl");
        let skiv = SubjectKeyIdentifierValidator::from_certificate(&root);
        assert_eq!(skiv.validate(ski_extension(&other)).len(), 1);
    }
}
