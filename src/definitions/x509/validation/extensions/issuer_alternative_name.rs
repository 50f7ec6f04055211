use const_oid::AssociatedOid;
use const_oid::ObjectIdentifier;
use der::Decode;
use x509_cert::{
    ext::{
        pkix::{name::GeneralName, IssuerAltName},
        Extension,
    },
    Certificate,
};

use super::Error;
use super::ExtensionValidator;

/// The issuer must be reachable through an email address or a URI.
pub struct IssuerAlternativeNameValidator;

impl IssuerAlternativeNameValidator {
    fn check(ian: &IssuerAltName) -> Option<Error> {
        if contact_names(ian).next().is_none() {
            Some(format!("no rfc822 name or URI among: {:?}", ian.0))
        } else {
            None
        }
    }
}

impl ExtensionValidator for IssuerAlternativeNameValidator {
    fn oid(&self) -> ObjectIdentifier {
        IssuerAltName::OID
    }

    fn ext_name(&self) -> &'static str {
        "IssuerAlternativeName"
    }

    fn validate(&self, extension: &Extension) -> Vec<Error> {
        match IssuerAltName::from_der(extension.extn_value.as_bytes()) {
            Ok(ian) => Self::check(&ian).into_iter().collect(),
            Err(e) => vec![format!("failed to decode: {e}")],
        }
    }
}

fn contact_names(ian: &IssuerAltName) -> impl Iterator<Item = String> + '_ {
    ian.0.iter().filter_map(|gn| match gn {
        GeneralName::Rfc822Name(name) => Some(name.to_string()),
        GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
        _ => None,
    })
}

/// The rfc822 names and URIs of the IssuerAltName extension, in order of appearance.
pub(crate) fn issuer_alt_names(certificate: &Certificate) -> Vec<String> {
    certificate
        .tbs_certificate
        .extensions
        .iter()
        .flatten()
        .filter(|ext| ext.extn_id == IssuerAltName::OID)
        .filter_map(|ext| IssuerAltName::from_der(ext.extn_value.as_bytes()).ok())
        .flat_map(|ian| contact_names(&ian).collect::<Vec<_>>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::x509::test::{issue_end_entity, self_signed_root, CertificateProfile};

    #[rstest::rstest]
    #[case::email(vec![GeneralName::Rfc822Name("a@example.com".to_string().try_into().unwrap())], true)]
    #[case::uri(vec![GeneralName::UniformResourceIdentifier("https://example.com".to_string().try_into().unwrap())], true)]
    #[case::dns_only(vec![GeneralName::DnsName("example.com".to_string().try_into().unwrap())], false)]
    #[case::empty(vec![], false)]
    fn contact_required(#[case] names: Vec<GeneralName>, #[case] valid: bool) {
        assert_eq!(
            IssuerAlternativeNameValidator::check(&IssuerAltName(names)).is_none(),
            valid
        )
    }

    #[test]
    fn names_of_issued_certificates() {
        let (root, root_key) = self_signed_root("http://example.com/crl");
        let (reader, _) = issue_end_entity(&root, &root_key, CertificateProfile::Reader);
        let (foreign, _) =
            issue_end_entity(&root, &root_key, CertificateProfile::ReaderWithForeignAltName);
        assert_eq!(issuer_alt_names(&root), vec!["test@example.com".to_string()]);
        assert_eq!(issuer_alt_names(&reader), issuer_alt_names(&root));
        assert_eq!(issuer_alt_names(&foreign), vec!["other@example.com".to_string()]);
    }
}
