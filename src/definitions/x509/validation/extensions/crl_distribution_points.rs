use const_oid::AssociatedOid;
use der::Decode;
use x509_cert::ext::{
    pkix::{
        name::{DistributionPointName, GeneralName},
        CrlDistributionPoints,
    },
    Extension,
};

use super::{Error, ExtensionValidator};

/// Every distribution point must name its CRL by URI, without reasons or a CRL issuer.
pub struct CrlDistributionPointsValidator;

impl CrlDistributionPointsValidator {
    fn check(crl_distribution_points: CrlDistributionPoints) -> Vec<Error> {
        if crl_distribution_points.0.is_empty() {
            return vec!["expected one or more distribution points".into()];
        }

        crl_distribution_points
            .0
            .iter()
            .enumerate()
            .flat_map(|(index, point)| {
                let mut errors = vec![];
                if point.crl_issuer.is_some() {
                    errors.push(format!("point {index}: crl_issuer must not be set"));
                }
                if point.reasons.is_some() {
                    errors.push(format!("point {index}: reasons must not be set"));
                }
                let has_uri = matches!(
                    &point.distribution_point,
                    Some(DistributionPointName::FullName(names))
                        if names.iter().any(|gn| matches!(gn, GeneralName::UniformResourceIdentifier(_)))
                );
                if !has_uri {
                    errors.push(format!("point {index}: no URI full name"));
                }
                errors
            })
            .collect()
    }
}

impl ExtensionValidator for CrlDistributionPointsValidator {
    fn oid(&self) -> const_oid::ObjectIdentifier {
        CrlDistributionPoints::OID
    }

    fn ext_name(&self) -> &'static str {
        "CrlDistributionPoints"
    }

    fn validate(&self, extension: &Extension) -> Vec<Error> {
        match CrlDistributionPoints::from_der(extension.extn_value.as_bytes()) {
            Ok(crl_dps) => Self::check(crl_dps),
            Err(e) => vec![format!("failed to decode: {e}")],
        }
    }
}
