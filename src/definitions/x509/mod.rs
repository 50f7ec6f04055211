//! X.509 certificate chains as carried in COSE headers, and their validation against a set of
//! root certificates.
pub mod revocation;
pub mod util;
pub mod validation;
pub mod x5chain;

pub use util::{certificate_info, CertificateInfo};
pub use validation::{
    is_mdoc_x5c_valid, CertificateUsage, TrustDecision, ValidationOptions, NOT_MATCHED_WITH_ROOTS,
};
pub use x5chain::{Builder, CertificateWithDer, X5Chain};
