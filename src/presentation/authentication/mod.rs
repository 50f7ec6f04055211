//! The authentication protocols of a presentation: device, reader and issuer.
pub mod mdoc;
pub mod mso;
pub mod reader;

pub use mdoc::{verify_device_auth, DeviceAuthMethod, MdocAuthentication};
pub use mso::{validate_digests, validate_mso, DigestReport, MsoValidationError};
pub use reader::{MdocReaderAuthentication, ReaderAuthOutcome};
