pub mod device_key;
pub mod device_signed;
pub mod helpers;
pub mod issuer_signed;
pub mod mso;
pub mod reader_auth;
pub mod session;
pub mod validity_info;
pub mod x509;

pub use device_key::cose_key::{EC2Curve, Error, EC2Y};
pub use device_key::{CoseKey, DeviceKeyInfo};
pub use device_signed::{DeviceAuth, DeviceAuthentication, DeviceSigned};
pub use issuer_signed::{IssuerSigned, IssuerSignedItem};
pub use mso::{DigestAlgorithm, DigestId, DigestIds, Mso};
pub use reader_auth::{ReaderAuth, ReaderAuthentication};
pub use session::{Handover, SessionData, SessionEstablishment, SessionTranscript};
pub use validity_info::ValidityInfo;
