//! Securing a presentation: the encrypted session and the authentication of the device, the
//! reader and the issuer.
pub mod authentication;
pub mod session_encryption;

pub use session_encryption::{Role, SessionEncryption};
