//! Session security, COSE authentication and trust validation for ISO/IEC 18013-5 mobile
//! documents.
//!
//! A presentation starts with a key agreement between the ephemeral keys of the mdoc and the
//! reader. Together with the [SessionTranscript](definitions::SessionTranscript) it gives the
//! keys of the [SessionEncryption](presentation::SessionEncryption). Inside the session the
//! reader signs its request ([presentation::authentication::reader]), the mdoc authenticates
//! its response with its device key ([presentation::authentication::mdoc]) and the reader
//! checks the issuer signed data against its trusted issuer roots
//! ([presentation::authentication::mso]).
pub mod cbor;
pub mod cose;
pub mod definitions;
pub mod key_agreement;
pub mod presentation;
pub mod secure_area;
