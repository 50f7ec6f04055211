//! Elliptic curve Diffie-Hellman (ECKA-DH) over the NIST curves used by ISO/IEC 18013-5.
//!
//! The curve of the agreement is the curve declared by the remote public key; a local key on a
//! different curve is an error rather than a negotiation.
use crate::definitions::device_key::cose_key::{self, CoseKey, EC2Curve, EC2Y};
use elliptic_curve::sec1::ToEncodedPoint;
use elliptic_curve::{CurveArithmetic, PublicKey, SecretKey};
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroizing;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("local key is on {local} but the remote public key is on {remote}")]
    CurveMismatch { local: EC2Curve, remote: EC2Curve },
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("private key is unavailable: {0}")]
    KeyUnavailable(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A private key held in memory.
#[derive(Clone)]
pub enum EcPrivateKey {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
    P521(p521::SecretKey),
}

/// A validated public key on one of the supported curves.
#[derive(Clone, PartialEq, Eq)]
pub enum EcPublicKey {
    P256(p256::PublicKey),
    P384(p384::PublicKey),
    P521(p521::PublicKey),
}

/// The raw `Z` value of an agreement. Zeroized on drop.
pub struct SharedSecret {
    curve: EC2Curve,
    bytes: Zeroizing<Vec<u8>>,
}

impl SharedSecret {
    pub fn curve(&self) -> EC2Curve {
        self.curve
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("curve", &self.curve)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for EcPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcPrivateKey")
            .field("curve", &self.curve())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for EcPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EcPublicKey({}, {})", self.curve(), hex::encode(self.to_sec1_bytes()))
    }
}

impl EcPrivateKey {
    pub fn random(curve: EC2Curve) -> Self {
        match curve {
            EC2Curve::P256 => EcPrivateKey::P256(p256::SecretKey::random(&mut OsRng)),
            EC2Curve::P384 => EcPrivateKey::P384(p384::SecretKey::random(&mut OsRng)),
            EC2Curve::P521 => EcPrivateKey::P521(p521::SecretKey::random(&mut OsRng)),
        }
    }

    /// Imports a big-endian private scalar.
    pub fn from_slice(curve: EC2Curve, scalar: &[u8]) -> Result<Self> {
        let invalid = |e: elliptic_curve::Error| Error::KeyUnavailable(format!("invalid scalar: {e}"));
        Ok(match curve {
            EC2Curve::P256 => EcPrivateKey::P256(p256::SecretKey::from_slice(scalar).map_err(invalid)?),
            EC2Curve::P384 => EcPrivateKey::P384(p384::SecretKey::from_slice(scalar).map_err(invalid)?),
            EC2Curve::P521 => EcPrivateKey::P521(p521::SecretKey::from_slice(scalar).map_err(invalid)?),
        })
    }

    pub fn curve(&self) -> EC2Curve {
        match self {
            EcPrivateKey::P256(_) => EC2Curve::P256,
            EcPrivateKey::P384(_) => EC2Curve::P384,
            EcPrivateKey::P521(_) => EC2Curve::P521,
        }
    }

    pub fn public_key(&self) -> EcPublicKey {
        match self {
            EcPrivateKey::P256(k) => EcPublicKey::P256(k.public_key()),
            EcPrivateKey::P384(k) => EcPublicKey::P384(k.public_key()),
            EcPrivateKey::P521(k) => EcPublicKey::P521(k.public_key()),
        }
    }

    /// Computes `Z` with the remote public key.
    pub fn agree(&self, remote: &EcPublicKey) -> Result<SharedSecret> {
        agree(self, remote)
    }
}

impl EcPublicKey {
    pub fn curve(&self) -> EC2Curve {
        match self {
            EcPublicKey::P256(_) => EC2Curve::P256,
            EcPublicKey::P384(_) => EC2Curve::P384,
            EcPublicKey::P521(_) => EC2Curve::P521,
        }
    }

    /// Parses a SEC1 point (compressed or uncompressed) on `curve`.
    pub fn from_sec1_bytes(curve: EC2Curve, point: &[u8]) -> Result<Self> {
        let invalid = |e: elliptic_curve::Error| Error::InvalidPublicKey(format!("{curve} point: {e}"));
        Ok(match curve {
            EC2Curve::P256 => EcPublicKey::P256(p256::PublicKey::from_sec1_bytes(point).map_err(invalid)?),
            EC2Curve::P384 => EcPublicKey::P384(p384::PublicKey::from_sec1_bytes(point).map_err(invalid)?),
            EC2Curve::P521 => EcPublicKey::P521(p521::PublicKey::from_sec1_bytes(point).map_err(invalid)?),
        })
    }

    pub fn from_cose_key(key: &CoseKey) -> Result<Self> {
        let (curve, point) = key
            .to_sec1_bytes()
            .map_err(|e: cose_key::Error| Error::InvalidPublicKey(e.to_string()))?;
        Self::from_sec1_bytes(curve, &point)
    }

    /// Uncompressed SEC1 encoding.
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        match self {
            EcPublicKey::P256(k) => k.to_encoded_point(false).as_bytes().to_vec(),
            EcPublicKey::P384(k) => k.to_encoded_point(false).as_bytes().to_vec(),
            EcPublicKey::P521(k) => k.to_encoded_point(false).as_bytes().to_vec(),
        }
    }

    pub fn to_cose_key(&self) -> CoseKey {
        let crv = self.curve();
        let point = self.to_sec1_bytes();
        let (x, y) = point[1..].split_at(crv.field_size());
        CoseKey::EC2 {
            crv,
            x: x.to_vec(),
            y: EC2Y::Value(y.to_vec()),
        }
    }
}

impl TryFrom<&CoseKey> for EcPublicKey {
    type Error = Error;

    fn try_from(key: &CoseKey) -> Result<Self> {
        Self::from_cose_key(key)
    }
}

/// ECDH between a local private key and a remote public key on the same curve.
pub fn agree(local: &EcPrivateKey, remote: &EcPublicKey) -> Result<SharedSecret> {
    match (local, remote) {
        (EcPrivateKey::P256(sk), EcPublicKey::P256(pk)) => Ok(ecdh(EC2Curve::P256, sk, pk)),
        (EcPrivateKey::P384(sk), EcPublicKey::P384(pk)) => Ok(ecdh(EC2Curve::P384, sk, pk)),
        (EcPrivateKey::P521(sk), EcPublicKey::P521(pk)) => Ok(ecdh(EC2Curve::P521, sk, pk)),
        _ => Err(Error::CurveMismatch {
            local: local.curve(),
            remote: remote.curve(),
        }),
    }
}

fn ecdh<C>(curve: EC2Curve, secret: &SecretKey<C>, public: &PublicKey<C>) -> SharedSecret
where
    C: CurveArithmetic,
{
    let shared =
        elliptic_curve::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    SharedSecret {
        curve,
        bytes: Zeroizing::new(shared.raw_secret_bytes().to_vec()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hex_literal::hex;

    pub(crate) static DEVICE_EPHEMERAL_D: [u8; 32] =
        hex!("6ed542ad4783f0b18c833fadf2171273a35d969c581691ef704359cc7cf1e8c0");
    pub(crate) static READER_EPHEMERAL_D: [u8; 32] =
        hex!("de3b4b9e5f72dd9b58406ae3091434da48a6f9fd010d88fcb0958e2cebec947c");
    pub(crate) static DEVICE_STATIC_D: [u8; 32] =
        hex!("c9a7ec9a2a5e2b8a3b4c1d2e3f405162738495a6b7c8d9eafb0c1d2e3f405161");

    #[test]
    fn both_sides_agree_on_reference_secret() {
        let device = EcPrivateKey::from_slice(EC2Curve::P256, &DEVICE_EPHEMERAL_D).unwrap();
        let reader = EcPrivateKey::from_slice(EC2Curve::P256, &READER_EPHEMERAL_D).unwrap();
        let z1 = device.agree(&reader.public_key()).unwrap();
        let z2 = reader.agree(&device.public_key()).unwrap();
        assert_eq!(z1.as_bytes(), z2.as_bytes());
        assert_eq!(
            z1.as_bytes(),
            hex!("78d98a86fbbb82895874bfafcc161ba69f9b77662172c74b3b0d4643276cf991")
        );
    }

    #[test]
    fn p384_and_p521_agreement() {
        for curve in [EC2Curve::P384, EC2Curve::P521] {
            let a = EcPrivateKey::random(curve);
            let b = EcPrivateKey::random(curve);
            let z = a.agree(&b.public_key()).unwrap();
            assert_eq!(z.as_bytes().len(), curve.field_size());
            assert_eq!(z.as_bytes(), b.agree(&a.public_key()).unwrap().as_bytes());
        }
    }

    #[test]
    fn curve_mismatch() {
        let a = EcPrivateKey::random(EC2Curve::P256);
        let b = EcPrivateKey::random(EC2Curve::P384);
        assert_eq!(
            a.agree(&b.public_key()).unwrap_err(),
            Error::CurveMismatch {
                local: EC2Curve::P256,
                remote: EC2Curve::P384
            }
        );
    }

    #[test]
    fn point_not_on_curve() {
        let mut point = EcPrivateKey::random(EC2Curve::P256).public_key().to_sec1_bytes();
        point[64] ^= 0x01;
        assert!(matches!(
            EcPublicKey::from_sec1_bytes(EC2Curve::P256, &point),
            Err(Error::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn cose_key_conversion() {
        let key = EcPrivateKey::random(EC2Curve::P521).public_key();
        let cose = key.to_cose_key();
        assert_eq!(EcPublicKey::from_cose_key(&cose).unwrap(), key);
    }
}
