use crate::cbor::Value;
use coset::iana::Algorithm;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// An implementation of RFC-8152 [COSE_Key](https://datatracker.ietf.org/doc/html/rfc8152#section-13)
/// restricted to the requirements of ISO/IEC 18013-5:2021.
///
/// EC2 keys are emitted with their parameters in the order `kty, crv, x, y`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Value", into = "Value")]
pub enum CoseKey {
    EC2 { crv: EC2Curve, x: Vec<u8>, y: EC2Y },
    OKP { crv: OKPCurve, x: Vec<u8> },
}

/// The sign bit or value of the y-coordinate for the EC point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EC2Y {
    Value(Vec<u8>),
    SignBit(bool),
}

/// The RFC-8152 identifier of the curve, for EC2 key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum EC2Curve {
    #[strum(serialize = "P-256")]
    #[serde(rename = "P-256")]
    P256,
    #[strum(serialize = "P-384")]
    #[serde(rename = "P-384")]
    P384,
    #[strum(serialize = "P-521")]
    #[serde(rename = "P-521")]
    P521,
}

impl EC2Curve {
    /// Length in bytes of a field element (and of each signature half).
    pub fn field_size(&self) -> usize {
        match self {
            EC2Curve::P256 => 32,
            EC2Curve::P384 => 48,
            EC2Curve::P521 => 66,
        }
    }

    pub fn signature_algorithm(&self) -> Algorithm {
        match self {
            EC2Curve::P256 => Algorithm::ES256,
            EC2Curve::P384 => Algorithm::ES384,
            EC2Curve::P521 => Algorithm::ES512,
        }
    }

    fn cose_id(&self) -> i64 {
        match self {
            EC2Curve::P256 => 1,
            EC2Curve::P384 => 2,
            EC2Curve::P521 => 3,
        }
    }

    fn from_cose_id(id: i128) -> Result<Self, Error> {
        match id {
            1 => Ok(EC2Curve::P256),
            2 => Ok(EC2Curve::P384),
            3 => Ok(EC2Curve::P521),
            _ => Err(Error::UnsupportedCurve),
        }
    }
}

/// The RFC-8152 identifier of the curve, for OKP key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OKPCurve {
    X25519,
    X448,
    Ed25519,
    Ed448,
}

/// Errors that can occur when deserialising a COSE_Key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("COSE_Key of kty 'EC2' missing x coordinate")]
    EC2MissingX,
    #[error("COSE_Key of kty 'EC2' missing y coordinate")]
    EC2MissingY,
    #[error("Expected to parse a CBOR bool or bstr for y-coordinate, received: '{0:?}'")]
    InvalidTypeY(Value),
    #[error("Expected to parse a CBOR map, received: '{0:?}'")]
    NotAMap(Value),
    #[error("This implementation of COSE_Key only supports P-256, P-384, P-521, X25519, X448, Ed25519 and Ed448 curves")]
    UnsupportedCurve,
    #[error("This implementation of COSE_Key only supports EC2 and OKP keys")]
    UnsupportedKeyType,
    #[error("Could not reconstruct coordinates from the provided COSE_Key")]
    InvalidCoseKey,
    #[error("Expected an uncompressed SEC1 point of {expected} bytes, received {actual}")]
    InvalidSec1Point { expected: usize, actual: usize },
}

impl CoseKey {
    pub fn signature_algorithm(&self) -> Option<Algorithm> {
        match self {
            CoseKey::EC2 { crv, .. } => Some(crv.signature_algorithm()),
            CoseKey::OKP {
                crv: OKPCurve::Ed25519 | OKPCurve::Ed448,
                ..
            } => Some(Algorithm::EdDSA),
            _ => None,
        }
    }

    /// Builds an EC2 key from an uncompressed SEC1 point (`0x04 || x || y`).
    pub fn from_sec1_uncompressed(crv: EC2Curve, point: &[u8]) -> Result<Self, Error> {
        let size = crv.field_size();
        let expected = 1 + 2 * size;
        if point.len() != expected || point[0] != 0x04 {
            return Err(Error::InvalidSec1Point {
                expected,
                actual: point.len(),
            });
        }
        Ok(CoseKey::EC2 {
            crv,
            x: point[1..1 + size].to_vec(),
            y: EC2Y::Value(point[1 + size..].to_vec()),
        })
    }

    /// SEC1 encoding of the point; compressed when only the sign bit of `y` is known.
    pub fn to_sec1_bytes(&self) -> Result<(EC2Curve, Vec<u8>), Error> {
        match self {
            CoseKey::EC2 { crv, x, y } => {
                let mut point = Vec::with_capacity(1 + 2 * crv.field_size());
                match y {
                    EC2Y::Value(y) => {
                        point.push(0x04);
                        point.extend_from_slice(x);
                        point.extend_from_slice(y);
                    }
                    EC2Y::SignBit(odd) => {
                        point.push(if *odd { 0x03 } else { 0x02 });
                        point.extend_from_slice(x);
                    }
                }
                Ok((*crv, point))
            }
            CoseKey::OKP { .. } => Err(Error::UnsupportedKeyType),
        }
    }
}

fn int(i: i64) -> Value {
    Value::Integer(i.into())
}

impl From<CoseKey> for Value {
    fn from(key: CoseKey) -> Value {
        let entries = match key {
            CoseKey::EC2 { crv, x, y } => vec![
                // kty: 1, EC2: 2
                (int(1), int(2)),
                (int(-1), int(crv.cose_id())),
                (int(-2), Value::Bytes(x)),
                (
                    int(-3),
                    match y {
                        EC2Y::Value(v) => Value::Bytes(v),
                        EC2Y::SignBit(b) => Value::Bool(b),
                    },
                ),
            ],
            CoseKey::OKP { crv, x } => vec![
                // kty: 1, OKP: 1
                (int(1), int(1)),
                (
                    int(-1),
                    int(match crv {
                        OKPCurve::X25519 => 4,
                        OKPCurve::X448 => 5,
                        OKPCurve::Ed25519 => 6,
                        OKPCurve::Ed448 => 7,
                    }),
                ),
                (int(-2), Value::Bytes(x)),
            ],
        };
        Value::Map(entries)
    }
}

impl TryFrom<Value> for CoseKey {
    type Error = Error;

    fn try_from(v: Value) -> Result<Self, Error> {
        let Value::Map(mut map) = v else {
            return Err(Error::NotAMap(v));
        };
        let mut take = |label: i128| {
            map.iter()
                .position(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == label))
                .map(|idx| map.remove(idx).1)
        };
        let kty = take(1);
        let crv = take(-1);
        let x = take(-2);
        match (kty, crv) {
            (Some(Value::Integer(kty)), Some(Value::Integer(crv))) if i128::from(kty) == 2 => {
                let crv = EC2Curve::from_cose_id(crv.into())?;
                let x = match x {
                    Some(Value::Bytes(x)) => x,
                    Some(_) => return Err(Error::InvalidCoseKey),
                    None => return Err(Error::EC2MissingX),
                };
                let y = match take(-3).ok_or(Error::EC2MissingY)? {
                    Value::Bytes(v) => EC2Y::Value(v),
                    Value::Bool(b) => EC2Y::SignBit(b),
                    other => return Err(Error::InvalidTypeY(other)),
                };
                Ok(Self::EC2 { crv, x, y })
            }
            (Some(Value::Integer(kty)), Some(Value::Integer(crv))) if i128::from(kty) == 1 => {
                let crv = match i128::from(crv) {
                    4 => OKPCurve::X25519,
                    5 => OKPCurve::X448,
                    6 => OKPCurve::Ed25519,
                    7 => OKPCurve::Ed448,
                    _ => return Err(Error::UnsupportedCurve),
                };
                match x {
                    Some(Value::Bytes(x)) => Ok(Self::OKP { crv, x }),
                    _ => Err(Error::InvalidCoseKey),
                }
            }
            _ => Err(Error::UnsupportedKeyType),
        }
    }
}
