//! COSE public keys and signature verification
//!
//! A credential public key is modelled as one variant per supported COSE
//! algorithm, each carrying exactly the key material that algorithm needs.
//! The algorithm is always read from the stored key, never negotiated again
//! at assertion time.

use ciborium::value::{Integer, Value};
use ring::signature::{
    RsaPublicKeyComponents, UnparsedPublicKey, ECDSA_P256_SHA256_ASN1, ED25519,
    RSA_PKCS1_2048_8192_SHA256,
};

use super::errors::CeremonyError;

// COSE key labels
const LABEL_KTY: i32 = 1;
const LABEL_ALG: i32 = 3;
const LABEL_CRV: i32 = -1;
const LABEL_X: i32 = -2;
const LABEL_Y: i32 = -3;
const LABEL_RSA_N: i32 = -1;
const LABEL_RSA_E: i32 = -2;

// COSE key types
const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

// COSE curves
const CRV_P256: i64 = 1;
const CRV_ED25519: i64 = 6;

/// Signature algorithms accepted for passkeys, keyed by COSE algorithm id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoseAlgorithm {
    /// ECDSA P-256 with SHA-256
    Es256,
    /// Ed25519
    EdDsa,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    Rs256,
}

impl CoseAlgorithm {
    /// All supported algorithms in order of preference
    pub const SUPPORTED: [CoseAlgorithm; 3] = [Self::Es256, Self::EdDsa, Self::Rs256];

    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::EdDsa => -8,
            Self::Rs256 => -257,
        }
    }

    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            -7 => Some(Self::Es256),
            -8 => Some(Self::EdDsa),
            -257 => Some(Self::Rs256),
            _ => None,
        }
    }
}

/// A decoded credential public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CosePublicKey {
    Es256 { x: Vec<u8>, y: Vec<u8> },
    EdDsa { x: Vec<u8> },
    Rs256 { n: Vec<u8>, e: Vec<u8> },
}

impl CosePublicKey {
    /// Decode a `COSE_Key` from its CBOR encoding
    ///
    /// # Errors
    ///
    /// - `MalformedResponse` if the bytes are not a COSE key map or a
    ///   coordinate is missing or has the wrong size
    /// - `UnsupportedAlgorithm` if the declared algorithm is not ES256, EdDSA or RS256
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CeremonyError> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| CeremonyError::malformed(format!("Invalid COSE key: {e}")))?;
        Self::from_value(&value)
    }

    /// Decode a `COSE_Key` from an already parsed CBOR value
    ///
    /// # Errors
    ///
    /// Same as [`CosePublicKey::from_cbor`].
    pub fn from_value(value: &Value) -> Result<Self, CeremonyError> {
        let map = value
            .as_map()
            .ok_or_else(|| CeremonyError::malformed("COSE key is not a map"))?;

        let alg_id = int_field(map, LABEL_ALG)
            .ok_or_else(|| CeremonyError::malformed("COSE key has no algorithm"))?;
        let algorithm =
            CoseAlgorithm::from_id(alg_id).ok_or(CeremonyError::UnsupportedAlgorithm(alg_id))?;
        let kty = int_field(map, LABEL_KTY)
            .ok_or_else(|| CeremonyError::malformed("COSE key has no key type"))?;

        match algorithm {
            CoseAlgorithm::Es256 => {
                expect_kty(kty, KTY_EC2)?;
                expect_curve(map, CRV_P256)?;
                let x = sized_bytes_field(map, LABEL_X, 32, "x")?;
                let y = sized_bytes_field(map, LABEL_Y, 32, "y")?;
                Ok(Self::Es256 { x, y })
            }
            CoseAlgorithm::EdDsa => {
                expect_kty(kty, KTY_OKP)?;
                expect_curve(map, CRV_ED25519)?;
                let x = sized_bytes_field(map, LABEL_X, 32, "x")?;
                Ok(Self::EdDsa { x })
            }
            CoseAlgorithm::Rs256 => {
                expect_kty(kty, KTY_RSA)?;
                let n = bytes_field(map, LABEL_RSA_N)
                    .ok_or_else(|| CeremonyError::malformed("RSA key has no modulus"))?;
                let e = bytes_field(map, LABEL_RSA_E)
                    .ok_or_else(|| CeremonyError::malformed("RSA key has no exponent"))?;
                Ok(Self::Rs256 {
                    n: strip_leading_zeros(n),
                    e: strip_leading_zeros(e),
                })
            }
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            Self::Es256 { .. } => CoseAlgorithm::Es256,
            Self::EdDsa { .. } => CoseAlgorithm::EdDsa,
            Self::Rs256 { .. } => CoseAlgorithm::Rs256,
        }
    }

    /// Verify `signature` over `message` with this key
    ///
    /// # Errors
    ///
    /// Returns `SignatureInvalid` if the signature does not verify.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CeremonyError> {
        let result = match self {
            Self::Es256 { x, y } => {
                // Uncompressed SEC1 point: 0x04 || x || y
                let mut point = Vec::with_capacity(65);
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, &point).verify(message, signature)
            }
            Self::EdDsa { x } => UnparsedPublicKey::new(&ED25519, x).verify(message, signature),
            Self::Rs256 { n, e } => RsaPublicKeyComponents { n, e }.verify(
                &RSA_PKCS1_2048_8192_SHA256,
                message,
                signature,
            ),
        };
        result.map_err(|_| CeremonyError::SignatureInvalid)
    }

    /// Encode this key as a CBOR `COSE_Key`
    #[must_use]
    pub fn to_cbor(&self) -> Vec<u8> {
        let alg = Value::Integer(Integer::from(self.algorithm().id()));
        let label = |l: i32| Value::Integer(l.into());
        let map = match self {
            Self::Es256 { x, y } => vec![
                (label(LABEL_KTY), Value::Integer(KTY_EC2.into())),
                (label(LABEL_ALG), alg),
                (label(LABEL_CRV), Value::Integer(CRV_P256.into())),
                (label(LABEL_X), Value::Bytes(x.clone())),
                (label(LABEL_Y), Value::Bytes(y.clone())),
            ],
            Self::EdDsa { x } => vec![
                (label(LABEL_KTY), Value::Integer(KTY_OKP.into())),
                (label(LABEL_ALG), alg),
                (label(LABEL_CRV), Value::Integer(CRV_ED25519.into())),
                (label(LABEL_X), Value::Bytes(x.clone())),
            ],
            Self::Rs256 { n, e } => vec![
                (label(LABEL_KTY), Value::Integer(KTY_RSA.into())),
                (label(LABEL_ALG), alg),
                (label(LABEL_RSA_N), Value::Bytes(n.clone())),
                (label(LABEL_RSA_E), Value::Bytes(e.clone())),
            ],
        };
        let mut out = Vec::new();
        // Writing into a Vec cannot fail
        let _ = ciborium::ser::into_writer(&Value::Map(map), &mut out);
        out
    }
}

fn field(map: &[(Value, Value)], label: i32) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| k.as_integer() == Some(label.into()))
        .map(|(_, v)| v)
}

fn int_field(map: &[(Value, Value)], label: i32) -> Option<i64> {
    field(map, label)
        .and_then(Value::as_integer)
        .and_then(|i| i64::try_from(i).ok())
}

fn bytes_field(map: &[(Value, Value)], label: i32) -> Option<&[u8]> {
    field(map, label)
        .and_then(Value::as_bytes)
        .map(Vec::as_slice)
}

fn sized_bytes_field(
    map: &[(Value, Value)],
    label: i32,
    len: usize,
    name: &str,
) -> Result<Vec<u8>, CeremonyError> {
    match bytes_field(map, label) {
        Some(bytes) if bytes.len() == len => Ok(bytes.to_vec()),
        Some(_) => Err(CeremonyError::malformed(format!(
            "COSE key coordinate {name} has the wrong length"
        ))),
        None => Err(CeremonyError::malformed(format!(
            "COSE key is missing coordinate {name}"
        ))),
    }
}

fn expect_kty(kty: i64, expected: i64) -> Result<(), CeremonyError> {
    if kty == expected {
        Ok(())
    } else {
        Err(CeremonyError::malformed(format!(
            "COSE key type {kty} does not match its algorithm"
        )))
    }
}

fn expect_curve(map: &[(Value, Value)], expected: i64) -> Result<(), CeremonyError> {
    match int_field(map, LABEL_CRV) {
        Some(crv) if crv == expected => Ok(()),
        _ => Err(CeremonyError::malformed("Unsupported COSE curve")),
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}
