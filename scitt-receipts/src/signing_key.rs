// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Receipt signature algorithms and EC verification keys.

use std::fmt;

use p256::ecdsa::signature::Verifier;

use crate::error::VerificationError;
use crate::jwk::{decode_base64url, Jwk};

pub const COSE_ALG_ES256: i64 = -7;
pub const COSE_ALG_ES384: i64 = -35;
pub const COSE_ALG_ES512: i64 = -36;

/// ECDSA algorithms a CCF ledger may sign receipts with.
///
/// Each one is bound to exactly one curve and one hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiptAlgorithm {
    Es256,
    Es384,
    Es512,
}

impl ReceiptAlgorithm {
    pub fn from_cose_label(alg: i64) -> Option<Self> {
        match alg {
            COSE_ALG_ES256 => Some(Self::Es256),
            COSE_ALG_ES384 => Some(Self::Es384),
            COSE_ALG_ES512 => Some(Self::Es512),
            _ => None,
        }
    }

    pub fn for_curve(crv: &str) -> Option<Self> {
        match crv {
            "P-256" => Some(Self::Es256),
            "P-384" => Some(Self::Es384),
            "P-521" => Some(Self::Es512),
            _ => None,
        }
    }

    pub fn cose_label(self) -> i64 {
        match self {
            Self::Es256 => COSE_ALG_ES256,
            Self::Es384 => COSE_ALG_ES384,
            Self::Es512 => COSE_ALG_ES512,
        }
    }

    pub fn curve(self) -> &'static str {
        match self {
            Self::Es256 => "P-256",
            Self::Es384 => "P-384",
            Self::Es512 => "P-521",
        }
    }

    pub fn hash_name(self) -> &'static str {
        match self {
            Self::Es256 => "SHA-256",
            Self::Es384 => "SHA-384",
            Self::Es512 => "SHA-512",
        }
    }

    /// Byte length of each affine coordinate (and of each signature half).
    pub fn coordinate_len(self) -> usize {
        match self {
            Self::Es256 => 32,
            Self::Es384 => 48,
            Self::Es512 => 66,
        }
    }
}

/// A public key able to check receipt signatures.
#[derive(Clone)]
pub enum EcVerificationKey {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
    P521(p521::ecdsa::VerifyingKey),
}

impl fmt::Debug for EcVerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EcVerificationKey")
            .field(&self.algorithm().curve())
            .finish()
    }
}

impl EcVerificationKey {
    /// Build a key from an EC JWK.
    ///
    /// `kty` must be `EC` when present and `key_ops`, when present, must allow `verify`.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, VerificationError> {
        if let Some(kty) = jwk.kty.as_deref() {
            if kty != "EC" {
                return Err(VerificationError::InvalidJwk(format!(
                    "unsupported key type '{kty}'"
                )));
            }
        }
        if let Some(ops) = jwk.key_ops.as_ref() {
            if !ops.iter().any(|op| op == "verify") {
                return Err(VerificationError::InvalidJwk(
                    "key_ops does not allow verify".to_string(),
                ));
            }
        }

        let crv = jwk
            .crv
            .as_deref()
            .ok_or_else(|| VerificationError::InvalidJwk("missing 'crv'".to_string()))?;
        let alg = ReceiptAlgorithm::for_curve(crv)
            .ok_or_else(|| VerificationError::UnsupportedCurve(crv.to_string()))?;

        let x = decode_coordinate(jwk.x.as_deref(), "x", alg)?;
        let y = decode_coordinate(jwk.y.as_deref(), "y", alg)?;

        let mut sec1 = Vec::with_capacity(1 + x.len() + y.len());
        sec1.push(0x04);
        sec1.extend_from_slice(&x);
        sec1.extend_from_slice(&y);

        let key = match alg {
            ReceiptAlgorithm::Es256 => {
                p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1).map(Self::P256)
            }
            ReceiptAlgorithm::Es384 => {
                p384::ecdsa::VerifyingKey::from_sec1_bytes(&sec1).map(Self::P384)
            }
            ReceiptAlgorithm::Es512 => {
                p521::ecdsa::VerifyingKey::from_sec1_bytes(&sec1).map(Self::P521)
            }
        };
        key.map_err(|e| VerificationError::InvalidJwk(format!("point is not on curve {crv}: {e}")))
    }

    pub fn algorithm(&self) -> ReceiptAlgorithm {
        match self {
            Self::P256(_) => ReceiptAlgorithm::Es256,
            Self::P384(_) => ReceiptAlgorithm::Es384,
            Self::P521(_) => ReceiptAlgorithm::Es512,
        }
    }

    /// Verify a fixed-width `r || s` signature over `message`.
    ///
    /// The message is hashed with the algorithm's digest before the ECDSA check.
    /// Returns `Ok(false)` when the signature is well formed but does not
    /// verify, and an error when it cannot be checked at all.
    pub fn verify(
        &self,
        alg: ReceiptAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, VerificationError> {
        if alg != self.algorithm() {
            return Err(VerificationError::SignatureVerificationFailed(format!(
                "algorithm {:?} cannot be used with a {} key",
                alg,
                self.algorithm().curve()
            )));
        }
        let expected_len = 2 * alg.coordinate_len();
        if signature.len() != expected_len {
            return Err(VerificationError::SignatureVerificationFailed(format!(
                "expected a {expected_len}-byte signature, found {} bytes",
                signature.len()
            )));
        }

        let malformed =
            |e: p256::ecdsa::Error| VerificationError::SignatureVerificationFailed(e.to_string());
        let ok = match self {
            Self::P256(vk) => {
                let sig = p256::ecdsa::Signature::from_slice(signature).map_err(malformed)?;
                vk.verify(message, &sig).is_ok()
            }
            Self::P384(vk) => {
                let sig = p384::ecdsa::Signature::from_slice(signature).map_err(malformed)?;
                vk.verify(message, &sig).is_ok()
            }
            Self::P521(vk) => {
                let sig = p521::ecdsa::Signature::from_slice(signature).map_err(malformed)?;
                vk.verify(message, &sig).is_ok()
            }
        };
        Ok(ok)
    }
}

fn decode_coordinate(
    value: Option<&str>,
    name: &str,
    alg: ReceiptAlgorithm,
) -> Result<Vec<u8>, VerificationError> {
    let value =
        value.ok_or_else(|| VerificationError::InvalidJwk(format!("missing '{name}'")))?;
    let bytes = decode_base64url(value)
        .map_err(|e| VerificationError::InvalidJwk(format!("'{name}' is not base64url: {e}")))?;
    if bytes.len() != alg.coordinate_len() {
        return Err(VerificationError::InvalidJwk(format!(
            "'{name}' must be {} bytes for {}, found {}",
            alg.coordinate_len(),
            alg.curve(),
            bytes.len()
        )));
    }
    Ok(bytes)
}
