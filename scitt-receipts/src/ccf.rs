// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! CCF inclusion proofs.
//!
//! ```text
//! inclusion-proof = {
//!     1: leaf,                     ; may be bstr-wrapped
//!     2: [ + [ left: bool, digest: bstr .size 32 ] ],  ; may be bstr-wrapped
//! }
//! leaf = [ internal-transaction-digest: bstr .size 32,
//!          internal-evidence: tstr,
//!          data-digest: bstr .size 32 ]
//! ```
//!
//! The leaf and path fold into the Merkle root that the receipt signs.

use std::borrow::Cow;

use scitt_cose::{decode_value, CborValue};
use sha2::{Digest, Sha256};

use crate::error::VerificationError;

/// `verifiable-data-structure` value identifying a CCF ledger.
pub const CCF_TREE_ALGORITHM: i64 = 2;

pub const PROOF_LEAF_LABEL: i64 = 1;
pub const PROOF_PATH_LABEL: i64 = 2;

pub const DIGEST_LEN: usize = 32;
/// Upper bound on `internal_evidence`, counted in characters.
pub const MAX_EVIDENCE_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub internal_transaction_digest: [u8; DIGEST_LEN],
    pub internal_evidence: String,
    pub data_digest: [u8; DIGEST_LEN],
}

impl Leaf {
    fn from_value(value: &CborValue) -> Result<Self, VerificationError> {
        let value = decode_nested(value)
            .map_err(|e| VerificationError::InvalidLeaf(e.to_string()))?;
        let items = value.as_array().ok_or_else(|| {
            VerificationError::InvalidLeaf(format!("expected array, found {}", value.kind()))
        })?;
        let [txn, evidence, data] = items else {
            return Err(VerificationError::InvalidLeaf(format!(
                "expected 3 elements, found {}",
                items.len()
            )));
        };

        let internal_transaction_digest = digest_from(txn).ok_or_else(|| {
            VerificationError::InvalidLeaf(
                "internal transaction digest must be a 32-byte bstr".to_string(),
            )
        })?;
        let internal_evidence = evidence
            .as_text()
            .filter(|s| (1..=MAX_EVIDENCE_LEN).contains(&s.chars().count()))
            .ok_or_else(|| {
                VerificationError::InvalidLeaf(format!(
                    "internal evidence must be a tstr of 1 to {MAX_EVIDENCE_LEN} characters"
                ))
            })?
            .to_string();
        let data_digest = digest_from(data).ok_or_else(|| {
            VerificationError::InvalidLeaf("data digest must be a 32-byte bstr".to_string())
        })?;

        Ok(Self {
            internal_transaction_digest,
            internal_evidence,
            data_digest,
        })
    }

    /// `SHA-256(internal_transaction_digest || SHA-256(internal_evidence) || data_digest)`
    pub fn digest(&self) -> [u8; DIGEST_LEN] {
        let evidence_digest = sha256(self.internal_evidence.as_bytes());
        let mut h = Sha256::new();
        h.update(self.internal_transaction_digest);
        h.update(evidence_digest);
        h.update(self.data_digest);
        h.finalize().into()
    }
}

/// One step on the path from the leaf to the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofElement {
    /// The sibling sits to the left of the running hash.
    pub left: bool,
    pub digest: [u8; DIGEST_LEN],
}

impl ProofElement {
    fn from_value(value: &CborValue) -> Result<Self, VerificationError> {
        let value = decode_nested(value)
            .map_err(|e| VerificationError::InvalidProofElement(e.to_string()))?;
        let pair = value.as_array().ok_or_else(|| {
            VerificationError::InvalidProofElement(format!(
                "expected array, found {}",
                value.kind()
            ))
        })?;
        let [left, digest] = pair else {
            return Err(VerificationError::InvalidProofElement(format!(
                "expected 2 elements, found {}",
                pair.len()
            )));
        };
        let left = left.as_bool().ok_or_else(|| {
            VerificationError::InvalidProofElement("direction must be a bool".to_string())
        })?;
        let digest = digest_from(digest).ok_or_else(|| {
            VerificationError::InvalidProofElement("digest must be a 32-byte bstr".to_string())
        })?;
        Ok(Self { left, digest })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    pub leaf: Leaf,
    pub path: Vec<ProofElement>,
}

impl InclusionProof {
    /// Decode one entry of the VDP inclusion-proof array.
    pub fn from_value(value: &CborValue) -> Result<Self, VerificationError> {
        let value = decode_nested(value)
            .map_err(|e| VerificationError::InvalidInclusionProof(e.to_string()))?;
        if value.as_map().is_none() {
            return Err(VerificationError::InvalidInclusionProof(format!(
                "expected map, found {}",
                value.kind()
            )));
        }

        let leaf = value
            .get(PROOF_LEAF_LABEL)
            .ok_or(VerificationError::LeafMissing)
            .and_then(Leaf::from_value)?;

        let path_value = value
            .get(PROOF_PATH_LABEL)
            .ok_or(VerificationError::PathMissing)?;
        let path_value = decode_nested(path_value)
            .map_err(|e| VerificationError::InvalidProofElement(e.to_string()))?;
        let elements = path_value.as_array().ok_or_else(|| {
            VerificationError::InvalidProofElement(format!(
                "path must be an array, found {}",
                path_value.kind()
            ))
        })?;
        let path = elements
            .iter()
            .map(ProofElement::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { leaf, path })
    }

    /// Fold the path over the leaf digest, producing the signed Merkle root.
    pub fn compute_root(&self) -> [u8; DIGEST_LEN] {
        self.path.iter().fold(self.leaf.digest(), |acc, element| {
            if element.left {
                sha256_concat(&element.digest, &acc)
            } else {
                sha256_concat(&acc, &element.digest)
            }
        })
    }
}

/// Values carried inside a bstr are decoded; anything else is used as is.
pub(crate) fn decode_nested(
    value: &CborValue,
) -> Result<Cow<'_, CborValue>, scitt_cose::CoseError> {
    match value {
        CborValue::Bytes(b) => decode_value(b).map(Cow::Owned),
        other => Ok(Cow::Borrowed(other)),
    }
}

fn digest_from(value: &CborValue) -> Option<[u8; DIGEST_LEN]> {
    value.as_bytes().and_then(|b| b.try_into().ok())
}

pub(crate) fn sha256(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::digest(bytes).into()
}

fn sha256_concat(left: &[u8; DIGEST_LEN], right: &[u8; DIGEST_LEN]) -> [u8; DIGEST_LEN] {
    let mut h = Sha256::new();
    h.update(left);
    h.update(right);
    h.finalize().into()
}
