// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Single-receipt verification against a signed statement.
//!
//! A receipt is a COSE_Sign1 issued by a CCF ledger. Its detached payload is the
//! Merkle root of the ledger, reconstructed here from the inclusion proofs in
//! the verifiable data proof header. Each proof's leaf commits to the SHA-256 of
//! the signed statement, with its unprotected headers cleared.

use scitt_cose::{
    encode_cose_sign1, encode_sig_structure, parse_cose_sign1, CborValue, ParsedCoseSign1,
};
use tracing::debug;

use crate::ccf::{decode_nested, sha256, InclusionProof, CCF_TREE_ALGORITHM};
use crate::error::VerificationError;
use crate::jwk::Jwk;
use crate::signing_key::{EcVerificationKey, ReceiptAlgorithm};

pub const COSE_HEADER_ALG: i64 = 1;
pub const COSE_HEADER_KID: i64 = 4;
pub const COSE_HEADER_CWT_CLAIMS: i64 = 15;
pub const CWT_CLAIM_ISSUER: i64 = 1;
pub const COSE_HEADER_VDS: i64 = 395;
pub const COSE_HEADER_VDP: i64 = 396;
pub const VDP_INCLUSION_PROOFS: i64 = -1;

/// Verify one receipt for `signed_statement` using `jwk`.
///
/// When `trim_statement` is set the statement's unprotected headers are cleared
/// before hashing; pass `false` when the caller already did so.
pub fn verify_receipt(
    jwk: &Jwk,
    receipt_bytes: &[u8],
    signed_statement: &[u8],
    trim_statement: bool,
) -> Result<(), VerificationError> {
    let claims_digest = if trim_statement {
        sha256(&trim_unprotected_headers(signed_statement)?)
    } else {
        sha256(signed_statement)
    };

    let receipt = parse_cose_sign1(receipt_bytes).map_err(VerificationError::ReceiptDecode)?;
    let protected = &receipt.protected_headers;

    let receipt_alg = protected
        .get_i64(COSE_HEADER_ALG)
        .ok_or(VerificationError::AlgorithmNotFound)?;

    let crv = jwk
        .crv
        .as_deref()
        .ok_or_else(|| VerificationError::InvalidJwk("missing 'crv'".to_string()))?;
    let expected = ReceiptAlgorithm::for_curve(crv)
        .ok_or_else(|| VerificationError::UnsupportedCurve(crv.to_string()))?;
    if receipt_alg != expected.cose_label() {
        return Err(VerificationError::AlgorithmMismatch {
            receipt_alg,
            crv: crv.to_string(),
            expected_alg: expected.cose_label(),
        });
    }

    let receipt_kid = receipt_kid(&receipt).ok_or(VerificationError::KidNotFound)?;
    let key_kid = jwk
        .kid
        .as_deref()
        .ok_or_else(|| VerificationError::InvalidJwk("missing 'kid'".to_string()))?;
    if receipt_kid != key_kid {
        return Err(VerificationError::KidMismatch {
            receipt_kid,
            key_kid: key_kid.to_string(),
        });
    }

    match protected.get(COSE_HEADER_VDS) {
        None => return Err(VerificationError::VdsRequired),
        Some(CborValue::Int(CCF_TREE_ALGORITHM)) => {}
        Some(CborValue::Int(other)) => return Err(VerificationError::VdsNotCcf(other.to_string())),
        Some(other) => return Err(VerificationError::VdsNotCcf(other.kind().to_string())),
    }

    let proofs = inclusion_proofs(&receipt)?;

    let alg = ReceiptAlgorithm::from_cose_label(receipt_alg)
        .ok_or(VerificationError::AlgorithmNotFound)?;
    let key = EcVerificationKey::from_jwk(&jwk.normalized_for_verification())?;

    for proof in &proofs {
        let proof = InclusionProof::from_value(proof)?;
        let root = proof.compute_root();

        let to_be_signed = encode_sig_structure(receipt.protected_header_bytes(), &[], &root)
            .map_err(VerificationError::Encode)?;
        if !key.verify(alg, &to_be_signed, &receipt.signature)? {
            return Err(VerificationError::InvalidSignature);
        }

        if proof.leaf.data_digest != claims_digest {
            return Err(VerificationError::DigestMismatch {
                statement_digest: hex::encode(claims_digest),
                leaf_digest: hex::encode(proof.leaf.data_digest),
            });
        }
    }

    debug!(kid = %key_kid, proofs = proofs.len(), "receipt verified");
    Ok(())
}

/// Inclusion proofs carried in the receipt's verifiable data proof header.
fn inclusion_proofs(receipt: &ParsedCoseSign1) -> Result<Vec<CborValue>, VerificationError> {
    let vdp = receipt
        .unprotected_headers
        .get(COSE_HEADER_VDP)
        .ok_or(VerificationError::VdpRequired)?;
    let vdp = decode_nested(vdp).map_err(|e| VerificationError::VdpMalformed(e.to_string()))?;
    if vdp.as_map().is_none() {
        return Err(VerificationError::VdpMalformed(format!(
            "expected map, found {}",
            vdp.kind()
        )));
    }

    let proofs = vdp
        .get(VDP_INCLUSION_PROOFS)
        .ok_or(VerificationError::InclusionProofRequired)?;
    let proofs = decode_nested(proofs)
        .map_err(|e| VerificationError::InvalidInclusionProof(e.to_string()))?;
    let proofs = proofs
        .as_array()
        .ok_or(VerificationError::InclusionProofRequired)?;
    if proofs.is_empty() {
        return Err(VerificationError::InclusionProofEmpty);
    }
    Ok(proofs.to_vec())
}

/// Re-encode a COSE_Sign1 with an empty unprotected header map.
///
/// Protected header bytes, payload (or its absence), signature and the tag are
/// preserved exactly. Applying this twice yields the same bytes as applying it once.
pub fn trim_unprotected_headers(statement: &[u8]) -> Result<Vec<u8>, VerificationError> {
    let parsed = parse_cose_sign1(statement).map_err(VerificationError::StatementDecode)?;
    encode_cose_sign1(
        parsed.protected_header_bytes(),
        &Default::default(),
        parsed.payload.as_deref(),
        &parsed.signature,
        parsed.was_tagged,
    )
    .map_err(VerificationError::Encode)
}

/// The receipt's `kid`, or `None` when the receipt cannot be decoded or has no kid.
pub fn get_receipt_kid(receipt_bytes: &[u8]) -> Option<String> {
    parse_cose_sign1(receipt_bytes)
        .ok()
        .and_then(|r| receipt_kid(&r))
}

/// The issuer claim from the receipt's CWT claims, or `None` when absent.
///
/// The claims map may be embedded directly or carried as a bstr.
pub fn get_receipt_issuer_host(receipt_bytes: &[u8]) -> Option<String> {
    let receipt = parse_cose_sign1(receipt_bytes).ok()?;
    let claims = receipt.protected_headers.get(COSE_HEADER_CWT_CLAIMS)?;
    let claims = decode_nested(claims).ok()?;
    claims
        .get(CWT_CLAIM_ISSUER)
        .and_then(CborValue::as_text)
        .map(str::to_string)
}

/// Text kids are used as is. Byte kids are read as UTF-8 when valid and
/// rendered as lowercase hex otherwise.
fn receipt_kid(receipt: &ParsedCoseSign1) -> Option<String> {
    match receipt.protected_headers.get(COSE_HEADER_KID)? {
        CborValue::Text(s) => Some(s.clone()),
        CborValue::Bytes(b) => Some(match std::str::from_utf8(b) {
            Ok(s) => s.to_string(),
            Err(_) => hex::encode(b),
        }),
        _ => None,
    }
}
