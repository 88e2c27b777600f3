// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Verification errors.
//!
//! Every failure carries enough context (issuer, kid, digests) to reproduce an
//! actionable message, plus a stable machine-readable code via
//! [`VerificationError::error_code`].

use scitt_cose::CoseError;

use crate::client::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Failed to decode receipt: {0}")]
    ReceiptDecode(#[source] CoseError),

    #[error("Failed to decode transparent statement: {0}")]
    StatementDecode(#[source] CoseError),

    #[error("CBOR encoding failed: {0}")]
    Encode(#[source] CoseError),

    #[error("Algorithm not found in receipt protected headers.")]
    AlgorithmNotFound,

    #[error("Unsupported curve '{0}'.")]
    UnsupportedCurve(String),

    #[error("Algorithm mismatch: receipt declares {receipt_alg} but curve {crv} requires {expected_alg}.")]
    AlgorithmMismatch {
        receipt_alg: i64,
        crv: String,
        expected_alg: i64,
    },

    #[error("KID not found in receipt protected headers.")]
    KidNotFound,

    #[error("KID mismatch: receipt kid '{receipt_kid}' does not match key kid '{key_kid}'.")]
    KidMismatch { receipt_kid: String, key_kid: String },

    #[error("Verifiable Data Structure is required in receipt protected headers.")]
    VdsRequired,

    #[error("Verifiable Data Structure is not CCF (found {0}).")]
    VdsNotCcf(String),

    #[error("Verifiable data proof is required in receipt unprotected headers.")]
    VdpRequired,

    #[error("Verifiable data proof is malformed: {0}")]
    VdpMalformed(String),

    #[error("Inclusion proof is required.")]
    InclusionProofRequired,

    #[error("At least one inclusion proof is required.")]
    InclusionProofEmpty,

    #[error("Invalid inclusion proof: {0}")]
    InvalidInclusionProof(String),

    #[error("Leaf must be present.")]
    LeafMissing,

    #[error("Invalid leaf structure: {0}")]
    InvalidLeaf(String),

    #[error("Path must be present.")]
    PathMissing,

    #[error("Invalid proof element: {0}")]
    InvalidProofElement(String),

    #[error("Invalid JWK: {0}")]
    InvalidJwk(String),

    #[error("Invalid signature.")]
    InvalidSignature,

    #[error("Signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    #[error("Statement digest does not match the leaf digest in the receipt: statement={statement_digest} leaf={leaf_digest}")]
    DigestMismatch {
        statement_digest: String,
        leaf_digest: String,
    },

    #[error("Embedded receipts not found in transparent statement unprotected headers.")]
    EmbeddedReceiptsNotFound,

    #[error("Embedded receipts must be a CBOR array (found {0}).")]
    EmbeddedReceiptsNotArray(&'static str),

    #[error("Embedded receipt at index {0} must be a byte string.")]
    EmbeddedReceiptNotBytes(usize),

    #[error("No receipts found in transparent statement.")]
    NoReceipts,

    #[error("No receipts would be verified: no authorized domains were specified and unauthorized receipts are ignored.")]
    NothingToVerify,

    #[error("Receipt issuer '{0}' is not in the authorized domain list.")]
    UnauthorizedIssuer(String),

    #[error("Cannot verify receipt with unknown issuer '{0}'.")]
    UnknownIssuer(String),

    #[error("No keys available for issuer '{0}'.")]
    NoKeysForIssuer(String),

    #[error("No keys found in JWKS document for issuer '{0}'.")]
    EmptyJwks(String),

    #[error("Key with ID '{kid}' not found for issuer '{issuer}'.")]
    KeyNotFound { issuer: String, kid: String },

    #[error("Failed to fetch signing keys for issuer '{issuer}': {source}")]
    KeyFetch {
        issuer: String,
        #[source]
        source: ClientError,
    },

    #[error("Receipt {index} from issuer '{issuer}' failed verification: {source}")]
    ReceiptFailed {
        index: usize,
        issuer: String,
        #[source]
        source: Box<VerificationError>,
    },

    #[error("No valid receipts found for any authorized issuer domain.")]
    NoValidAuthorizedReceipts,

    #[error("Not all receipts verified for authorized issuer domain '{0}'.")]
    AuthorizedDomainFailed(String),

    #[error("No valid receipt found for required issuer domain '{0}'.")]
    RequiredDomainMissing(String),

    #[error("Invalid verification options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Aggregate(AggregateError),
}

impl VerificationError {
    /// Stable machine-readable code for this failure.
    ///
    /// Wrapped per-receipt failures report the code of the underlying error.
    pub fn error_code(&self) -> &'static str {
        match self {
            VerificationError::ReceiptDecode(_) => "RECEIPT_PARSE_ERROR",
            VerificationError::StatementDecode(_) => "STATEMENT_PARSE_ERROR",
            VerificationError::Encode(_) => "CBOR_ENCODE_ERROR",
            VerificationError::AlgorithmNotFound => "RECEIPT_ALG_MISSING",
            VerificationError::UnsupportedCurve(_) => "JWK_UNSUPPORTED_CURVE",
            VerificationError::AlgorithmMismatch { .. } => "RECEIPT_ALG_MISMATCH",
            VerificationError::KidNotFound => "RECEIPT_KID_MISSING",
            VerificationError::KidMismatch { .. } => "RECEIPT_KID_MISMATCH",
            VerificationError::VdsRequired => "RECEIPT_VDS_MISSING",
            VerificationError::VdsNotCcf(_) => "RECEIPT_VDS_NOT_CCF",
            VerificationError::VdpRequired => "RECEIPT_VDP_MISSING",
            VerificationError::VdpMalformed(_) => "RECEIPT_VDP_PARSE_ERROR",
            VerificationError::InclusionProofRequired => "RECEIPT_INCLUSION_MISSING",
            VerificationError::InclusionProofEmpty => "RECEIPT_INCLUSION_EMPTY",
            VerificationError::InvalidInclusionProof(_) => "RECEIPT_INCLUSION_PARSE_ERROR",
            VerificationError::LeafMissing => "RECEIPT_LEAF_MISSING",
            VerificationError::InvalidLeaf(_) => "RECEIPT_LEAF_PARSE_ERROR",
            VerificationError::PathMissing => "RECEIPT_PATH_MISSING",
            VerificationError::InvalidProofElement(_) => "RECEIPT_PATH_PARSE_ERROR",
            VerificationError::InvalidJwk(_) => "JWK_ERROR",
            VerificationError::InvalidSignature => "RECEIPT_SIGNATURE_INVALID",
            VerificationError::SignatureVerificationFailed(_) => "RECEIPT_SIGNATURE_ERROR",
            VerificationError::DigestMismatch { .. } => "RECEIPT_CLAIM_DIGEST_MISMATCH",
            VerificationError::EmbeddedReceiptsNotFound
            | VerificationError::EmbeddedReceiptsNotArray(_)
            | VerificationError::EmbeddedReceiptNotBytes(_)
            | VerificationError::NoReceipts => "STATEMENT_NO_RECEIPT",
            VerificationError::NothingToVerify => "STATEMENT_NO_VERIFIABLE_RECEIPTS",
            VerificationError::UnauthorizedIssuer(_) => "STATEMENT_UNAUTHORIZED_RECEIPT",
            VerificationError::UnknownIssuer(_) => "STATEMENT_UNKNOWN_ISSUER",
            VerificationError::NoKeysForIssuer(_)
            | VerificationError::EmptyJwks(_)
            | VerificationError::KeyNotFound { .. } => "KEY_NOT_FOUND",
            VerificationError::KeyFetch { .. } => "KEY_FETCH_FAILED",
            VerificationError::ReceiptFailed { source, .. } => source.error_code(),
            VerificationError::NoValidAuthorizedReceipts => "STATEMENT_NO_VALID_AUTHORIZED_RECEIPTS",
            VerificationError::AuthorizedDomainFailed(_) => "STATEMENT_REQUIRED_DOMAIN_FAILED",
            VerificationError::RequiredDomainMissing(_) => "STATEMENT_REQUIRED_DOMAIN_MISSING",
            VerificationError::InvalidOptions(_) => "INVALID_OPTIONS",
            VerificationError::Aggregate(_) => "AGGREGATE",
        }
    }

    /// The failures behind this error: the members of an aggregate, or the error itself.
    pub fn failures(&self) -> Vec<&VerificationError> {
        match self {
            VerificationError::Aggregate(agg) => agg.errors().iter().collect(),
            other => vec![other],
        }
    }
}

/// More than one receipt-level failure.
///
/// The message joins every member's message; the ordered members stay
/// available for programmatic inspection.
#[derive(Debug, thiserror::Error)]
#[error("{} verification failures: {}", .errors.len(), join_messages(.errors))]
pub struct AggregateError {
    errors: Vec<VerificationError>,
}

impl AggregateError {
    pub fn new(errors: Vec<VerificationError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[VerificationError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<VerificationError> {
        self.errors
    }
}

fn join_messages(errors: &[VerificationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collapse a failure list: nothing, the sole error, or an aggregate.
pub(crate) fn into_result(mut errors: Vec<VerificationError>) -> Result<(), VerificationError> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(VerificationError::Aggregate(AggregateError::new(errors))),
    }
}
