// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Structural CBOR / COSE_Sign1 decoding and encoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoseError {
    #[error("empty input")]
    EmptyInput,

    #[error("unexpected CBOR tag {0} (expected COSE_Sign1 tag 18 or no tag)")]
    UnexpectedTag(u64),

    #[error("top-level item is not an array: {0}")]
    NotAnArray(String),

    #[error("array length was {0}, expected 4")]
    WrongArity(u64),

    #[error("indefinite-length {0} are not supported")]
    IndefiniteLength(&'static str),

    #[error("unsupported CBOR type: {0}")]
    UnsupportedType(String),

    #[error("unsupported map key type: {0}")]
    UnsupportedKey(String),

    #[error("{field} is not a {expected}")]
    UnexpectedField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("CBOR nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("duplicate map key {0}")]
    DuplicateKey(String),

    #[error("trailing bytes after {0}")]
    TrailingBytes(&'static str),

    #[error("CBOR decode failed: {0}")]
    Decode(String),

    #[error("CBOR encode failed: {0}")]
    Encode(String),
}

impl From<minicbor::decode::Error> for CoseError {
    fn from(e: minicbor::decode::Error) -> Self {
        CoseError::Decode(e.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for CoseError {
    fn from(e: minicbor::encode::Error<E>) -> Self {
        CoseError::Encode(e.to_string())
    }
}
