// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! CBOR and COSE_Sign1 codec for transparent-statement verification.
//!
//! This crate is intentionally small: it turns bytes into a strict, typed view
//! (`CborValue`, `ParsedCoseSign1`) and back. It performs no cryptography.

pub mod cose_sign1;
pub mod error;
pub mod header_map;
pub mod value;

pub use cose_sign1::{
    encode_cose_sign1, encode_sig_structure, parse_cose_sign1, ParsedCoseSign1, COSE_SIGN1_TAG,
    SIG_STRUCTURE_CONTEXT_SIGNATURE1,
};
pub use error::CoseError;
pub use header_map::CoseHeaderMap;
pub use value::{
    decode_value, decode_value_from_decoder, encode_value, CborKey, CborValue, MAX_NESTING_DEPTH,
};
