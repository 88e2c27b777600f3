// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! COSE_Sign1 parsing, re-encoding and Sig_structure encoding.
//!
//! ```text
//! COSE_Sign1 = [ protected : bstr,
//!               unprotected : map,
//!               payload : bstr / null,
//!               signature : bstr ]
//! ```

use std::collections::BTreeMap;

use minicbor::data::{Tag, Type};
use minicbor::{Decoder, Encoder};

use crate::error::CoseError;
use crate::header_map::{decode_header_map_from_cbor, CoseHeaderMap};
use crate::value::{decode_map_from_decoder, encode_map_into, CborKey, CborValue};

pub const COSE_SIGN1_TAG: u64 = 18;
pub const SIG_STRUCTURE_CONTEXT_SIGNATURE1: &str = "Signature1";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCoseSign1 {
    pub protected_headers: CoseHeaderMap,
    pub unprotected_headers: CoseHeaderMap,
    pub payload: Option<Vec<u8>>, // None => detached payload
    pub signature: Vec<u8>,
    pub was_tagged: bool,
}

impl ParsedCoseSign1 {
    /// Raw protected-header bytes exactly as they appeared on the wire.
    pub fn protected_header_bytes(&self) -> &[u8] {
        self.protected_headers.encoded_map_cbor()
    }

    /// Re-encode this message, keeping the protected header bytes verbatim.
    pub fn encode(&self) -> Result<Vec<u8>, CoseError> {
        encode_cose_sign1(
            self.protected_header_bytes(),
            self.unprotected_headers.map(),
            self.payload.as_deref(),
            &self.signature,
            self.was_tagged,
        )
    }
}

/// Parse a COSE_Sign1 structure from its CBOR encoding.
///
/// - Rejects empty input.
/// - Accepts an optional COSE_Sign1 tag (18), but rejects any other tag.
/// - Requires the top-level array length to be exactly 4.
/// - Rejects indefinite-length arrays/maps.
/// - Rejects trailing bytes.
pub fn parse_cose_sign1(input: &[u8]) -> Result<ParsedCoseSign1, CoseError> {
    if input.is_empty() {
        return Err(CoseError::EmptyInput);
    }

    let mut dec = Decoder::new(input);

    let mut was_tagged = false;
    if matches!(dec.datatype()?, Type::Tag) {
        let tag = dec.tag()?;
        if tag != Tag::new(COSE_SIGN1_TAG) {
            return Err(CoseError::UnexpectedTag(tag.as_u64()));
        }
        was_tagged = true;
    }

    let len = dec
        .array()
        .map_err(|e| CoseError::NotAnArray(e.to_string()))?
        .ok_or(CoseError::IndefiniteLength("arrays"))?;
    if len != 4 {
        return Err(CoseError::WrongArity(len));
    }

    if !matches!(dec.datatype()?, Type::Bytes) {
        return Err(CoseError::UnexpectedField {
            field: "protected headers",
            expected: "bstr",
        });
    }
    let protected_bstr = dec.bytes()?.to_vec();
    let protected_map = decode_header_map_from_cbor(&protected_bstr)?;

    if !matches!(dec.datatype()?, Type::Map) {
        return Err(CoseError::UnexpectedField {
            field: "unprotected headers",
            expected: "map",
        });
    }
    let unprotected_map = decode_map_from_decoder(&mut dec)?;

    let payload = match dec.datatype()? {
        Type::Null => {
            dec.null()?;
            None
        }
        Type::Bytes => Some(dec.bytes()?.to_vec()),
        _ => {
            return Err(CoseError::UnexpectedField {
                field: "payload",
                expected: "bstr or null",
            })
        }
    };

    if !matches!(dec.datatype()?, Type::Bytes) {
        return Err(CoseError::UnexpectedField {
            field: "signature",
            expected: "bstr",
        });
    }
    let signature = dec.bytes()?.to_vec();

    if dec.position() != input.len() {
        return Err(CoseError::TrailingBytes("COSE_Sign1"));
    }

    Ok(ParsedCoseSign1 {
        protected_headers: CoseHeaderMap::new(protected_bstr, protected_map),
        unprotected_headers: CoseHeaderMap::new(Vec::new(), unprotected_map),
        payload,
        signature,
        was_tagged,
    })
}

/// Encode a COSE_Sign1 from its parts.
///
/// `protected_header_bytes` is written verbatim as the protected bstr.
pub fn encode_cose_sign1(
    protected_header_bytes: &[u8],
    unprotected_headers: &BTreeMap<CborKey, CborValue>,
    payload: Option<&[u8]>,
    signature: &[u8],
    tagged: bool,
) -> Result<Vec<u8>, CoseError> {
    let mut out = Vec::with_capacity(
        16 + protected_header_bytes.len() + payload.map_or(0, <[u8]>::len) + signature.len(),
    );
    {
        let mut enc = Encoder::new(&mut out);
        if tagged {
            enc.tag(Tag::new(COSE_SIGN1_TAG))?;
        }
        enc.array(4)?;
        enc.bytes(protected_header_bytes)?;
        encode_map_into(&mut enc, unprotected_headers)?;
        match payload {
            Some(p) => {
                enc.bytes(p)?;
            }
            None => {
                enc.null()?;
            }
        }
        enc.bytes(signature)?;
    }
    Ok(out)
}

/// Encode the COSE `Sig_structure` for a COSE_Sign1 signature.
///
/// `["Signature1", body_protected, external_aad, payload]`
pub fn encode_sig_structure(
    protected_header_bytes: &[u8],
    external_aad: &[u8],
    payload: &[u8],
) -> Result<Vec<u8>, CoseError> {
    let mut out =
        Vec::with_capacity(32 + protected_header_bytes.len() + external_aad.len() + payload.len());
    {
        let mut enc = Encoder::new(&mut out);
        enc.array(4)?;
        enc.str(SIG_STRUCTURE_CONTEXT_SIGNATURE1)?;
        enc.bytes(protected_header_bytes)?;
        enc.bytes(external_aad)?;
        enc.bytes(payload)?;
    }
    Ok(out)
}
