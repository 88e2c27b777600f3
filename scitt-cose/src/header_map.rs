// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;

use minicbor::Decoder;

use crate::error::CoseError;
use crate::value::{decode_map_from_decoder, CborKey, CborValue};

/// A decoded COSE header map.
///
/// For protected headers the exact encoded bytes from the wire are kept as well:
/// the Sig_structure must be rebuilt from them, not from a re-serialization.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoseHeaderMap {
    encoded_map_cbor: Vec<u8>,
    map: BTreeMap<CborKey, CborValue>,
}

impl CoseHeaderMap {
    pub fn new(encoded_map_cbor: Vec<u8>, map: BTreeMap<CborKey, CborValue>) -> Self {
        Self {
            encoded_map_cbor,
            map,
        }
    }

    pub fn clear(&mut self) {
        self.encoded_map_cbor.clear();
        self.map.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Raw encoded bytes (only populated for protected headers).
    pub fn encoded_map_cbor(&self) -> &[u8] {
        &self.encoded_map_cbor
    }

    pub fn get(&self, label: i64) -> Option<&CborValue> {
        self.map.get(&CborKey::Int(label))
    }

    pub fn get_i64(&self, label: i64) -> Option<i64> {
        self.get(label).and_then(CborValue::as_i64)
    }

    pub fn get_bytes(&self, label: i64) -> Option<&[u8]> {
        self.get(label).and_then(CborValue::as_bytes)
    }

    pub fn get_array(&self, label: i64) -> Option<&[CborValue]> {
        self.get(label).and_then(CborValue::as_array)
    }

    pub fn map(&self) -> &BTreeMap<CborKey, CborValue> {
        &self.map
    }

    pub fn into_map(self) -> BTreeMap<CborKey, CborValue> {
        self.map
    }
}

/// Decode a protected-header bstr body into a map.
pub(crate) fn decode_header_map_from_cbor(
    bytes: &[u8],
) -> Result<BTreeMap<CborKey, CborValue>, CoseError> {
    // Empty bstr means empty map for protected headers.
    if bytes.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut dec = Decoder::new(bytes);
    let map = decode_map_from_decoder(&mut dec)?;

    if dec.position() != bytes.len() {
        return Err(CoseError::TrailingBytes("header map"));
    }

    Ok(map)
}
