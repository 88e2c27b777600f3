// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Generic CBOR value model.
//!
//! Receipts nest CBOR structures inside byte strings (the VDP map, inclusion
//! proofs, leaves, CWT claims). Decoding into a closed enum lets callers
//! match on shape once instead of probing untyped data.
//!
//! The decoder is deliberately strict:
//! - Rejects indefinite-length items.
//! - Rejects floats, simple values and `undefined`.
//! - Only accepts integer and text map keys.
//! - Rejects trailing bytes.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use minicbor::data::{Tag, Type};
use minicbor::{Decoder, Encoder};

use crate::error::CoseError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CborKey {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CborValue {
    Int(i64),
    Bytes(Vec<u8>),
    Text(String),
    Bool(bool),
    Null,
    Array(Vec<CborValue>),
    Map(BTreeMap<CborKey, CborValue>),
    Tagged(u64, Box<CborValue>),
}

impl CborValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CborValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CborValue::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CborValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CborValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[CborValue]> {
        match self {
            CborValue::Array(a) => Some(a.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<CborKey, CborValue>> {
        match self {
            CborValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up an integer label in a map value.
    pub fn get(&self, label: i64) -> Option<&CborValue> {
        self.as_map().and_then(|m| m.get(&CborKey::Int(label)))
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            CborValue::Int(_) => "int",
            CborValue::Bytes(_) => "bstr",
            CborValue::Text(_) => "tstr",
            CborValue::Bool(_) => "bool",
            CborValue::Null => "null",
            CborValue::Array(_) => "array",
            CborValue::Map(_) => "map",
            CborValue::Tagged(..) => "tag",
        }
    }
}

/// Decode exactly one CBOR item from `bytes`.
pub fn decode_value(bytes: &[u8]) -> Result<CborValue, CoseError> {
    if bytes.is_empty() {
        return Err(CoseError::EmptyInput);
    }

    let mut dec = Decoder::new(bytes);
    let value = decode_value_from_decoder(&mut dec)?;

    if dec.position() != bytes.len() {
        return Err(CoseError::TrailingBytes("CBOR value"));
    }

    Ok(value)
}

/// Maximum nesting of arrays, maps and tags accepted by the decoder.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Decode the next CBOR item from an in-progress decoder.
pub fn decode_value_from_decoder(dec: &mut Decoder<'_>) -> Result<CborValue, CoseError> {
    decode_nested_value(dec, 0)
}

fn decode_nested_value(dec: &mut Decoder<'_>, depth: usize) -> Result<CborValue, CoseError> {
    match dec.datatype()? {
        Type::Null => {
            dec.null()?;
            Ok(CborValue::Null)
        }
        Type::Bool => Ok(CborValue::Bool(dec.bool()?)),
        Type::Bytes => Ok(CborValue::Bytes(dec.bytes()?.to_vec())),
        Type::String => Ok(CborValue::Text(dec.str()?.to_string())),
        Type::I8
        | Type::I16
        | Type::I32
        | Type::I64
        | Type::Int
        | Type::U8
        | Type::U16
        | Type::U32
        | Type::U64 => Ok(CborValue::Int(dec.i64()?)),
        Type::Array => {
            let depth = enter(depth)?;
            let len = dec
                .array()?
                .ok_or(CoseError::IndefiniteLength("arrays"))?;
            let mut out = Vec::new();
            for _ in 0..len {
                out.push(decode_nested_value(dec, depth)?);
            }
            Ok(CborValue::Array(out))
        }
        Type::Map => Ok(CborValue::Map(decode_nested_map(dec, depth)?)),
        Type::Tag => {
            let depth = enter(depth)?;
            let tag = dec.tag()?;
            let inner = decode_nested_value(dec, depth)?;
            Ok(CborValue::Tagged(tag.as_u64(), Box::new(inner)))
        }
        Type::BytesIndef => Err(CoseError::IndefiniteLength("byte strings")),
        Type::StringIndef => Err(CoseError::IndefiniteLength("text strings")),
        Type::ArrayIndef => Err(CoseError::IndefiniteLength("arrays")),
        Type::MapIndef => Err(CoseError::IndefiniteLength("maps")),
        other => Err(CoseError::UnsupportedType(format!("{other:?}"))),
    }
}

fn enter(depth: usize) -> Result<usize, CoseError> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(CoseError::NestingTooDeep(MAX_NESTING_DEPTH));
    }
    Ok(depth + 1)
}

/// Decode a definite-length map whose keys are integers or text strings.
///
/// A key that appears twice is rejected.
pub(crate) fn decode_map_from_decoder(
    dec: &mut Decoder<'_>,
) -> Result<BTreeMap<CborKey, CborValue>, CoseError> {
    decode_nested_map(dec, 0)
}

fn decode_nested_map(
    dec: &mut Decoder<'_>,
    depth: usize,
) -> Result<BTreeMap<CborKey, CborValue>, CoseError> {
    let depth = enter(depth)?;
    let len = dec.map()?.ok_or(CoseError::IndefiniteLength("maps"))?;

    let mut map = BTreeMap::new();
    for _ in 0..len {
        let key = decode_key(dec)?;
        let value = decode_nested_value(dec, depth)?;
        if let Some(key) = insert_unique(&mut map, key, value) {
            return Err(CoseError::DuplicateKey(key));
        }
    }
    Ok(map)
}

fn insert_unique(
    map: &mut BTreeMap<CborKey, CborValue>,
    key: CborKey,
    value: CborValue,
) -> Option<String> {
    match map.entry(key) {
        Entry::Occupied(e) => Some(match e.key() {
            CborKey::Int(i) => i.to_string(),
            CborKey::Text(t) => format!("\"{t}\""),
        }),
        Entry::Vacant(e) => {
            e.insert(value);
            None
        }
    }
}

fn decode_key(dec: &mut Decoder<'_>) -> Result<CborKey, CoseError> {
    match dec.datatype()? {
        Type::I8
        | Type::I16
        | Type::I32
        | Type::I64
        | Type::Int
        | Type::U8
        | Type::U16
        | Type::U32
        | Type::U64 => Ok(CborKey::Int(dec.i64()?)),
        Type::String => Ok(CborKey::Text(dec.str()?.to_string())),
        other => Err(CoseError::UnsupportedKey(format!("{other:?}"))),
    }
}

/// Encode a value with definite lengths.
pub fn encode_value(value: &CborValue) -> Result<Vec<u8>, CoseError> {
    let mut out = Vec::new();
    let mut enc = Encoder::new(&mut out);
    encode_value_into(&mut enc, value)?;
    Ok(out)
}

pub(crate) fn encode_value_into(
    enc: &mut Encoder<&mut Vec<u8>>,
    value: &CborValue,
) -> Result<(), CoseError> {
    match value {
        CborValue::Int(i) => {
            enc.i64(*i)?;
        }
        CborValue::Bytes(b) => {
            enc.bytes(b)?;
        }
        CborValue::Text(s) => {
            enc.str(s)?;
        }
        CborValue::Bool(b) => {
            enc.bool(*b)?;
        }
        CborValue::Null => {
            enc.null()?;
        }
        CborValue::Array(items) => {
            enc.array(items.len() as u64)?;
            for item in items {
                encode_value_into(enc, item)?;
            }
        }
        CborValue::Map(map) => encode_map_into(enc, map)?,
        CborValue::Tagged(tag, inner) => {
            enc.tag(Tag::new(*tag))?;
            encode_value_into(enc, inner)?;
        }
    }
    Ok(())
}

pub(crate) fn encode_map_into(
    enc: &mut Encoder<&mut Vec<u8>>,
    map: &BTreeMap<CborKey, CborValue>,
) -> Result<(), CoseError> {
    enc.map(map.len() as u64)?;
    for (k, v) in map {
        match k {
            CborKey::Int(i) => {
                enc.i64(*i)?;
            }
            CborKey::Text(s) => {
                enc.str(s)?;
            }
        }
        encode_value_into(enc, v)?;
    }
    Ok(())
}
