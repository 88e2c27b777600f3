// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! COSE_Sign1 parsing and re-encoding tests.
//!
//! These focus on accepted encodings (tagged/untagged, detached payload), the
//! strict rejection paths, and byte-exact re-encoding of protected headers.

use minicbor::Encoder;
use scitt_cose::{
    encode_cose_sign1, encode_sig_structure, parse_cose_sign1, CborKey, CborValue, CoseError,
};

// Helper to build a minimal, well-formed COSE_Sign1.
fn make_basic_sign1(tagged: bool, detached: bool) -> Vec<u8> {
    let protected = {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.map(1).unwrap();
        enc.i64(1).unwrap(); // alg
        enc.i64(-7).unwrap(); // ES256
        buf
    };

    let mut out = Vec::new();
    let mut enc = Encoder::new(&mut out);
    if tagged {
        enc.tag(minicbor::data::Tag::new(18)).unwrap();
    }
    enc.array(4).unwrap();
    enc.bytes(&protected).unwrap();
    enc.map(1).unwrap();
    enc.i64(394).unwrap();
    enc.array(1).unwrap();
    enc.bytes(b"receipt").unwrap();
    if detached {
        enc.null().unwrap();
    } else {
        enc.bytes(b"payload").unwrap();
    }
    enc.bytes(b"sig").unwrap();
    out
}

#[test]
fn parse_accepts_tagged_and_untagged() {
    for tagged in [false, true] {
        let cose = make_basic_sign1(tagged, false);
        let parsed = parse_cose_sign1(&cose).expect("parse");
        assert_eq!(parsed.was_tagged, tagged);
        assert_eq!(parsed.signature, b"sig");
        assert_eq!(parsed.payload.as_deref(), Some(b"payload".as_slice()));
        assert_eq!(parsed.protected_headers.get_i64(1), Some(-7));
        assert_eq!(
            parsed.unprotected_headers.get_array(394),
            Some([CborValue::Bytes(b"receipt".to_vec())].as_slice())
        );
    }
}

#[test]
fn parse_supports_detached_payload() {
    let cose = make_basic_sign1(false, true);
    let parsed = parse_cose_sign1(&cose).expect("parse");
    assert!(parsed.payload.is_none());
}

#[test]
fn encode_round_trips_byte_exact() {
    for tagged in [false, true] {
        for detached in [false, true] {
            let cose = make_basic_sign1(tagged, detached);
            let parsed = parse_cose_sign1(&cose).expect("parse");
            assert_eq!(parsed.encode().expect("encode"), cose);
        }
    }
}

#[test]
fn encode_with_empty_unprotected_keeps_protected_bytes_verbatim() {
    // Non-canonical protected header: alg encoded with a one-byte argument (0x18 0x01 style).
    let protected = vec![0xa1, 0x18, 0x01, 0x26];
    let empty = Default::default();
    let cose = encode_cose_sign1(&protected, &empty, Some(b"p"), b"s", true).expect("encode");
    let parsed = parse_cose_sign1(&cose).expect("parse");
    assert_eq!(parsed.protected_header_bytes(), protected.as_slice());
    assert_eq!(parsed.protected_headers.get_i64(1), Some(-7));
    assert!(parsed.unprotected_headers.is_empty());
    assert!(parsed.was_tagged);
}

#[test]
fn parse_rejects_structural_errors() {
    assert_eq!(parse_cose_sign1(&[]).unwrap_err(), CoseError::EmptyInput);

    // Wrong tag.
    let mut wrong_tag = Vec::new();
    {
        let mut enc = Encoder::new(&mut wrong_tag);
        enc.tag(minicbor::data::Tag::new(98)).unwrap();
        enc.array(0).unwrap();
    }
    assert_eq!(parse_cose_sign1(&wrong_tag).unwrap_err(), CoseError::UnexpectedTag(98));

    // Wrong arity.
    let mut three = Vec::new();
    {
        let mut enc = Encoder::new(&mut three);
        enc.array(3).unwrap();
        enc.bytes(&[]).unwrap();
        enc.map(0).unwrap();
        enc.null().unwrap();
    }
    assert_eq!(parse_cose_sign1(&three).unwrap_err(), CoseError::WrongArity(3));

    // Not an array.
    assert!(matches!(
        parse_cose_sign1(&[0x01]).unwrap_err(),
        CoseError::NotAnArray(_)
    ));

    // Indefinite-length array.
    assert_eq!(
        parse_cose_sign1(&[0x9f, 0xff]).unwrap_err(),
        CoseError::IndefiniteLength("arrays")
    );

    // Trailing bytes.
    let mut trailing = make_basic_sign1(false, false);
    trailing.push(0x00);
    assert_eq!(
        parse_cose_sign1(&trailing).unwrap_err(),
        CoseError::TrailingBytes("COSE_Sign1")
    );
}

#[test]
fn parse_rejects_duplicate_header_labels() {
    // Protected { 1: -7, 1: -35 }
    let mut protected = Vec::new();
    {
        let mut enc = Encoder::new(&mut protected);
        enc.map(2).unwrap();
        enc.i64(1).unwrap().i64(-7).unwrap();
        enc.i64(1).unwrap().i64(-35).unwrap();
    }
    let mut out = Vec::new();
    {
        let mut enc = Encoder::new(&mut out);
        enc.array(4).unwrap();
        enc.bytes(&protected).unwrap();
        enc.map(0).unwrap();
        enc.null().unwrap();
        enc.bytes(b"sig").unwrap();
    }
    assert_eq!(
        parse_cose_sign1(&out).unwrap_err(),
        CoseError::DuplicateKey("1".to_string())
    );

    // Unprotected { 4: h'01', 4: h'02' }
    let mut out = Vec::new();
    {
        let mut enc = Encoder::new(&mut out);
        enc.array(4).unwrap();
        enc.bytes(&[]).unwrap();
        enc.map(2).unwrap();
        enc.i64(4).unwrap().bytes(&[1]).unwrap();
        enc.i64(4).unwrap().bytes(&[2]).unwrap();
        enc.null().unwrap();
        enc.bytes(b"sig").unwrap();
    }
    assert_eq!(
        parse_cose_sign1(&out).unwrap_err(),
        CoseError::DuplicateKey("4".to_string())
    );
}

#[test]
fn parse_rejects_deeply_nested_unprotected_header() {
    // Unprotected { 999: [[[ ... 0 ... ]]] }
    let mut out = Vec::new();
    {
        let mut enc = Encoder::new(&mut out);
        enc.array(4).unwrap();
        enc.bytes(&[]).unwrap();
        enc.map(1).unwrap();
        enc.i64(999).unwrap();
    }
    out.extend(std::iter::repeat(0x81).take(200_000));
    out.push(0x00);
    {
        let mut enc = Encoder::new(&mut out);
        enc.null().unwrap();
        enc.bytes(b"sig").unwrap();
    }
    assert!(matches!(
        parse_cose_sign1(&out).unwrap_err(),
        CoseError::NestingTooDeep(_)
    ));
}

#[test]
fn parse_rejects_wrong_field_types() {
    // Payload is an int.
    let mut out = Vec::new();
    {
        let mut enc = Encoder::new(&mut out);
        enc.array(4).unwrap();
        enc.bytes(&[]).unwrap();
        enc.map(0).unwrap();
        enc.i64(5).unwrap();
        enc.bytes(b"sig").unwrap();
    }
    assert!(matches!(
        parse_cose_sign1(&out).unwrap_err(),
        CoseError::UnexpectedField { field: "payload", .. }
    ));

    // Unprotected is an array.
    let mut out = Vec::new();
    {
        let mut enc = Encoder::new(&mut out);
        enc.array(4).unwrap();
        enc.bytes(&[]).unwrap();
        enc.array(0).unwrap();
        enc.null().unwrap();
        enc.bytes(b"sig").unwrap();
    }
    assert!(matches!(
        parse_cose_sign1(&out).unwrap_err(),
        CoseError::UnexpectedField { field: "unprotected headers", .. }
    ));
}

#[test]
fn parse_keeps_text_keys_in_headers() {
    let protected = {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.map(2).unwrap();
        enc.i64(1).unwrap();
        enc.i64(-35).unwrap();
        enc.str("custom").unwrap();
        enc.bool(true).unwrap();
        buf
    };
    let cose = encode_cose_sign1(&protected, &Default::default(), None, b"s", false).unwrap();
    let parsed = parse_cose_sign1(&cose).expect("parse");
    assert_eq!(
        parsed.protected_headers.map().get(&CborKey::Text("custom".to_string())),
        Some(&CborValue::Bool(true))
    );
}

#[test]
fn sig_structure_matches_manual_encoding() {
    let protected = [0xa1, 0x01, 0x26];
    let payload = [7u8; 32];
    let encoded = encode_sig_structure(&protected, &[], &payload).expect("sig_structure");

    let mut expected = Vec::new();
    {
        let mut enc = Encoder::new(&mut expected);
        enc.array(4).unwrap();
        enc.str("Signature1").unwrap();
        enc.bytes(&protected).unwrap();
        enc.bytes(&[]).unwrap();
        enc.bytes(&payload).unwrap();
    }
    assert_eq!(encoded, expected);
}
