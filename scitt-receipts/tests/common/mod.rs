// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(dead_code)]

//! Shared helpers for the `scitt-receipts` integration tests.
//!
//! Receipts and statements are built by hand with `minicbor` so each test can
//! tamper with exactly one field and observe the verifier's reaction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use minicbor::Encoder;
use p256::ecdsa::signature::Signer;
use rand_core::OsRng;
use scitt_receipts::{
    ClientError, ClientFactory, CodeTransparencyClient, Jwk, JwksDocument,
};
use sha2::{Digest, Sha256};

pub const PROTECTED_STATEMENT_HEADERS: [u8; 3] = [0xa1, 0x01, 0x26]; // { 1: -7 }
pub const STATEMENT_PAYLOAD: &[u8] = b"{\"artifact\":\"sha256:abc\"}";
pub const STATEMENT_SIGNATURE: &[u8] = b"statement-signature";

pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

fn sha256_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(left);
    h.update(right);
    h.finalize().into()
}

enum Signing {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
}

/// A ledger signing key together with the kid it is published under.
pub struct TestKey {
    pub kid: String,
    signing: Signing,
}

impl TestKey {
    pub fn p256(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            signing: Signing::P256(p256::ecdsa::SigningKey::random(&mut OsRng)),
        }
    }

    pub fn p384(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            signing: Signing::P384(p384::ecdsa::SigningKey::random(&mut OsRng)),
        }
    }

    pub fn p521(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            signing: Signing::P521(p521::ecdsa::SigningKey::random(&mut OsRng)),
        }
    }

    pub fn cose_alg(&self) -> i64 {
        match self.signing {
            Signing::P256(_) => -7,
            Signing::P384(_) => -35,
            Signing::P521(_) => -36,
        }
    }

    pub fn crv(&self) -> &'static str {
        match self.signing {
            Signing::P256(_) => "P-256",
            Signing::P384(_) => "P-384",
            Signing::P521(_) => "P-521",
        }
    }

    pub fn jwk(&self) -> Jwk {
        let (x, y) = match &self.signing {
            Signing::P256(sk) => {
                let point = sk.verifying_key().to_encoded_point(false);
                (
                    point.x().expect("x").to_vec(),
                    point.y().expect("y").to_vec(),
                )
            }
            Signing::P384(sk) => {
                let point = sk.verifying_key().to_encoded_point(false);
                (
                    point.x().expect("x").to_vec(),
                    point.y().expect("y").to_vec(),
                )
            }
            Signing::P521(sk) => {
                let vk = p521::ecdsa::VerifyingKey::from(sk);
                let point = vk.to_encoded_point(false);
                (
                    point.x().expect("x").to_vec(),
                    point.y().expect("y").to_vec(),
                )
            }
        };

        Jwk {
            kty: Some("EC".to_string()),
            kid: Some(self.kid.clone()),
            crv: Some(self.crv().to_string()),
            x: Some(URL_SAFE_NO_PAD.encode(x)),
            y: Some(URL_SAFE_NO_PAD.encode(y)),
            key_ops: None,
        }
    }

    pub fn jwks(&self) -> JwksDocument {
        JwksDocument::new(vec![self.jwk()])
    }

    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        match &self.signing {
            Signing::P256(sk) => {
                let sig: p256::ecdsa::Signature = sk.sign(msg);
                sig.to_bytes().to_vec()
            }
            Signing::P384(sk) => {
                let sig: p384::ecdsa::Signature = sk.sign(msg);
                sig.to_bytes().to_vec()
            }
            Signing::P521(sk) => {
                let sig: p521::ecdsa::Signature = sk.sign(msg);
                sig.to_bytes().to_vec()
            }
        }
    }
}

/// The signed statement a receipt commits to (empty unprotected headers).
pub fn signed_statement() -> Vec<u8> {
    encode_statement(|enc| {
        enc.map(0).unwrap();
    })
}

/// Signed statement with `receipts` embedded under label 394.
pub fn transparent_statement(receipts: &[Vec<u8>]) -> Vec<u8> {
    encode_statement(|enc| {
        enc.map(1).unwrap();
        enc.i64(394).unwrap();
        enc.array(receipts.len() as u64).unwrap();
        for r in receipts {
            enc.bytes(r).unwrap();
        }
    })
}

/// Encode a tagged statement, letting the caller write the unprotected map.
pub fn encode_statement(unprotected: impl FnOnce(&mut Encoder<&mut Vec<u8>>)) -> Vec<u8> {
    let mut out = Vec::new();
    let mut enc = Encoder::new(&mut out);
    enc.tag(minicbor::data::Tag::new(18)).unwrap();
    enc.array(4).unwrap();
    enc.bytes(&PROTECTED_STATEMENT_HEADERS).unwrap();
    unprotected(&mut enc);
    enc.bytes(STATEMENT_PAYLOAD).unwrap();
    enc.bytes(STATEMENT_SIGNATURE).unwrap();
    out
}

/// Every knob of a receipt; [`ReceiptFixture::build`] signs over whatever is set.
#[derive(Clone)]
pub struct ReceiptFixture {
    pub issuer: Option<String>,
    pub issuer_claims_as_bytes: bool,
    pub alg: Option<i64>,
    pub kid: Option<Vec<u8>>,
    pub vds: Option<i64>,
    pub txn_digest: [u8; 32],
    pub evidence: String,
    pub data_digest: [u8; 32],
    pub path: Vec<(bool, [u8; 32])>,
    /// Replaces the whole VDP header value when set.
    pub vdp_override: Option<VdpOverride>,
}

#[derive(Clone)]
pub enum VdpOverride {
    Absent,
    /// Raw CBOR written as the VDP value.
    Raw(Vec<u8>),
    /// VDP map carried as a bstr.
    WrappedMap,
}

impl ReceiptFixture {
    /// A valid receipt from `issuer` for `signed_statement`.
    pub fn new(key: &TestKey, issuer: &str, signed_statement: &[u8]) -> Self {
        Self {
            issuer: Some(issuer.to_string()),
            issuer_claims_as_bytes: false,
            alg: Some(key.cose_alg()),
            kid: Some(key.kid.as_bytes().to_vec()),
            vds: Some(2),
            txn_digest: sha256(b"txn"),
            evidence: "ce:2.17:abcdef".to_string(),
            data_digest: sha256(signed_statement),
            path: vec![(true, sha256(b"sibling-0")), (false, sha256(b"sibling-1"))],
            vdp_override: None,
        }
    }

    pub fn root(&self) -> [u8; 32] {
        let mut h = Sha256::new();
        h.update(self.txn_digest);
        h.update(sha256(self.evidence.as_bytes()));
        h.update(self.data_digest);
        let leaf: [u8; 32] = h.finalize().into();

        self.path.iter().fold(leaf, |acc, (left, digest)| {
            if *left {
                sha256_pair(digest, &acc)
            } else {
                sha256_pair(&acc, digest)
            }
        })
    }

    pub fn protected_headers(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut enc = Encoder::new(&mut out);
        let entries = [
            self.alg.is_some(),
            self.kid.is_some(),
            self.issuer.is_some(),
            self.vds.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count();
        enc.map(entries as u64).unwrap();
        if let Some(alg) = self.alg {
            enc.i64(1).unwrap();
            enc.i64(alg).unwrap();
        }
        if let Some(kid) = &self.kid {
            enc.i64(4).unwrap();
            enc.bytes(kid).unwrap();
        }
        if let Some(issuer) = &self.issuer {
            enc.i64(15).unwrap();
            let mut claims = Vec::new();
            {
                let mut c = Encoder::new(&mut claims);
                c.map(1).unwrap();
                c.i64(1).unwrap();
                c.str(issuer).unwrap();
            }
            if self.issuer_claims_as_bytes {
                enc.bytes(&claims).unwrap();
            } else {
                enc.writer_mut().extend_from_slice(&claims);
            }
        }
        if let Some(vds) = self.vds {
            enc.i64(395).unwrap();
            enc.i64(vds).unwrap();
        }
        out
    }

    pub fn inclusion_proof(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut enc = Encoder::new(&mut out);
        enc.map(2).unwrap();
        enc.i64(1).unwrap();
        enc.array(3).unwrap();
        enc.bytes(&self.txn_digest).unwrap();
        enc.str(&self.evidence).unwrap();
        enc.bytes(&self.data_digest).unwrap();
        enc.i64(2).unwrap();
        enc.array(self.path.len() as u64).unwrap();
        for (left, digest) in &self.path {
            enc.array(2).unwrap();
            enc.bool(*left).unwrap();
            enc.bytes(digest).unwrap();
        }
        out
    }

    /// Sign the Sig_structure over the computed root with `key`.
    pub fn build(&self, key: &TestKey) -> Vec<u8> {
        let protected = self.protected_headers();
        let sig_structure =
            scitt_cose::encode_sig_structure(&protected, &[], &self.root()).unwrap();
        let signature = key.sign(&sig_structure);
        self.encode_with_signature(&protected, &signature)
    }

    pub fn encode_with_signature(&self, protected: &[u8], signature: &[u8]) -> Vec<u8> {
        let proof = self.inclusion_proof();

        let mut out = Vec::new();
        let mut enc = Encoder::new(&mut out);
        enc.array(4).unwrap();
        enc.bytes(protected).unwrap();
        match &self.vdp_override {
            Some(VdpOverride::Absent) => {
                enc.map(0).unwrap();
            }
            Some(VdpOverride::Raw(raw)) => {
                enc.map(1).unwrap();
                enc.i64(396).unwrap();
                enc.writer_mut().extend_from_slice(raw);
            }
            Some(VdpOverride::WrappedMap) => {
                let mut vdp = Vec::new();
                {
                    let mut v = Encoder::new(&mut vdp);
                    v.map(1).unwrap();
                    v.i64(-1).unwrap();
                    v.array(1).unwrap();
                    v.bytes(&proof).unwrap();
                }
                enc.map(1).unwrap();
                enc.i64(396).unwrap();
                enc.bytes(&vdp).unwrap();
            }
            None => {
                enc.map(1).unwrap();
                enc.i64(396).unwrap();
                enc.map(1).unwrap();
                enc.i64(-1).unwrap();
                enc.array(1).unwrap();
                enc.bytes(&proof).unwrap();
            }
        }
        enc.null().unwrap();
        enc.bytes(signature).unwrap();
        out
    }
}

/// A valid receipt from `issuer` over [`signed_statement`].
pub fn receipt_for(key: &TestKey, issuer: &str) -> Vec<u8> {
    ReceiptFixture::new(key, issuer, &signed_statement()).build(key)
}

/// A receipt whose signature does not verify.
pub fn tampered_receipt_for(key: &TestKey, issuer: &str) -> Vec<u8> {
    let fixture = ReceiptFixture::new(key, issuer, &signed_statement());
    let protected = fixture.protected_headers();
    let sig_structure = scitt_cose::encode_sig_structure(&protected, &[], &fixture.root()).unwrap();
    let mut signature = key.sign(&sig_structure);
    signature[0] ^= 0x01;
    fixture.encode_with_signature(&protected, &signature)
}

/// Factory handing out fixed key sets and recording every call.
#[derive(Default)]
pub struct RecordingFactory {
    documents: HashMap<String, JwksDocument>,
    pub created: Arc<Mutex<Vec<String>>>,
    pub fetched: Arc<Mutex<Vec<String>>>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(mut self, issuer: &str, jwks: JwksDocument) -> Self {
        self.documents.insert(issuer.to_string(), jwks);
        self
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl ClientFactory for RecordingFactory {
    fn create(&self, issuer: &str) -> Result<Box<dyn CodeTransparencyClient>, ClientError> {
        self.created.lock().unwrap().push(issuer.to_string());
        Ok(Box::new(RecordingClient {
            issuer: issuer.to_string(),
            document: self.documents.get(issuer).cloned(),
            fetched: Arc::clone(&self.fetched),
        }))
    }
}

struct RecordingClient {
    issuer: String,
    document: Option<JwksDocument>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl CodeTransparencyClient for RecordingClient {
    fn get_public_keys(&self) -> Result<JwksDocument, ClientError> {
        self.fetched.lock().unwrap().push(self.issuer.clone());
        self.document.clone().ok_or(ClientError::HttpStatus {
            status: 404,
            body: "not found".to_string(),
        })
    }
}

/// Factory that must never be reached.
pub struct PanickingFactory;

impl ClientFactory for PanickingFactory {
    fn create(&self, issuer: &str) -> Result<Box<dyn CodeTransparencyClient>, ClientError> {
        panic!("unexpected client creation for {issuer}");
    }
}
