// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! JSON Web Key types as published by transparency services at `/jwks`.

use base64::Engine;
use serde::{Deserialize, Serialize};

/// A single public key in JWK form.
///
/// Only the EC members are modelled; unknown members are ignored on input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
}

impl Jwk {
    /// Copy of this key restricted to verification.
    ///
    /// Receipt keys are only ever used to verify, so `key_ops` is forced to
    /// `["verify"]` whatever the publisher declared.
    pub fn normalized_for_verification(&self) -> Jwk {
        Jwk {
            key_ops: Some(vec!["verify".to_string()]),
            ..self.clone()
        }
    }
}

/// A JWK Set document: `{ "keys": [ ... ] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwksDocument {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl JwksDocument {
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self { keys }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// First key whose `kid` equals `kid` exactly.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

/// Decode base64url, tolerating both padded and unpadded input.
pub fn decode_base64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let trimmed = value.trim_end_matches('=');
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(trimmed)
}
