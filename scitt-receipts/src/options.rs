// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Policy knobs for transparent-statement verification.
//!
//! All types deserialize from JSON so verification policy can live in a
//! configuration file. Enum values use `SCREAMING_SNAKE_CASE`, e.g.
//!
//! ```json
//! {
//!   "authorized_domains": ["ledger.example.com"],
//!   "authorized_receipt_behavior": "REQUIRE_ALL",
//!   "unauthorized_receipt_behavior": "IGNORE_ALL",
//!   "offline_keys_behavior": "NO_FALLBACK_TO_NETWORK",
//!   "offline_keys": { "by_issuer": { "ledger.example.com": { "keys": [] } } }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::VerificationError;
use crate::jwk::JwksDocument;

/// What to do with receipts whose issuer is not an authorized domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnauthorizedReceiptBehavior {
    /// Verify them too; failures are reported.
    VerifyAll,
    /// Skip them entirely.
    IgnoreAll,
    /// Reject the statement before any cryptographic work.
    #[default]
    FailIfPresent,
}

/// How many receipts from authorized domains must verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizedReceiptBehavior {
    /// One valid authorized receipt is enough.
    VerifyAnyMatching,
    /// Every authorized receipt present must verify.
    #[default]
    VerifyAllMatching,
    /// Every authorized domain must contribute a valid receipt.
    RequireAll,
}

/// Whether a network JWKS fetch may be used when offline keys lack an issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfflineKeysBehavior {
    #[default]
    FallbackToNetwork,
    NoFallbackToNetwork,
}

/// Pre-provisioned JWKS documents keyed by issuer host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeTransparencyOfflineKeys {
    pub by_issuer: BTreeMap<String, JwksDocument>,
}

impl CodeTransparencyOfflineKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the keys for an issuer.
    pub fn add_issuer_keys(&mut self, issuer: impl Into<String>, jwks: JwksDocument) {
        self.by_issuer.insert(issuer.into(), jwks);
    }

    /// Keys for `issuer`: exact match first, then a case-insensitive match.
    pub fn get(&self, issuer: &str) -> Option<&JwksDocument> {
        self.by_issuer.get(issuer).or_else(|| {
            self.by_issuer
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(issuer))
                .map(|(_, v)| v)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.by_issuer.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self, VerificationError> {
        serde_json::from_str(json).map_err(|e| VerificationError::InvalidOptions(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationOptions {
    /// Issuer hosts trusted by the caller. Matched case-insensitively.
    pub authorized_domains: Vec<String>,
    pub authorized_receipt_behavior: AuthorizedReceiptBehavior,
    pub unauthorized_receipt_behavior: UnauthorizedReceiptBehavior,
    pub offline_keys: Option<CodeTransparencyOfflineKeys>,
    pub offline_keys_behavior: OfflineKeysBehavior,
}

impl VerificationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, VerificationError> {
        serde_json::from_str(json).map_err(|e| VerificationError::InvalidOptions(e.to_string()))
    }

    pub fn with_authorized_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_authorized_receipt_behavior(mut self, behavior: AuthorizedReceiptBehavior) -> Self {
        self.authorized_receipt_behavior = behavior;
        self
    }

    pub fn with_unauthorized_receipt_behavior(
        mut self,
        behavior: UnauthorizedReceiptBehavior,
    ) -> Self {
        self.unauthorized_receipt_behavior = behavior;
        self
    }

    pub fn with_offline_keys(mut self, keys: CodeTransparencyOfflineKeys) -> Self {
        self.offline_keys = Some(keys);
        self
    }

    pub fn with_offline_keys_behavior(mut self, behavior: OfflineKeysBehavior) -> Self {
        self.offline_keys_behavior = behavior;
        self
    }
}
