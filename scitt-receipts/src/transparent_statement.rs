// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Transparent-statement verification.
//!
//! A transparent statement is a signed statement carrying one or more receipts
//! in unprotected header 394. Each receipt is attributed to its issuer, keys are
//! resolved (offline first, then optionally over the network) and the outcome
//! of every receipt is folded through the caller's authorization policy.

use std::collections::{BTreeSet, HashMap};

use scitt_cose::{parse_cose_sign1, CborValue};
use tracing::{debug, warn};

use crate::ccf::decode_nested;
use crate::client::{
    ClientError, ClientFactory, ClientOptions, CodeTransparencyClient, HttpClientFactory,
};
use crate::error::{into_result, VerificationError};
use crate::jwk::{Jwk, JwksDocument};
use crate::options::{
    AuthorizedReceiptBehavior, OfflineKeysBehavior, UnauthorizedReceiptBehavior,
    VerificationOptions,
};
use crate::receipt::{
    get_receipt_issuer_host, get_receipt_kid, trim_unprotected_headers, verify_receipt,
};

pub const COSE_HEADER_EMBEDDED_RECEIPTS: i64 = 394;

/// Prefix of the placeholder issuer given to receipts without an issuer claim.
pub const UNKNOWN_ISSUER_PREFIX: &str = "__unknown-issuer::";

/// A receipt taken from a transparent statement, with its resolved issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedReceipt {
    pub issuer: String,
    pub bytes: Vec<u8>,
}

impl EmbeddedReceipt {
    pub fn has_unknown_issuer(&self) -> bool {
        self.issuer.starts_with(UNKNOWN_ISSUER_PREFIX)
    }
}

/// Verify a transparent statement, fetching keys over HTTPS when needed.
///
/// `None` options mean the defaults: no authorized domains, `VERIFY_ALL_MATCHING`,
/// `FAIL_IF_PRESENT` and network fallback.
pub fn verify_transparent_statement(
    transparent_statement: &[u8],
    options: Option<&VerificationOptions>,
) -> Result<(), VerificationError> {
    verify_transparent_statement_with_client_options(
        transparent_statement,
        options,
        ClientOptions::default(),
    )
}

pub fn verify_transparent_statement_with_client_options(
    transparent_statement: &[u8],
    options: Option<&VerificationOptions>,
    client_options: ClientOptions,
) -> Result<(), VerificationError> {
    let factory = HttpClientFactory::new(client_options);
    verify_transparent_statement_with_factory(transparent_statement, options, &factory)
}

/// Verify a transparent statement, creating service clients through `factory`.
pub fn verify_transparent_statement_with_factory(
    transparent_statement: &[u8],
    options: Option<&VerificationOptions>,
    factory: &dyn ClientFactory,
) -> Result<(), VerificationError> {
    let default_options;
    let options = match options {
        Some(o) => o,
        None => {
            default_options = VerificationOptions::default();
            &default_options
        }
    };

    let receipts = extract_receipts(transparent_statement)?;
    let authorized = normalize_authorized_domains(&options.authorized_domains);

    if authorized.is_empty()
        && options.unauthorized_receipt_behavior == UnauthorizedReceiptBehavior::IgnoreAll
    {
        return Err(VerificationError::NothingToVerify);
    }

    if options.unauthorized_receipt_behavior == UnauthorizedReceiptBehavior::FailIfPresent {
        if let Some(r) = receipts
            .iter()
            .find(|r| !authorized.contains(&r.issuer.to_lowercase()))
        {
            return Err(VerificationError::UnauthorizedIssuer(r.issuer.clone()));
        }
    }

    let signed_statement = trim_unprotected_headers(transparent_statement)?;

    let mut ctx = VerificationContext::new(options, factory, &authorized);
    for (index, receipt) in receipts.iter().enumerate() {
        ctx.verify(index, receipt, &signed_statement);
    }
    ctx.finish()
}

/// Pull the embedded receipts out of a transparent statement.
///
/// The receipt array may be embedded directly or carried as a bstr. Receipts
/// whose issuer claim is missing or empty get the placeholder
/// `__unknown-issuer::<index>`.
pub fn extract_receipts(
    transparent_statement: &[u8],
) -> Result<Vec<EmbeddedReceipt>, VerificationError> {
    let statement =
        parse_cose_sign1(transparent_statement).map_err(VerificationError::StatementDecode)?;

    let embedded = statement
        .unprotected_headers
        .get(COSE_HEADER_EMBEDDED_RECEIPTS)
        .ok_or(VerificationError::EmbeddedReceiptsNotFound)?;
    let embedded = decode_nested(embedded).map_err(VerificationError::StatementDecode)?;
    let items = embedded
        .as_array()
        .ok_or_else(|| VerificationError::EmbeddedReceiptsNotArray(embedded.kind()))?;

    let receipts = items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            CborValue::Bytes(bytes) => Ok(EmbeddedReceipt {
                issuer: get_receipt_issuer_host(bytes)
                    .filter(|issuer| !issuer.is_empty())
                    .unwrap_or_else(|| format!("{UNKNOWN_ISSUER_PREFIX}{index}")),
                bytes: bytes.clone(),
            }),
            _ => Err(VerificationError::EmbeddedReceiptNotBytes(index)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if receipts.is_empty() {
        return Err(VerificationError::NoReceipts);
    }
    Ok(receipts)
}

/// Lowercase and trim, dropping blanks and unknown-issuer placeholders.
fn normalize_authorized_domains(domains: &[String]) -> BTreeSet<String> {
    domains
        .iter()
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty() && !d.starts_with(UNKNOWN_ISSUER_PREFIX))
        .collect()
}

/// State for one verification call. Nothing here outlives the call.
struct VerificationContext<'a> {
    options: &'a VerificationOptions,
    factory: &'a dyn ClientFactory,
    authorized: &'a BTreeSet<String>,
    clients: HashMap<String, Box<dyn CodeTransparencyClient>>,
    fetched_keys: HashMap<String, Result<JwksDocument, ClientError>>,
    authorized_failures: Vec<VerificationError>,
    unauthorized_failures: Vec<VerificationError>,
    seen_authorized: BTreeSet<String>,
    validated_authorized: BTreeSet<String>,
}

impl<'a> VerificationContext<'a> {
    fn new(
        options: &'a VerificationOptions,
        factory: &'a dyn ClientFactory,
        authorized: &'a BTreeSet<String>,
    ) -> Self {
        Self {
            options,
            factory,
            authorized,
            clients: HashMap::new(),
            fetched_keys: HashMap::new(),
            authorized_failures: Vec::new(),
            unauthorized_failures: Vec::new(),
            seen_authorized: BTreeSet::new(),
            validated_authorized: BTreeSet::new(),
        }
    }

    fn verify(&mut self, index: usize, receipt: &EmbeddedReceipt, signed_statement: &[u8]) {
        let domain = receipt.issuer.to_lowercase();
        let is_authorized = self.authorized.contains(&domain);
        if is_authorized {
            self.seen_authorized.insert(domain.clone());
        } else if self.options.unauthorized_receipt_behavior
            != UnauthorizedReceiptBehavior::VerifyAll
        {
            debug!(index, issuer = %receipt.issuer, "skipping receipt from unauthorized issuer");
            return;
        }

        if receipt.has_unknown_issuer() {
            warn!(index, "receipt has no usable issuer claim");
            self.unauthorized_failures
                .push(VerificationError::UnknownIssuer(receipt.issuer.clone()));
            return;
        }

        let result = self
            .resolve_key(&receipt.issuer, &receipt.bytes)
            .and_then(|jwk| verify_receipt(&jwk, &receipt.bytes, signed_statement, false));

        match result {
            Ok(()) => {
                debug!(index, issuer = %receipt.issuer, "receipt verified");
                if is_authorized {
                    self.validated_authorized.insert(domain);
                }
            }
            Err(e) => {
                warn!(index, issuer = %receipt.issuer, error = %e, "receipt verification failed");
                let failure = VerificationError::ReceiptFailed {
                    index,
                    issuer: receipt.issuer.clone(),
                    source: Box::new(e),
                };
                if is_authorized {
                    self.authorized_failures.push(failure);
                } else {
                    self.unauthorized_failures.push(failure);
                }
            }
        }
    }

    /// Find the key named by the receipt's kid in the issuer's key set.
    fn resolve_key(&mut self, issuer: &str, receipt: &[u8]) -> Result<Jwk, VerificationError> {
        let kid = get_receipt_kid(receipt).ok_or(VerificationError::KidNotFound)?;

        let options = self.options;
        if let Some(doc) = options.offline_keys.as_ref().and_then(|k| k.get(issuer)) {
            debug!(issuer, kid = %kid, "using offline keys");
            return find_key(doc, issuer, &kid);
        }

        if options.offline_keys_behavior == OfflineKeysBehavior::NoFallbackToNetwork {
            return Err(VerificationError::NoKeysForIssuer(issuer.to_string()));
        }

        let doc = self.fetch_keys(issuer)?;
        find_key(doc, issuer, &kid)
    }

    /// Fetch an issuer's JWKS at most once per call; failures are remembered too.
    fn fetch_keys(&mut self, issuer: &str) -> Result<&JwksDocument, VerificationError> {
        if !self.fetched_keys.contains_key(issuer) {
            let fetched = self
                .client(issuer)
                .and_then(|client| client.get_public_keys());
            self.fetched_keys.insert(issuer.to_string(), fetched);
        }

        match self.fetched_keys.get(issuer) {
            Some(Ok(doc)) => Ok(doc),
            Some(Err(e)) => Err(VerificationError::KeyFetch {
                issuer: issuer.to_string(),
                source: e.clone(),
            }),
            None => Err(VerificationError::NoKeysForIssuer(issuer.to_string())),
        }
    }

    fn client(&mut self, issuer: &str) -> Result<&dyn CodeTransparencyClient, ClientError> {
        if !self.clients.contains_key(issuer) {
            let client = self.factory.create(issuer)?;
            self.clients.insert(issuer.to_string(), client);
        }
        self.clients
            .get(issuer)
            .map(|c| c.as_ref())
            .ok_or_else(|| ClientError::Transport(format!("no client for '{issuer}'")))
    }

    /// Apply the authorized-receipt policy and collapse all failures.
    fn finish(mut self) -> Result<(), VerificationError> {
        match self.options.authorized_receipt_behavior {
            AuthorizedReceiptBehavior::VerifyAnyMatching => {
                if !self.authorized.is_empty() && self.validated_authorized.is_empty() {
                    self.authorized_failures
                        .push(VerificationError::NoValidAuthorizedReceipts);
                } else if !self.validated_authorized.is_empty() {
                    // One good authorized receipt outweighs every bad one.
                    self.authorized_failures.clear();
                }
            }
            AuthorizedReceiptBehavior::VerifyAllMatching => {
                if !self.authorized.is_empty() && self.seen_authorized.is_empty() {
                    self.authorized_failures
                        .push(VerificationError::NoValidAuthorizedReceipts);
                }
                for domain in &self.seen_authorized {
                    if !self.validated_authorized.contains(domain) {
                        self.authorized_failures
                            .push(VerificationError::AuthorizedDomainFailed(domain.clone()));
                    }
                }
            }
            AuthorizedReceiptBehavior::RequireAll => {
                for domain in self.authorized {
                    if !self.validated_authorized.contains(domain) {
                        self.authorized_failures
                            .push(VerificationError::RequiredDomainMissing(domain.clone()));
                    }
                }
            }
        }

        let mut failures = self.authorized_failures;
        failures.append(&mut self.unauthorized_failures);
        into_result(failures)
    }
}

fn find_key(doc: &JwksDocument, issuer: &str, kid: &str) -> Result<Jwk, VerificationError> {
    if doc.is_empty() {
        return Err(VerificationError::EmptyJwks(issuer.to_string()));
    }
    doc.find(kid)
        .cloned()
        .ok_or_else(|| VerificationError::KeyNotFound {
            issuer: issuer.to_string(),
            kid: kid.to_string(),
        })
}
