// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Verification of CCF transparency receipts and SCITT transparent statements.
//!
//! - [`verify_receipt`] checks one receipt against a signed statement and a JWK.
//! - [`verify_transparent_statement`] checks every receipt embedded in a
//!   transparent statement and applies an authorization policy
//!   ([`VerificationOptions`]) across issuers.
//!
//! Receipt signing keys come from [`CodeTransparencyOfflineKeys`] or, when
//! allowed, from the issuing service's `/jwks` endpoint.

pub mod ccf;
pub mod client;
pub mod error;
pub mod jwk;
pub mod options;
pub mod receipt;
pub mod signing_key;
pub mod transparent_statement;

pub use client::{
    ClientError, ClientFactory, ClientOptions, CodeTransparencyClient, HttpClientFactory,
    HttpCodeTransparencyClient,
};
pub use error::{AggregateError, VerificationError};
pub use jwk::{Jwk, JwksDocument};
pub use options::{
    AuthorizedReceiptBehavior, CodeTransparencyOfflineKeys, OfflineKeysBehavior,
    UnauthorizedReceiptBehavior, VerificationOptions,
};
pub use receipt::{
    get_receipt_issuer_host, get_receipt_kid, trim_unprotected_headers, verify_receipt,
};
pub use signing_key::{EcVerificationKey, ReceiptAlgorithm};
pub use transparent_statement::{
    extract_receipts, verify_transparent_statement,
    verify_transparent_statement_with_client_options,
    verify_transparent_statement_with_factory, EmbeddedReceipt, UNKNOWN_ISSUER_PREFIX,
};
