// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Transparency service clients used to fetch receipt signing keys.
//!
//! The verifier only needs one operation from a service: its current JWKS.
//! [`ClientFactory`] is the seam that lets callers substitute their own
//! transport (or a fixed key set in tests).

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::jwk::JwksDocument;

pub const DEFAULT_API_VERSION: &str = "2025-01-31-preview";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("invalid service endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("service returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("invalid JWKS document: {0}")]
    InvalidJwks(String),
}

/// Client bound to a single transparency service.
pub trait CodeTransparencyClient {
    /// Fetch the service's current signing keys.
    fn get_public_keys(&self) -> Result<JwksDocument, ClientError>;
}

/// Creates a client for an issuer host.
pub trait ClientFactory {
    fn create(&self, issuer: &str) -> Result<Box<dyn CodeTransparencyClient>, ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// `api-version` query value; `None` omits the parameter.
    pub api_version: Option<String>,
    pub timeout: Duration,
    /// Bearer token sent as `Authorization` when set.
    pub credential: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_version: Some(DEFAULT_API_VERSION.to_string()),
            timeout: DEFAULT_TIMEOUT,
            credential: None,
        }
    }
}

/// Builds [`HttpCodeTransparencyClient`]s sharing one set of options.
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory {
    options: ClientOptions,
}

impl HttpClientFactory {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(&self, issuer: &str) -> Result<Box<dyn CodeTransparencyClient>, ClientError> {
        Ok(Box::new(HttpCodeTransparencyClient::new(
            issuer,
            self.options.clone(),
        )?))
    }
}

/// Fetches `https://<issuer>/jwks` over HTTPS. No retries are attempted.
pub struct HttpCodeTransparencyClient {
    jwks_url: Url,
    credential: Option<String>,
    agent: ureq::Agent,
}

impl HttpCodeTransparencyClient {
    pub fn new(issuer: &str, options: ClientOptions) -> Result<Self, ClientError> {
        let jwks_url = jwks_url_for_issuer(issuer, options.api_version.as_deref())?;
        let agent = ureq::AgentBuilder::new().timeout(options.timeout).build();
        Ok(Self {
            jwks_url,
            credential: options.credential,
            agent,
        })
    }

    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }
}

impl CodeTransparencyClient for HttpCodeTransparencyClient {
    fn get_public_keys(&self) -> Result<JwksDocument, ClientError> {
        debug!(url = %self.jwks_url, "fetching transparency service keys");

        let mut request = self
            .agent
            .get(self.jwks_url.as_str())
            .set("Accept", "application/json");
        if let Some(token) = self.credential.as_deref() {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        let body = match request.call() {
            Ok(r) => {
                if r.status() != 200 {
                    return Err(ClientError::HttpStatus {
                        status: r.status(),
                        body: String::new(),
                    });
                }
                r.into_string()
                    .map_err(|e| ClientError::Transport(e.to_string()))?
            }
            Err(ureq::Error::Status(status, r)) => {
                let body = r.into_string().unwrap_or_default();
                return Err(ClientError::HttpStatus { status, body });
            }
            Err(e) => return Err(ClientError::Transport(e.to_string())),
        };

        JwksDocument::from_json(&body).map_err(|e| ClientError::InvalidJwks(e.to_string()))
    }
}

/// `https://<issuer>/jwks[?api-version=..]`.
///
/// A full URL is accepted as well; its path and query are replaced.
pub fn jwks_url_for_issuer(issuer: &str, api_version: Option<&str>) -> Result<Url, ClientError> {
    let base = if issuer.contains("://") {
        issuer.to_string()
    } else {
        format!("https://{issuer}")
    };

    let mut url = Url::parse(&base).map_err(|e| ClientError::InvalidEndpoint {
        endpoint: issuer.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ClientError::InvalidEndpoint {
            endpoint: issuer.to_string(),
            reason: "missing host".to_string(),
        });
    }
    url.set_path("/jwks");
    url.set_query(None);
    if let Some(v) = api_version {
        url.query_pairs_mut().append_pair("api-version", v);
    }
    Ok(url)
}
