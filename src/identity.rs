//! Identity provider session verification.
//!
//! When initial login is delegated to an external identity provider, the
//! session cookie holds the provider's `v4.public` session assertion. It is
//! verified here before the user service is ever called.

use std::time::Duration;

use url::Url;

use crate::credential::{Expected, PublicKey, VerifiedClaims, verify_public_token};
use crate::error::Error;
use crate::types::Subject;

/// Identity established by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: Subject,
    /// Empty when the provider does not release an email claim.
    pub email: String,
}

impl VerifiedIdentity {
    fn from_claims(claims: &VerifiedClaims) -> Result<Self, Error> {
        let subject = claims.require_str("sub")?;
        if subject.is_empty() {
            return Err(Error::Token("empty claim: sub".into()));
        }
        let email = claims
            .get_claim("email")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(Self {
            subject: Subject(subject.to_string()),
            email: email.to_string(),
        })
    }
}

/// Identity provider configuration.
///
/// Required fields are constructor parameters.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct IdentityProviderConfig {
    pub(crate) issuer: String,
    pub(crate) audience: String,
    pub(crate) keys_url: Url,
    pub(crate) timeout: Duration,
    pub(crate) check_revoked: bool,
}

impl IdentityProviderConfig {
    #[must_use]
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>, keys_url: Url) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            keys_url,
            timeout: Duration::from_secs(5),
            check_revoked: true,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `GATE_IDP_ISSUER`: expected `iss` claim
    /// - `GATE_IDP_AUDIENCE`: expected `aud` claim
    /// - `GATE_IDP_KEYS_URL`: well-known key document URL
    ///
    /// # Optional env vars
    /// - `GATE_IDP_TIMEOUT_MS`: request deadline in milliseconds
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required var is missing or a value is invalid.
    pub fn from_env() -> Result<Self, Error> {
        let issuer = required_env("GATE_IDP_ISSUER")?;
        let audience = required_env("GATE_IDP_AUDIENCE")?;
        let keys_url: Url = required_env("GATE_IDP_KEYS_URL")?
            .parse()
            .map_err(|e| Error::Config(format!("GATE_IDP_KEYS_URL: {e}")))?;

        let mut config = Self::new(issuer, audience, keys_url);
        if let Ok(ms) = std::env::var("GATE_IDP_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|e| Error::Config(format!("GATE_IDP_TIMEOUT_MS: {e}")))?;
            config = config.with_timeout(Duration::from_millis(ms));
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject assertions signed by a key the provider has revoked (default: on).
    #[must_use]
    pub fn with_check_revoked(mut self, check: bool) -> Self {
        self.check_revoked = check;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn keys_url(&self) -> &Url {
        &self.keys_url
    }

    #[must_use]
    pub fn check_revoked(&self) -> bool {
        self.check_revoked
    }
}

pub(crate) fn required_env(name: &str) -> Result<String, Error> {
    std::env::var(name).map_err(|_| Error::Config(format!("{name} is required")))
}

/// Verifies provider session assertions against the provider's published keys.
///
/// The key document is fetched for every verification; nothing is cached.
#[cfg(feature = "identity-provider")]
pub struct IdentityProviderClient {
    config: IdentityProviderConfig,
    http: reqwest::Client,
}

#[cfg(feature = "identity-provider")]
impl IdentityProviderClient {
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: IdentityProviderConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &IdentityProviderConfig {
        &self.config
    }

    /// Fetch the provider's current key document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::IdentityProvider`] on a non-success status or issuer mismatch.
    pub async fn fetch_keys(&self) -> Result<crate::well_known::ProviderKeySet, Error> {
        let response = self.http.get(self.config.keys_url.clone()).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(Error::IdentityProvider(format!(
                "key document request returned {status}"
            )));
        }

        let keys: crate::well_known::ProviderKeySet = response.json().await?;
        if keys.issuer != self.config.issuer {
            return Err(Error::IdentityProvider(format!(
                "key document issuer '{}' does not match '{}'",
                keys.issuer, self.config.issuer
            )));
        }
        Ok(keys)
    }

    /// Verify a provider session cookie and extract subject and email.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Token`] if the assertion is malformed, names an
    /// unknown or revoked key, fails signature or claim validation, or lacks
    /// a subject. Network failures surface as [`Error::Http`] or
    /// [`Error::IdentityProvider`].
    pub async fn verify_session_cookie(
        &self,
        cookie_value: &str,
        check_revoked: bool,
    ) -> Result<VerifiedIdentity, Error> {
        let kid = crate::credential::extract_kid_from_token(cookie_value)?;
        let keys = self.fetch_keys().await?;

        let key = keys
            .find(&kid)
            .ok_or_else(|| Error::Token(format!("unknown key id: {kid}")))?;
        if check_revoked && key.status == crate::well_known::KeyStatus::Revoked {
            return Err(Error::Token(format!("key revoked: {kid}")));
        }

        let public_key = crate::credential::parse_public_key_hex(&key.public_key_hex)?;
        let claims = verify_public_token(
            &public_key,
            cookie_value,
            Expected {
                issuer: &self.config.issuer,
                audience: &self.config.audience,
            },
        )?;
        VerifiedIdentity::from_claims(&claims)
    }
}

/// Verifies provider session assertions against a single pinned key.
///
/// For providers that publish one long-lived key, or for local development
/// against a provider emulator. No network access.
#[derive(Clone)]
pub struct PinnedKeyVerifier {
    public_key: PublicKey,
    issuer: String,
    audience: String,
}

impl PinnedKeyVerifier {
    #[must_use]
    pub fn new(public_key: PublicKey, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            public_key,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Token`] if the assertion fails verification or lacks a subject.
    pub fn verify_session_cookie(&self, cookie_value: &str) -> Result<VerifiedIdentity, Error> {
        let claims = verify_public_token(
            &self.public_key,
            cookie_value,
            Expected {
                issuer: &self.issuer,
                audience: &self.audience,
            },
        )?;
        VerifiedIdentity::from_claims(&claims)
    }
}
