//! Signed RPC credentials.
//!
//! The gateway mints a PASETO `v4.public` token for every outbound call to
//! the user service. The payload binds a session reference (`token`) to a
//! caller id (`user_id`) and expires after one hour. The user service checks
//! it with the matching Ed25519 public key; [`CredentialVerifier`] is that
//! check.

use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::{AsymmetricPublicKey, AsymmetricSecretKey};
use pasetors::token::UntrustedToken;
use pasetors::version4::V4;
use pasetors::{Public, public};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::Error;
use crate::types::{SessionId, UserId};

/// RPC metadata key carrying the signed credential.
pub const AUTHORIZATION_HEADER: &str = "x-authorization";

/// Default credential validity.
pub const CREDENTIAL_TTL: time::Duration = time::Duration::hours(1);

const SESSION_REF_CLAIM: &str = "token";
const CALLER_ID_CLAIM: &str = "user_id";

/// Ed25519 public key (32 bytes) for token verification.
#[derive(Clone)]
pub struct PublicKey {
    bytes: [u8; 32],
}

impl PublicKey {
    /// Get the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Parses a hex-encoded Ed25519 public key (32 bytes) into a `PublicKey`.
///
/// # Errors
///
/// Returns `Error::Token` if the hex is invalid or the key length is not 32 bytes.
pub fn parse_public_key_hex(public_key_hex: &str) -> Result<PublicKey, Error> {
    let bytes = hex::decode(public_key_hex.trim())
        .map_err(|e| Error::Token(format!("invalid hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(Error::Token(format!(
            "invalid key length: expected 32, got {}",
            bytes.len()
        )));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(PublicKey { bytes: arr })
}

/// Ed25519 signing key held by the gateway.
///
/// Stored in the PASETO v4 layout: 32-byte seed followed by the 32-byte
/// public key.
#[derive(Clone)]
pub struct SigningKey {
    bytes: [u8; 64],
}

impl SigningKey {
    /// Parses a hex-encoded 64-byte Ed25519 secret key (seed || public key).
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the hex is invalid or the length is not 64 bytes.
    pub fn from_hex(secret_key_hex: &str) -> Result<Self, Error> {
        let bytes = hex::decode(secret_key_hex.trim())
            .map_err(|e| Error::Config(format!("signing key: invalid hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// # Errors
    ///
    /// Returns `Error::Config` if `bytes` is not 64 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 64 {
            return Err(Error::Config(format!(
                "signing key: expected 64 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 64];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// The public half, for handing to the services that verify credentials.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&self.bytes[32..]);
        PublicKey { bytes: arr }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// A signed, time-boxed RPC credential.
///
/// Never persisted. Mint a new one for every outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCredential(String);

impl SignedCredential {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for the [`AUTHORIZATION_HEADER`] metadata entry.
    #[must_use]
    pub fn authorization_value(&self) -> String {
        format!("bearer {}", self.0)
    }

    /// `(key, value)` pair for attaching to an outbound RPC.
    #[must_use]
    pub fn header(&self) -> (&'static str, String) {
        (AUTHORIZATION_HEADER, self.authorization_value())
    }
}

impl std::fmt::Display for SignedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mints [`SignedCredential`]s with the gateway's private key.
#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    key: SigningKey,
    issuer: String,
    audience: String,
    ttl: time::Duration,
}

impl CredentialIssuer {
    #[must_use]
    pub fn new(key: SigningKey, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            key,
            issuer: issuer.into(),
            audience: audience.into(),
            ttl: CREDENTIAL_TTL,
        }
    }

    /// Override the credential validity (default: one hour).
    #[must_use]
    pub fn with_ttl(mut self, ttl: time::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Verifier matching this issuer's key, issuer and audience.
    #[must_use]
    pub fn verifier(&self) -> CredentialVerifier {
        CredentialVerifier::new(self.key.public_key(), &self.issuer, &self.audience)
    }

    /// Sign a credential binding `session_ref` to `caller_id`.
    ///
    /// Either argument may be empty; the exchange-token bootstrap call signs
    /// with an empty caller id.
    ///
    /// # Errors
    ///
    /// Returns `Error::Signing` if the key is rejected or a claim cannot be set.
    pub fn sign(&self, session_ref: &str, caller_id: &str) -> Result<SignedCredential, Error> {
        self.sign_at(session_ref, caller_id, OffsetDateTime::now_utc())
    }

    pub(crate) fn sign_at(
        &self,
        session_ref: &str,
        caller_id: &str,
        issued_at: OffsetDateTime,
    ) -> Result<SignedCredential, Error> {
        let sk = AsymmetricSecretKey::<V4>::from(&self.key.bytes[..])
            .map_err(|e| Error::Signing(e.to_string()))?;

        let iat = format_rfc3339(issued_at)?;
        let exp = format_rfc3339(issued_at + self.ttl)?;

        let mut claims = Claims::new().map_err(signing)?;
        claims.issued_at(&iat).map_err(signing)?;
        claims.not_before(&iat).map_err(signing)?;
        claims.expiration(&exp).map_err(signing)?;
        claims.issuer(&self.issuer).map_err(signing)?;
        claims.audience(&self.audience).map_err(signing)?;
        claims
            .add_additional(SESSION_REF_CLAIM, session_ref)
            .map_err(signing)?;
        claims
            .add_additional(CALLER_ID_CLAIM, caller_id)
            .map_err(signing)?;

        let token = public::sign(&sk, &claims, None, None).map_err(signing)?;
        Ok(SignedCredential(token))
    }
}

fn signing(e: pasetors::errors::Error) -> Error {
    Error::Signing(e.to_string())
}

fn format_rfc3339(at: OffsetDateTime) -> Result<String, Error> {
    at.format(&Rfc3339)
        .map_err(|e| Error::Signing(format!("timestamp: {e}")))
}

/// Payload decoded from a verified credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialClaims {
    pub session_ref: SessionId,
    pub caller_id: UserId,
}

/// Public-key counterpart of [`CredentialIssuer`].
#[derive(Clone)]
pub struct CredentialVerifier {
    public_key: PublicKey,
    issuer: String,
    audience: String,
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(public_key: PublicKey, issuer: &str, audience: &str) -> Self {
        Self {
            public_key,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        }
    }

    /// Verify signature, validity window, issuer and audience, then decode.
    ///
    /// # Errors
    ///
    /// Returns `Error::Token` on any verification failure, including expiry.
    pub fn verify(&self, credential: &str) -> Result<CredentialClaims, Error> {
        let claims = verify_public_token(
            &self.public_key,
            credential,
            Expected {
                issuer: &self.issuer,
                audience: &self.audience,
            },
        )?;
        Ok(CredentialClaims {
            session_ref: SessionId(claims.require_str(SESSION_REF_CLAIM)?.to_string()),
            caller_id: UserId(claims.require_str(CALLER_ID_CLAIM)?.to_string()),
        })
    }
}

/// Verified claims from a PASETO token.
#[derive(Debug, Clone)]
pub struct VerifiedClaims {
    inner: JsonValue,
}

impl VerifiedClaims {
    /// Gets a claim value by key.
    #[must_use]
    pub fn get_claim(&self, key: &str) -> Option<&JsonValue> {
        self.inner.get(key)
    }

    /// Gets a string claim, failing if it is absent or not a string.
    ///
    /// # Errors
    ///
    /// Returns `Error::Token` naming the missing claim.
    pub fn require_str(&self, key: &str) -> Result<&str, Error> {
        self.inner
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Token(format!("missing claim: {key}")))
    }

    /// Gets the inner JSON value.
    #[must_use]
    pub fn as_json(&self) -> &JsonValue {
        &self.inner
    }
}

/// Issuer and audience a `v4.public` token must carry.
#[derive(Debug, Clone, Copy)]
pub struct Expected<'a> {
    pub issuer: &'a str,
    pub audience: &'a str,
}

impl Expected<'_> {
    fn check(&self, claims: &VerifiedClaims) -> Result<(), Error> {
        for (claim, want) in [("iss", self.issuer), ("aud", self.audience)] {
            let got = claims.require_str(claim)?;
            if got != want {
                return Err(Error::Token(format!(
                    "{claim}: expected '{want}', got '{got}'"
                )));
            }
        }
        Ok(())
    }
}

/// Verify a PASETO `v4.public` token and return its payload.
///
/// # Errors
///
/// Returns `Error::Token` if the token is malformed, the signature does not
/// match `public_key`, the token is outside its validity window, or `iss`/`aud`
/// differ from `expected`.
pub fn verify_public_token(
    public_key: &PublicKey,
    token: &str,
    expected: Expected<'_>,
) -> Result<VerifiedClaims, Error> {
    let pk = AsymmetricPublicKey::<V4>::from(&public_key.bytes[..]).map_err(token_error)?;
    let untrusted = UntrustedToken::<Public, V4>::try_from(token).map_err(token_error)?;

    // Default rules check exp, nbf and iat. Any footer is covered by the signature.
    let trusted = public::verify(&pk, &untrusted, &ClaimsValidationRules::new(), None, None)
        .map_err(token_error)?;

    let claims = VerifiedClaims {
        inner: serde_json::from_str(trusted.payload())
            .map_err(|e| Error::Token(format!("payload: {e}")))?,
    };
    expected.check(&claims)?;
    Ok(claims)
}

#[derive(Deserialize)]
struct KeyIdFooter {
    kid: String,
}

/// Read the `kid` footer claim of a `v4.public` token without verifying it.
///
/// The result only selects which key to verify with.
///
/// # Errors
///
/// Returns `Error::Token` if the token is malformed or the footer has no `kid`.
pub fn extract_kid_from_token(token: &str) -> Result<String, Error> {
    let untrusted = UntrustedToken::<Public, V4>::try_from(token).map_err(token_error)?;
    let footer: KeyIdFooter = serde_json::from_slice(untrusted.untrusted_footer())
        .map_err(|_| Error::Token("missing footer claim: kid".into()))?;
    Ok(footer.kid)
}

fn token_error(e: pasetors::errors::Error) -> Error {
    Error::Token(e.to_string())
}
