//! Identity provider key document, served at the provider's well-known
//! PASETO endpoint.

use serde::{Deserialize, Serialize};

use crate::types::KeyId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderKeySet {
    pub issuer: String,
    pub version: String,
    pub keys: Vec<ProviderKey>,
    #[serde(default)]
    pub cache_ttl_seconds: u64,
}

impl ProviderKeySet {
    #[must_use]
    pub fn new(issuer: impl Into<String>, keys: Vec<ProviderKey>) -> Self {
        Self {
            issuer: issuer.into(),
            version: "v4".into(),
            keys,
            cache_ttl_seconds: 0,
        }
    }

    /// Key with the given id, if published.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&ProviderKey> {
        self.keys.iter().find(|k| k.kid.0 == kid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderKey {
    pub kid: KeyId,
    pub public_key_hex: String,
    pub status: KeyStatus,
    #[serde(default)]
    pub created_at: String,
}

impl ProviderKey {
    #[must_use]
    pub fn new(kid: impl Into<String>, public_key_hex: impl Into<String>, status: KeyStatus) -> Self {
        Self {
            kid: KeyId(kid.into()),
            public_key_hex: public_key_hex.into(),
            status,
            created_at: String::new(),
        }
    }
}

/// `Retiring` keys still verify; `Revoked` keys verify only when the caller
/// skips the revocation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum KeyStatus {
    Active,
    Retiring,
    Revoked,
}
