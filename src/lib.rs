#![doc = include_str!("../README.md")]

pub mod credential;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod rpc;
pub mod types;
pub mod well_known;

// Re-exports for convenient access
pub use credential::{
    AUTHORIZATION_HEADER, CredentialClaims, CredentialIssuer, CredentialVerifier, PublicKey,
    SignedCredential, SigningKey, parse_public_key_hex,
};
pub use error::Error;
#[cfg(feature = "identity-provider")]
pub use identity::IdentityProviderClient;
pub use identity::{IdentityProviderConfig, PinnedKeyVerifier, VerifiedIdentity};
#[cfg(feature = "rpc")]
pub use rpc::AuthServiceClient;
pub use rpc::{AuthRequest, AuthResponse, RemoteUser, RpcConfig};
pub use types::{Role, SessionId, Subject, UserId};
pub use well_known::{KeyStatus, ProviderKey, ProviderKeySet};
