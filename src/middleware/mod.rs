//! Per-request authentication gate for Axum.
//!
//! Resolves the caller from the session cookie (or redeems a one-time
//! exchange token), attaches an [`IdentityContext`] to the request, and
//! redirects to the login route whenever that fails.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use edge_gate::middleware::{Collaborators, GateConfig, OpaqueSession, RequestGate, protect};
//!
//! // 1. Load the signing key and build the collaborators once at startup
//! let signer = CredentialIssuer::new(SigningKey::from_hex(&key_hex)?, "edge-gate", "users");
//! let auth = AuthServiceClient::new(RpcConfig::from_env()?)?;
//!
//! // 2. Configure the gate from the environment
//! let gate = RequestGate::new(
//!     GateConfig::from_env()?,
//!     Collaborators { signer, verifier: OpaqueSession, auth },
//! )?;
//!
//! // 3. Put the application routes behind it
//! let app = protect(app_routes, gate);
//!
//! // 4. Read the caller in handlers
//! async fn notes(Authenticated(caller): Authenticated) -> impl IntoResponse { ... }
//! ```

mod config;
mod cookies;
mod error;
mod extractor;
mod gate;
mod routes;
mod state;
mod traits;
mod types;

pub use config::GateConfig;
pub use error::GateError;
pub use extractor::{Authenticated, AuthenticatedRejection};
pub use routes::{gate_request, protect};
pub use state::{Collaborators, RequestGate};
pub use traits::{
    AuthService, CredentialSigner, IdentityProviderSession, IdentityVerifier, OpaqueSession,
    PrimaryVerifier, VerifiedSession,
};
pub use types::{Decision, GateOutcome, IdentityContext};
