use std::sync::Arc;

use super::config::{GateConfig, GateSettings};
use super::error::GateError;
use super::traits::{AuthService, CredentialSigner, PrimaryVerifier};

/// Process-wide collaborators injected into the gate at construction.
///
/// All three are immutable after startup and safe for concurrent use.
pub struct Collaborators<S, P, A> {
    pub signer: S,
    pub verifier: P,
    pub auth: A,
}

/// Per-request authentication gate.
///
/// Cheap to clone; every clone shares the same collaborators.
pub struct RequestGate<S, P, A> {
    pub(super) signer: Arc<S>,
    pub(super) verifier: Arc<P>,
    pub(super) auth: Arc<A>,
    pub(super) settings: GateSettings,
}

impl<S, P, A> RequestGate<S, P, A>
where
    S: CredentialSigner,
    P: PrimaryVerifier,
    A: AuthService,
{
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if `config` fails [`GateConfig::validate`],
    /// for example when the landing page sits under a public prefix.
    pub fn new(config: GateConfig, collaborators: Collaborators<S, P, A>) -> Result<Self, GateError> {
        config.validate()?;
        Ok(Self {
            signer: Arc::new(collaborators.signer),
            verifier: Arc::new(collaborators.verifier),
            auth: Arc::new(collaborators.auth),
            settings: config.settings,
        })
    }

    /// Login route this gate redirects to.
    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.settings.login_path
    }
}

// Manual Clone: avoid derive adding `S: Clone, P: Clone, A: Clone` bounds.
impl<S, P, A> Clone for RequestGate<S, P, A> {
    fn clone(&self) -> Self {
        Self {
            signer: self.signer.clone(),
            verifier: self.verifier.clone(),
            auth: self.auth.clone(),
            settings: self.settings.clone(),
        }
    }
}
