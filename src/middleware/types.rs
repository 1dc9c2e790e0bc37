use axum_extra::extract::cookie::Cookie;

use crate::credential::SignedCredential;
use crate::rpc::RemoteUser;
use crate::types::{Role, SessionId, UserId};

/// Login route of the gate that admitted the request.
///
/// Inserted next to [`IdentityContext`] so extractor rejections redirect to
/// the configured route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoginRoute(pub(crate) String);

/// Caller identity for one request.
///
/// Inserted into request extensions by the gate. Handlers behind the gate see
/// either a fully populated context or an anonymous one on pass-through routes
/// (login route, public paths); protected handlers never run otherwise.
///
/// # Data ownership
///
/// Request-scoped and never persisted. `credential` is minted for this request
/// only and must not be cached across requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityContext {
    pub caller_id: UserId,
    pub email: String,
    pub role: Role,
    pub payment_id: String,
    pub subscription_id: String,
    pub subscription_active: bool,
    /// Session token returned by the latest `Auth` call.
    pub session: SessionId,
    /// Credential for downstream RPCs made on the caller's behalf.
    pub credential: Option<SignedCredential>,
}

impl IdentityContext {
    /// Zero-value context: empty id, anonymous role.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub(crate) fn authenticated(
        session: SessionId,
        user: RemoteUser,
        credential: SignedCredential,
    ) -> Self {
        Self {
            caller_id: user.id,
            email: user.email,
            role: user.role,
            payment_id: user.payment_id.unwrap_or_default(),
            subscription_id: user.subscription_id.unwrap_or_default(),
            subscription_active: user.subscription_active,
            session,
            credential: Some(credential),
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.caller_id.is_empty() && !self.role.is_anonymous() && self.credential.is_some()
    }
}

/// What the adapter should do with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Authenticated: run downstream handlers with this identity.
    Proceed(IdentityContext),
    /// Not gated (login route, public path): run downstream with an anonymous identity.
    PassThrough(IdentityContext),
    /// Short-circuit with a redirect to this target.
    Redirect(String),
}

/// Result of evaluating one request.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub decision: Decision,
    /// Session cookie to write on the response, if any.
    pub cookie: Option<Cookie<'static>>,
}

impl GateOutcome {
    pub(crate) fn new(decision: Decision, cookie: Option<Cookie<'static>>) -> Self {
        Self { decision, cookie }
    }

    pub(crate) fn redirect(target: impl Into<String>) -> Self {
        Self::new(Decision::Redirect(target.into()), None)
    }

    #[must_use]
    pub fn redirect_target(&self) -> Option<&str> {
        match &self.decision {
            Decision::Redirect(target) => Some(target),
            _ => None,
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&IdentityContext> {
        match &self.decision {
            Decision::Proceed(identity) | Decision::PassThrough(identity) => Some(identity),
            Decision::Redirect(_) => None,
        }
    }
}
