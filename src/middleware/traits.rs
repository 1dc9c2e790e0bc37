use std::future::Future;
use std::sync::Arc;

use crate::credential::{CredentialIssuer, SignedCredential};
use crate::error::Error;
use crate::identity::{PinnedKeyVerifier, VerifiedIdentity};
use crate::rpc::{AuthRequest, AuthResponse};
use crate::types::SessionId;

/// Mints RPC credentials.
///
/// Implemented by [`CredentialIssuer`]; tests can substitute a failing signer.
pub trait CredentialSigner: Send + Sync + 'static {
    /// Sign a credential binding `session_ref` to `caller_id`. Either may be empty.
    fn sign(&self, session_ref: &str, caller_id: &str) -> Result<SignedCredential, Error>;
}

impl CredentialSigner for CredentialIssuer {
    fn sign(&self, session_ref: &str, caller_id: &str) -> Result<SignedCredential, Error> {
        CredentialIssuer::sign(self, session_ref, caller_id)
    }
}

/// Remote user service operations the gate depends on.
///
/// # Example
///
/// ```rust,ignore
/// impl AuthService for MyUsersClient {
///     async fn create_user(&self, credential: &SignedCredential) -> Result<SessionId, Error> {
///         self.grpc.create_user(credential.header()).await
///     }
///
///     async fn authenticate(
///         &self,
///         credential: &SignedCredential,
///         request: &AuthRequest,
///     ) -> Result<AuthResponse, Error> {
///         self.grpc.auth(credential.header(), request).await
///     }
/// }
/// ```
pub trait AuthService: Send + Sync + 'static {
    /// Redeem an exchange token (wrapped in `credential`) for a session id.
    fn create_user(
        &self,
        credential: &SignedCredential,
    ) -> impl Future<Output = Result<SessionId, Error>> + Send;

    /// Authenticate by signed credential. The response is returned as sent.
    fn authenticate(
        &self,
        credential: &SignedCredential,
        request: &AuthRequest,
    ) -> impl Future<Output = Result<AuthResponse, Error>> + Send;
}

impl<T: AuthService> AuthService for Arc<T> {
    fn create_user(
        &self,
        credential: &SignedCredential,
    ) -> impl Future<Output = Result<SessionId, Error>> + Send {
        (**self).create_user(credential)
    }

    fn authenticate(
        &self,
        credential: &SignedCredential,
        request: &AuthRequest,
    ) -> impl Future<Output = Result<AuthResponse, Error>> + Send {
        (**self).authenticate(credential, request)
    }
}

#[cfg(feature = "rpc")]
impl AuthService for crate::rpc::AuthServiceClient {
    async fn create_user(&self, credential: &SignedCredential) -> Result<SessionId, Error> {
        crate::rpc::AuthServiceClient::create_user(self, credential).await
    }

    async fn authenticate(
        &self,
        credential: &SignedCredential,
        request: &AuthRequest,
    ) -> Result<AuthResponse, Error> {
        crate::rpc::AuthServiceClient::authenticate(self, credential, request).await
    }
}

/// Verifies an identity provider session assertion.
pub trait IdentityVerifier: Send + Sync + 'static {
    fn verify(&self, cookie_value: &str)
    -> impl Future<Output = Result<VerifiedIdentity, Error>> + Send;
}

impl IdentityVerifier for PinnedKeyVerifier {
    async fn verify(&self, cookie_value: &str) -> Result<VerifiedIdentity, Error> {
        self.verify_session_cookie(cookie_value)
    }
}

#[cfg(feature = "identity-provider")]
impl IdentityVerifier for crate::identity::IdentityProviderClient {
    async fn verify(&self, cookie_value: &str) -> Result<VerifiedIdentity, Error> {
        let check_revoked = self.config().check_revoked();
        self.verify_session_cookie(cookie_value, check_revoked).await
    }
}

/// What primary verification establishes about a session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSession {
    /// Session reference signed into the `Auth` credential.
    pub session_ref: String,
    /// Caller id signed into the `Auth` credential.
    pub caller_id: String,
    /// Payload of the `Auth` call.
    pub request: AuthRequest,
}

/// First step of the cookie branch: turn a cookie value into something the
/// user service can authenticate.
///
/// The two deployment variants of the gate differ only here:
/// [`OpaqueSession`] hands the cookie to the user service untouched, while
/// [`IdentityProviderSession`] verifies a provider assertion first.
pub trait PrimaryVerifier: Send + Sync + 'static {
    fn verify(&self, cookie_value: &str)
    -> impl Future<Output = Result<VerifiedSession, Error>> + Send;

    /// `true` if the refreshed cookie holds the token returned by `Auth`;
    /// `false` if it keeps the verified cookie value.
    fn rotates_cookie(&self) -> bool;
}

/// Bearer-exchange variant: the cookie is a session id issued by the user
/// service, which is the only party able to verify it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueSession;

impl PrimaryVerifier for OpaqueSession {
    async fn verify(&self, cookie_value: &str) -> Result<VerifiedSession, Error> {
        Ok(VerifiedSession {
            session_ref: cookie_value.to_string(),
            caller_id: String::new(),
            request: AuthRequest::empty(),
        })
    }

    fn rotates_cookie(&self) -> bool {
        true
    }
}

/// Identity-provider variant: the cookie is a provider session assertion,
/// verified before the user service maps it to an account.
#[derive(Debug, Clone)]
pub struct IdentityProviderSession<V>(pub V);

impl<V: IdentityVerifier> PrimaryVerifier for IdentityProviderSession<V> {
    async fn verify(&self, cookie_value: &str) -> Result<VerifiedSession, Error> {
        let identity = self.0.verify(cookie_value).await?;
        Ok(VerifiedSession {
            session_ref: String::new(),
            caller_id: identity.subject.to_string(),
            request: AuthRequest::for_identity(&identity),
        })
    }

    fn rotates_cookie(&self) -> bool {
        false
    }
}
