//! The per-request authentication state machine.
//!
//! Checks run in a fixed order: login route, public paths, exchange token,
//! root shortcut, then the session cookie. The exchange token and the root
//! shortcut come before the cookie check so a first-time arrival from the
//! identity provider is not bounced to login for lacking a cookie it does not
//! have yet. The root shortcut only redirects to the landing page, which is
//! itself gated, so it never grants access on its own.

use std::future::Future;
use std::time::Instant;

use axum::http::Uri;
use axum_extra::extract::CookieJar;

use super::cookies;
use super::error::GateError;
use super::state::RequestGate;
use super::traits::{AuthService, CredentialSigner, PrimaryVerifier};
use super::types::{Decision, GateOutcome, IdentityContext};
use crate::error::Error;

impl<S, P, A> RequestGate<S, P, A>
where
    S: CredentialSigner,
    P: PrimaryVerifier,
    A: AuthService,
{
    /// Decide what happens to one request.
    ///
    /// Never fails: every error becomes a redirect to the login route.
    pub async fn evaluate(&self, uri: &Uri, jar: &CookieJar) -> GateOutcome {
        let started = Instant::now();
        let outcome = match self.resolve(uri, jar).await {
            Ok(outcome) => outcome,
            Err(e) => self.reject(e),
        };
        tracing::debug!(
            path = %uri.path(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Authorization"
        );
        outcome
    }

    async fn resolve(&self, uri: &Uri, jar: &CookieJar) -> Result<GateOutcome, GateError> {
        let settings = &self.settings;
        let path = uri.path();

        if path == settings.login_path {
            return Ok(GateOutcome::new(
                Decision::PassThrough(IdentityContext::anonymous()),
                Some(cookies::clear_session_cookie(settings)),
            ));
        }

        if settings.is_public(path) {
            return Ok(GateOutcome::new(
                Decision::PassThrough(IdentityContext::anonymous()),
                None,
            ));
        }

        if let Some(exchange_token) = self.exchange_token(uri) {
            return self.redeem(&exchange_token).await;
        }

        if path == "/" {
            return Ok(GateOutcome::redirect(settings.landing_path.clone()));
        }

        let cookie = cookies::get_session(jar, settings).ok_or(GateError::NoSession)?;
        self.authenticate(cookie).await
    }

    fn exchange_token(&self, uri: &Uri) -> Option<String> {
        let query = uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key.as_ref() == self.settings.exchange_param.as_str())
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }

    async fn redeem(&self, exchange_token: &str) -> Result<GateOutcome, GateError> {
        let credential = self
            .signer
            .sign(exchange_token, "")
            .map_err(|e| GateError::SigningFailure(e.to_string()))?;

        let session_id = self
            .deadline("CreateUser", self.auth.create_user(&credential))
            .await
            .map_err(|e| GateError::ExchangeRedemptionFailure(e.to_string()))?;
        if session_id.is_empty() {
            return Err(GateError::ExchangeRedemptionFailure(
                "CreateUser returned an empty id".into(),
            ));
        }

        tracing::info!("Exchange token redeemed");

        let cookie = cookies::session_cookie(
            &self.settings,
            session_id.to_string(),
            self.settings.bootstrap_ttl,
        );
        Ok(GateOutcome::new(
            Decision::Redirect(self.settings.landing_path.clone()),
            Some(cookie),
        ))
    }

    async fn authenticate(&self, cookie: String) -> Result<GateOutcome, GateError> {
        let session = self
            .deadline("verify", self.verifier.verify(&cookie))
            .await
            .map_err(|e| GateError::VerificationFailure(e.to_string()))?;

        let credential = self
            .signer
            .sign(&session.session_ref, &session.caller_id)
            .map_err(|e| GateError::SigningFailure(e.to_string()))?;

        let (token, user) = self
            .deadline("Auth", self.auth.authenticate(&credential, &session.request))
            .await
            .and_then(|response| response.into_complete())
            .map_err(|e| GateError::AuthenticationFailure(e.to_string()))?;

        let rpc_credential = self
            .signer
            .sign(token.as_str(), user.id.as_str())
            .map_err(|e| GateError::SigningFailure(e.to_string()))?;

        let cookie_value = if self.verifier.rotates_cookie() {
            token.to_string()
        } else {
            cookie
        };
        let refreshed =
            cookies::session_cookie(&self.settings, cookie_value, self.settings.session_ttl);

        tracing::debug!(user_id = %user.id, role = %user.role, "Caller authenticated");

        let identity = IdentityContext::authenticated(token, user, rpc_credential);
        Ok(GateOutcome::new(Decision::Proceed(identity), Some(refreshed)))
    }

    /// Bound a remote call by the configured deadline. Expiry is a failure.
    async fn deadline<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        match tokio::time::timeout(self.settings.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Rpc {
                operation,
                status: None,
                detail: "deadline exceeded".into(),
            }),
        }
    }

    fn reject(&self, error: GateError) -> GateOutcome {
        match &error {
            GateError::NoSession => tracing::info!("No session cookie"),
            GateError::SigningFailure(_) | GateError::Config(_) => {
                tracing::error!(error = %error, "Gate failure")
            }
            _ => tracing::warn!(error = %error, "Request not authenticated"),
        }

        // A cookie that failed verification is dropped so the browser stops sending it.
        let cookie = matches!(error, GateError::VerificationFailure(_))
            .then(|| cookies::clear_session_cookie(&self.settings));
        GateOutcome::new(
            Decision::Redirect(error.redirect_target(&self.settings)),
            cookie,
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::http::header::COOKIE;
    use axum::http::{HeaderMap, HeaderValue};

    use super::*;
    use crate::credential::tests::test_issuer;
    use crate::credential::{CredentialVerifier, SignedCredential};
    use crate::identity::tests::{pinned, provider_assertion, provider_keypair};
    use crate::identity::PinnedKeyVerifier;
    use crate::middleware::config::GateConfig;
    use crate::middleware::state::Collaborators;
    use crate::middleware::traits::{IdentityProviderSession, OpaqueSession};
    use crate::rpc::{AuthRequest, AuthResponse, RemoteUser};
    use crate::types::{Role, SessionId};

    pub(crate) struct FakeAuth {
        pub(crate) create_user: fn() -> Result<SessionId, Error>,
        pub(crate) authenticate: fn() -> Result<AuthResponse, Error>,
        pub(crate) delay: Duration,
        pub(crate) create_calls: AtomicUsize,
        pub(crate) auth_calls: AtomicUsize,
        pub(crate) seen: Mutex<Vec<(String, AuthRequest)>>,
    }

    impl FakeAuth {
        pub(crate) fn new() -> Self {
            Self {
                create_user: || Ok(SessionId("sess-new".into())),
                authenticate: || {
                    Ok(AuthResponse::new(
                        "t-2",
                        RemoteUser::new("u-1", "a@example.com", Role::User)
                            .with_payment_id("cus_1")
                            .with_subscription("sub_1", true),
                    ))
                },
                delay: Duration::ZERO,
                create_calls: AtomicUsize::new(0),
                auth_calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst) + self.auth_calls.load(Ordering::SeqCst)
        }

        fn seen_credentials(&self) -> Vec<String> {
            self.seen.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
        }
    }

    impl AuthService for FakeAuth {
        async fn create_user(&self, credential: &SignedCredential) -> Result<SessionId, Error> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((credential.to_string(), AuthRequest::empty()));
            tokio::time::sleep(self.delay).await;
            (self.create_user)()
        }

        async fn authenticate(
            &self,
            credential: &SignedCredential,
            request: &AuthRequest,
        ) -> Result<AuthResponse, Error> {
            self.auth_calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((credential.to_string(), request.clone()));
            tokio::time::sleep(self.delay).await;
            (self.authenticate)()
        }
    }

    struct FailingSigner;

    impl CredentialSigner for FailingSigner {
        fn sign(&self, _: &str, _: &str) -> Result<SignedCredential, Error> {
            Err(Error::Signing("key unavailable".into()))
        }
    }

    fn config() -> GateConfig {
        GateConfig::new("example.com")
            .with_cookie_name("token")
            .with_call_timeout(Duration::from_millis(100))
            .with_public_path("/static/")
    }

    fn bearer_gate(
        auth: Arc<FakeAuth>,
    ) -> (
        RequestGate<crate::credential::CredentialIssuer, OpaqueSession, Arc<FakeAuth>>,
        CredentialVerifier,
    ) {
        let issuer = test_issuer();
        let verifier = issuer.verifier();
        let gate = RequestGate::new(
            config(),
            Collaborators {
                signer: issuer,
                verifier: OpaqueSession,
                auth,
            },
        )
        .unwrap();
        (gate, verifier)
    }

    fn request(uri: &str, cookie: Option<&str>) -> (Uri, CookieJar) {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        (uri.parse().unwrap(), CookieJar::from_headers(&headers))
    }

    #[tokio::test]
    async fn no_cookie_redirects_to_login() {
        let auth = Arc::new(FakeAuth::new());
        let (gate, _) = bearer_gate(auth.clone());

        for path in ["/notes", "/dashboard", "/profile?tab=1"] {
            let (uri, jar) = request(path, None);
            let outcome = gate.evaluate(&uri, &jar).await;
            assert_eq!(outcome.redirect_target(), Some("/auth"), "path {path}");
            assert!(outcome.cookie.is_none());
        }
        assert_eq!(auth.calls(), 0);
    }

    #[tokio::test]
    async fn empty_cookie_redirects_without_calls() {
        let auth = Arc::new(FakeAuth::new());
        let (gate, _) = bearer_gate(auth.clone());

        let (uri, jar) = request("/notes", Some("token="));
        let outcome = gate.evaluate(&uri, &jar).await;

        assert_eq!(outcome.redirect_target(), Some("/auth"));
        assert_eq!(auth.calls(), 0);
    }

    #[tokio::test]
    async fn login_path_clears_cookie_and_passes_through() {
        let auth = Arc::new(FakeAuth::new());
        let (gate, _) = bearer_gate(auth.clone());

        let (uri, jar) = request("/auth", Some("token=valid"));
        let outcome = gate.evaluate(&uri, &jar).await;

        assert_eq!(
            outcome.decision,
            Decision::PassThrough(IdentityContext::anonymous())
        );
        let cookie = outcome.cookie.unwrap();
        assert_eq!(cookie.name(), "token");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
        assert_eq!(auth.calls(), 0);
    }

    #[tokio::test]
    async fn public_path_passes_through_untouched() {
        let auth = Arc::new(FakeAuth::new());
        let (gate, _) = bearer_gate(auth.clone());

        let (uri, jar) = request("/static/app.css", None);
        let outcome = gate.evaluate(&uri, &jar).await;

        assert!(matches!(outcome.decision, Decision::PassThrough(_)));
        assert!(outcome.cookie.is_none());
        assert_eq!(auth.calls(), 0);
    }

    #[tokio::test]
    async fn root_redirects_to_landing_which_is_gated() {
        let auth = Arc::new(FakeAuth::new());
        let (gate, _) = bearer_gate(auth.clone());

        let (uri, jar) = request("/", None);
        let outcome = gate.evaluate(&uri, &jar).await;
        assert_eq!(outcome.redirect_target(), Some("/dashboard"));

        // Following the redirect without a session lands on login.
        let (uri, jar) = request("/dashboard", None);
        let outcome = gate.evaluate(&uri, &jar).await;
        assert_eq!(outcome.redirect_target(), Some("/auth"));
        assert_eq!(auth.calls(), 0);
    }

    #[tokio::test]
    async fn exchange_token_sets_bootstrap_cookie() {
        let auth = Arc::new(FakeAuth::new());
        let (gate, verifier) = bearer_gate(auth.clone());

        let (uri, jar) = request("/?oauth_token=abc", None);
        let outcome = gate.evaluate(&uri, &jar).await;

        assert_eq!(outcome.redirect_target(), Some("/dashboard"));
        let cookie = outcome.cookie.unwrap();
        assert_eq!(cookie.value(), "sess-new");
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(10)));
        assert_eq!(auth.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.auth_calls.load(Ordering::SeqCst), 0);

        let bootstrap = verifier.verify(&auth.seen_credentials()[0]).unwrap();
        assert_eq!(bootstrap.session_ref.as_str(), "abc");
        assert!(bootstrap.caller_id.is_empty());
    }

    #[tokio::test]
    async fn exchange_token_wins_over_existing_cookie() {
        let auth = Arc::new(FakeAuth::new());
        let (gate, _) = bearer_gate(auth.clone());

        let (uri, jar) = request("/notes?oauth_token=abc", Some("token=old"));
        let outcome = gate.evaluate(&uri, &jar).await;

        assert_eq!(outcome.redirect_target(), Some("/dashboard"));
        assert_eq!(auth.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.auth_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exchange_failure_redirects_with_flag_and_no_cookie() {
        let mut fake = FakeAuth::new();
        fake.create_user = || {
            Err(Error::Rpc {
                operation: "CreateUser",
                status: Some(401),
                detail: "bad token".into(),
            })
        };
        let auth = Arc::new(fake);
        let (gate, _) = bearer_gate(auth.clone());

        let (uri, jar) = request("/?oauth_token=abc", None);
        let outcome = gate.evaluate(&uri, &jar).await;

        assert_eq!(outcome.redirect_target(), Some("/auth?error=1"));
        assert!(outcome.cookie.is_none());
        assert_eq!(auth.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_session_id_from_create_user_is_a_failure() {
        let mut fake = FakeAuth::new();
        fake.create_user = || Ok(SessionId(String::new()));
        let (gate, _) = bearer_gate(Arc::new(fake));

        let (uri, jar) = request("/?oauth_token=abc", None);
        let outcome = gate.evaluate(&uri, &jar).await;

        assert_eq!(outcome.redirect_target(), Some("/auth?error=1"));
        assert!(outcome.cookie.is_none());
    }

    #[tokio::test]
    async fn valid_cookie_authenticates_and_rotates_cookie() {
        let auth = Arc::new(FakeAuth::new());
        let (gate, verifier) = bearer_gate(auth.clone());

        let (uri, jar) = request("/notes", Some("token=valid"));
        let outcome = gate.evaluate(&uri, &jar).await;

        let Decision::Proceed(identity) = &outcome.decision else {
            panic!("expected Proceed, got {:?}", outcome.decision);
        };
        assert!(identity.is_authenticated());
        assert_eq!(identity.caller_id.as_str(), "u-1");
        assert_eq!(identity.email, "a@example.com");
        assert_eq!(identity.role, Role::User);
        assert_eq!(identity.payment_id, "cus_1");
        assert_eq!(identity.subscription_id, "sub_1");
        assert!(identity.subscription_active);

        let rpc = verifier
            .verify(identity.credential.as_ref().unwrap().as_str())
            .unwrap();
        assert_eq!(rpc.session_ref.as_str(), "t-2");
        assert_eq!(rpc.caller_id.as_str(), "u-1");

        let sent = verifier.verify(&auth.seen_credentials()[0]).unwrap();
        assert_eq!(sent.session_ref.as_str(), "valid");
        assert!(sent.caller_id.is_empty());
        assert_eq!(auth.seen.lock().unwrap()[0].1, AuthRequest::empty());

        let cookie = outcome.cookie.unwrap();
        assert_eq!(cookie.value(), "t-2");
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(604_800)));
    }

    #[tokio::test]
    async fn empty_token_in_auth_response_is_a_failure() {
        let mut fake = FakeAuth::new();
        fake.authenticate = || {
            Ok(AuthResponse {
                token: Some(String::new()),
                user: Some(RemoteUser::new("u-1", "a@example.com", Role::User)),
            })
        };
        let (gate, _) = bearer_gate(Arc::new(fake));

        let (uri, jar) = request("/notes", Some("token=valid"));
        let outcome = gate.evaluate(&uri, &jar).await;

        assert_eq!(outcome.redirect_target(), Some("/auth?error=1"));
        assert!(outcome.identity().is_none());
    }

    #[tokio::test]
    async fn missing_user_in_auth_response_is_a_failure() {
        let mut fake = FakeAuth::new();
        fake.authenticate = || {
            Ok(AuthResponse {
                token: Some("t-2".into()),
                user: None,
            })
        };
        let (gate, _) = bearer_gate(Arc::new(fake));

        let (uri, jar) = request("/notes", Some("token=valid"));
        let outcome = gate.evaluate(&uri, &jar).await;

        assert_eq!(outcome.redirect_target(), Some("/auth?error=1"));
    }

    #[tokio::test]
    async fn auth_rpc_error_redirects_with_flag() {
        let mut fake = FakeAuth::new();
        fake.authenticate = || {
            Err(Error::Rpc {
                operation: "Auth",
                status: Some(503),
                detail: "unavailable".into(),
            })
        };
        let (gate, _) = bearer_gate(Arc::new(fake));

        let (uri, jar) = request("/notes", Some("token=valid"));
        let outcome = gate.evaluate(&uri, &jar).await;

        assert_eq!(outcome.redirect_target(), Some("/auth?error=1"));
        assert!(outcome.cookie.is_none());
    }

    #[tokio::test]
    async fn hung_auth_call_times_out_as_failure() {
        let mut fake = FakeAuth::new();
        fake.delay = Duration::from_secs(5);
        let (gate, _) = bearer_gate(Arc::new(fake));

        let (uri, jar) = request("/notes", Some("token=valid"));
        let started = Instant::now();
        let outcome = gate.evaluate(&uri, &jar).await;

        assert_eq!(outcome.redirect_target(), Some("/auth?error=1"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn hung_create_user_times_out_as_failure() {
        let mut fake = FakeAuth::new();
        fake.delay = Duration::from_secs(5);
        let auth = Arc::new(fake);
        let (gate, _) = bearer_gate(auth.clone());

        let (uri, jar) = request("/?oauth_token=abc", None);
        let started = Instant::now();
        let outcome = gate.evaluate(&uri, &jar).await;

        assert_eq!(outcome.redirect_target(), Some("/auth?error=1"));
        assert!(outcome.cookie.is_none());
        assert_eq!(auth.create_calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn replayed_cookie_is_authenticated_independently() {
        let auth = Arc::new(FakeAuth::new());
        let (gate, _) = bearer_gate(auth.clone());

        let (uri, jar) = request("/notes", Some("token=valid"));
        let first = gate.evaluate(&uri, &jar).await;
        let second = gate.evaluate(&uri, &jar).await;

        assert_eq!(auth.auth_calls.load(Ordering::SeqCst), 2);
        let sent = auth.seen_credentials();
        assert_ne!(sent[0], sent[1]);
        assert_ne!(
            first.identity().unwrap().credential,
            second.identity().unwrap().credential
        );
    }

    #[tokio::test]
    async fn signing_failure_redirects_to_login() {
        let auth = Arc::new(FakeAuth::new());
        let gate = RequestGate::new(
            config(),
            Collaborators {
                signer: FailingSigner,
                verifier: OpaqueSession,
                auth: auth.clone(),
            },
        )
        .unwrap();

        let (uri, jar) = request("/notes", Some("token=valid"));
        let outcome = gate.evaluate(&uri, &jar).await;
        assert_eq!(outcome.redirect_target(), Some("/auth"));

        let (uri, jar) = request("/?oauth_token=abc", None);
        let outcome = gate.evaluate(&uri, &jar).await;
        assert_eq!(outcome.redirect_target(), Some("/auth"));
        assert_eq!(auth.calls(), 0);
    }

    fn provider_gate(
        auth: Arc<FakeAuth>,
        verifier: PinnedKeyVerifier,
    ) -> RequestGate<
        crate::credential::CredentialIssuer,
        IdentityProviderSession<PinnedKeyVerifier>,
        Arc<FakeAuth>,
    > {
        RequestGate::new(
            GateConfig::new("example.com"),
            Collaborators {
                signer: test_issuer(),
                verifier: IdentityProviderSession(verifier),
                auth,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn provider_assertion_is_verified_before_auth() {
        let kp = provider_keypair();
        let assertion = provider_assertion(&kp, "uid-1", Some("a@example.com"), "my-app");
        let auth = Arc::new(FakeAuth::new());
        let gate = provider_gate(auth.clone(), pinned(&kp));

        let (uri, jar) = request("/notes", Some(&format!("session={assertion}")));
        let outcome = gate.evaluate(&uri, &jar).await;

        assert!(outcome.identity().unwrap().is_authenticated());
        let (_, sent) = auth.seen.lock().unwrap()[0].clone();
        assert_eq!(sent.sub.as_deref(), Some("uid-1"));
        assert_eq!(sent.email.as_deref(), Some("a@example.com"));

        // The provider assertion stays in the cookie; only its max-age is refreshed.
        let cookie = outcome.cookie.unwrap();
        assert_eq!(cookie.name(), "session");
        assert_eq!(cookie.value(), assertion);
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));
    }

    #[tokio::test]
    async fn invalid_provider_assertion_never_authenticates() {
        let kp = provider_keypair();
        let other = provider_keypair();
        let forged = provider_assertion(&other, "uid-1", None, "my-app");
        let auth = Arc::new(FakeAuth::new());
        let gate = provider_gate(auth.clone(), pinned(&kp));

        for cookie in [forged.as_str(), "garbage"] {
            let (uri, jar) = request("/notes", Some(&format!("session={cookie}")));
            let outcome = gate.evaluate(&uri, &jar).await;

            assert_eq!(outcome.redirect_target(), Some("/auth"));
            assert!(outcome.identity().is_none());
            assert_eq!(
                outcome.cookie.unwrap().max_age(),
                Some(time::Duration::ZERO)
            );
        }
        assert_eq!(auth.calls(), 0);
    }
}
