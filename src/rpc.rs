//! Client for the remote user service.
//!
//! Unary calls are JSON over HTTP `POST {base}/{service}/{method}`; RPC
//! metadata travels as HTTP headers. Only the two operations the gateway
//! needs are exposed. Calls are never retried.
//!
//! [`AuthServiceClient`] talks to a user service that exposes this JSON
//! mapping (directly, or through a gRPC-JSON transcoding proxy). It does not
//! speak gRPC framing, so a user service served only over gRPC needs its own
//! [`AuthService`](crate::middleware::AuthService) implementation, for
//! example a tonic client that maps `CreateUser`/`Auth` onto
//! [`SessionId`] and [`AuthResponse`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::identity::VerifiedIdentity;
use crate::types::{Role, SessionId, UserId};

/// Payload of the `Auth` call.
///
/// Empty in the bearer-exchange variant, where the signed credential alone
/// identifies the session. Carries the provider subject and email in the
/// identity-provider variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct AuthRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AuthRequest {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_identity(identity: &VerifiedIdentity) -> Self {
        Self {
            sub: Some(identity.subject.to_string()),
            email: Some(identity.email.clone()),
        }
    }
}

/// User projection returned by `Auth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct RemoteUser {
    #[serde(default)]
    pub id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub subscription_active: bool,
}

fn default_role() -> Role {
    Role::User
}

impl RemoteUser {
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId(id.into()),
            email: email.into(),
            role,
            payment_id: None,
            subscription_id: None,
            subscription_active: false,
        }
    }

    #[must_use]
    pub fn with_payment_id(mut self, payment_id: impl Into<String>) -> Self {
        self.payment_id = Some(payment_id.into());
        self
    }

    #[must_use]
    pub fn with_subscription(mut self, subscription_id: impl Into<String>, active: bool) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self.subscription_active = active;
        self
    }
}

/// Raw `Auth` response. Both fields may be absent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<RemoteUser>,
}

impl AuthResponse {
    #[must_use]
    pub fn new(token: impl Into<String>, user: RemoteUser) -> Self {
        Self {
            token: Some(token.into()),
            user: Some(user),
        }
    }

    /// Require both a refreshed token and a user with a non-empty id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteResponse`] naming the missing part.
    pub fn into_complete(self) -> Result<(SessionId, RemoteUser), Error> {
        let token = self
            .token
            .filter(|t| !t.is_empty())
            .ok_or(Error::IncompleteResponse {
                operation: "Auth",
                detail: "missing token",
            })?;
        let user = self
            .user
            .filter(|u| !u.id.is_empty())
            .ok_or(Error::IncompleteResponse {
                operation: "Auth",
                detail: "missing user",
            })?;
        Ok((SessionId(token), user))
    }
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(default)]
    id: String,
}

/// User service endpoint configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RpcConfig {
    pub(crate) base_url: Url,
    pub(crate) service: String,
    pub(crate) timeout: Duration,
}

impl RpcConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            service: "users.UsersService".into(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `GATE_USERS_URL`: user service base URL
    ///
    /// # Optional env vars
    /// - `GATE_USERS_SERVICE`: fully qualified service name
    /// - `GATE_RPC_TIMEOUT_MS`: per-call deadline in milliseconds
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required var is missing or a value is invalid.
    pub fn from_env() -> Result<Self, Error> {
        let base_url: Url = crate::identity::required_env("GATE_USERS_URL")?
            .parse()
            .map_err(|e| Error::Config(format!("GATE_USERS_URL: {e}")))?;

        let mut config = Self::new(base_url);
        if let Ok(service) = std::env::var("GATE_USERS_SERVICE") {
            config = config.with_service(service);
        }
        if let Ok(ms) = std::env::var("GATE_RPC_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|e| Error::Config(format!("GATE_RPC_TIMEOUT_MS: {e}")))?;
            config = config.with_timeout(Duration::from_millis(ms));
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/{service}/{method}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL cannot carry a path.
    pub fn method_url(&self, method: &str) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("GATE_USERS_URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .push(&self.service)
            .push(method);
        Ok(url)
    }
}

/// User service client. Cheap to share; the inner connection pool is reused.
#[cfg(feature = "rpc")]
pub struct AuthServiceClient {
    config: RpcConfig,
    http: reqwest::Client,
}

#[cfg(feature = "rpc")]
impl AuthServiceClient {
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: RpcConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Redeem an exchange token for a new session.
    ///
    /// `credential` is the bootstrap credential wrapping the exchange token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, [`Error::Rpc`] on a
    /// non-success status, or [`Error::IncompleteResponse`] if no id came back.
    pub async fn create_user(
        &self,
        credential: &crate::credential::SignedCredential,
    ) -> Result<SessionId, Error> {
        let response = self
            .http
            .post(self.config.method_url("CreateUser")?)
            .header(crate::credential::AUTHORIZATION_HEADER, credential.authorization_value())
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let response = Self::ensure_success(response, "CreateUser").await?;
        let body: IdResponse = response.json().await?;
        if body.id.is_empty() {
            return Err(Error::IncompleteResponse {
                operation: "CreateUser",
                detail: "missing id",
            });
        }
        Ok(SessionId(body.id))
    }

    /// Authenticate a session by signed credential.
    ///
    /// The response is returned as sent; completeness is the caller's check
    /// (see [`AuthResponse::into_complete`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure or [`Error::Rpc`] on a
    /// non-success status.
    pub async fn authenticate(
        &self,
        credential: &crate::credential::SignedCredential,
        request: &AuthRequest,
    ) -> Result<AuthResponse, Error> {
        let response = self
            .http
            .post(self.config.method_url("Auth")?)
            .header(crate::credential::AUTHORIZATION_HEADER, credential.authorization_value())
            .json(request)
            .send()
            .await?;

        let response = Self::ensure_success(response, "Auth").await?;
        response.json::<AuthResponse>().await.map_err(Into::into)
    }

    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Rpc {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}
