use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};

use super::error::GateError;
use super::types::{IdentityContext, LoginRoute};

/// Identity resolved by the gate for this request.
///
/// Anonymous on pass-through routes (login route, public paths). Rejects with
/// `500 Internal Server Error` if the route is not behind the gate at all.
///
/// # Example
///
/// ```rust,ignore
/// async fn login_page(identity: IdentityContext) -> impl IntoResponse {
///     if identity.is_authenticated() { "Welcome back" } else { "Please sign in" }
/// }
/// ```
impl<S: Send + Sync> FromRequestParts<S> for IdentityContext {
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<IdentityContext>().cloned().ok_or_else(|| {
            GateError::Config("IdentityContext missing: route is not behind the gate".into())
        })
    }
}

/// Authenticated caller. Rejects anonymous identities with a redirect to the
/// gate's configured login route.
///
/// # Example
///
/// ```rust,ignore
/// async fn notes(Authenticated(caller): Authenticated) -> impl IntoResponse {
///     let Some(credential) = &caller.credential else { return StatusCode::UNAUTHORIZED.into_response() };
///     notes_client.list(&caller.caller_id, credential.header()).await.into_response()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticated(pub IdentityContext);

/// Why [`Authenticated`] refused a request.
#[derive(Debug)]
pub enum AuthenticatedRejection {
    /// The route is not behind the gate.
    Gate(GateError),
    /// Anonymous caller on a pass-through route; redirects to this login route.
    LoginRequired(String),
}

impl IntoResponse for AuthenticatedRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Gate(e) => e.into_response(),
            Self::LoginRequired(login_path) => Redirect::to(&login_path).into_response(),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = AuthenticatedRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = IdentityContext::from_request_parts(parts, state)
            .await
            .map_err(AuthenticatedRejection::Gate)?;
        if identity.is_authenticated() {
            return Ok(Self(identity));
        }

        let LoginRoute(login_path) = parts.extensions.get::<LoginRoute>().cloned().ok_or_else(|| {
            AuthenticatedRejection::Gate(GateError::Config(
                "login route missing: route is not behind the gate".into(),
            ))
        })?;
        Err(AuthenticatedRejection::LoginRequired(login_path))
    }
}
