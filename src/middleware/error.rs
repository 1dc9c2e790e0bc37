use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

use super::config::GateSettings;

const DEFAULT_LOGIN_PATH: &str = "/auth";

/// Reasons a request does not reach protected handlers.
///
/// Every variant except `Config` ends in a redirect to the login route.
/// None of them is retried and none is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// No session cookie on the request.
    #[error("No session")]
    NoSession,

    /// Session cookie or provider assertion is invalid or expired.
    #[error("Session verification failed: {0}")]
    VerificationFailure(String),

    /// The user service rejected the exchange token.
    #[error("Exchange token redemption failed: {0}")]
    ExchangeRedemptionFailure(String),

    /// The `Auth` call failed, timed out, or returned an incomplete payload.
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    /// The gateway could not mint a credential.
    #[error("Credential signing failed: {0}")]
    SigningFailure(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GateError {
    /// Whether the login redirect carries the `error=1` flag.
    #[must_use]
    pub fn flags_login(&self) -> bool {
        matches!(
            self,
            Self::ExchangeRedemptionFailure(_) | Self::AuthenticationFailure(_)
        )
    }

    pub(crate) fn redirect_target(&self, settings: &GateSettings) -> String {
        if self.flags_login() {
            settings.login_error_redirect()
        } else {
            settings.login_path.clone()
        }
    }
}

/// Stand-alone rendering, for code that has no gate settings at hand: redirects
/// use the default `/auth` route. The gate itself and [`Authenticated`] use the
/// configured login route.
///
/// [`Authenticated`]: super::Authenticated
impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match self {
            Self::Config(_) => {
                tracing::error!(error = %self, "Gate internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
            _ if self.flags_login() => {
                Redirect::to(&format!("{DEFAULT_LOGIN_PATH}?error=1")).into_response()
            }
            _ => Redirect::to(DEFAULT_LOGIN_PATH).into_response(),
        }
    }
}

impl From<crate::error::Error> for GateError {
    fn from(e: crate::error::Error) -> Self {
        Self::AuthenticationFailure(e.to_string())
    }
}
