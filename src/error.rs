#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[cfg(any(feature = "rpc", feature = "identity-provider"))]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token verification error: {0}")]
    Token(String),
    #[error("Credential signing error: {0}")]
    Signing(String),
    #[error("{operation} failed (status {status:?}): {detail}")]
    Rpc {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[error("{operation} returned an incomplete response: {detail}")]
    IncompleteResponse {
        operation: &'static str,
        detail: &'static str,
    },
    #[error("Identity provider error: {0}")]
    IdentityProvider(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
