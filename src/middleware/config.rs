use std::time::Duration as StdDuration;

use time::Duration;

use super::error::GateError;

/// Shared gate settings used by both config and runtime state.
#[derive(Debug, Clone)]
pub(crate) struct GateSettings {
    pub(crate) cookie_name: String,
    pub(crate) cookie_domain: String,
    pub(crate) secure_cookies: bool,
    pub(crate) login_path: String,
    pub(crate) landing_path: String,
    pub(crate) exchange_param: String,
    pub(crate) bootstrap_ttl: Duration,
    pub(crate) session_ttl: Duration,
    pub(crate) call_timeout: StdDuration,
    pub(crate) public_paths: Vec<String>,
}

impl GateSettings {
    fn defaults(cookie_domain: String) -> Self {
        Self {
            cookie_name: "session".into(),
            cookie_domain,
            secure_cookies: true,
            login_path: "/auth".into(),
            landing_path: "/dashboard".into(),
            exchange_param: "oauth_token".into(),
            bootstrap_ttl: Duration::seconds(10),
            session_ttl: Duration::days(7),
            call_timeout: StdDuration::from_secs(5),
            public_paths: Vec::new(),
        }
    }

    pub(crate) fn login_error_redirect(&self) -> String {
        format!("{}?error=1", self.login_path)
    }

    /// Prefixes ending in `/` cover everything below them. Any other prefix
    /// covers the exact path and its subpaths, so `/dash` leaves `/dashboard`
    /// gated.
    pub(crate) fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|prefix| {
            if prefix.ends_with('/') {
                path.starts_with(prefix.as_str())
            } else {
                path.strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            }
        })
    }
}

/// Request gate configuration.
///
/// The cookie domain is the only required value. Everything else defaults to
/// the conventional routes: `/auth` for login, `/dashboard` as landing page,
/// `oauth_token` as the exchange parameter.
pub struct GateConfig {
    pub(super) settings: GateSettings,
}

impl GateConfig {
    #[must_use]
    pub fn new(cookie_domain: impl Into<String>) -> Self {
        Self {
            settings: GateSettings::defaults(cookie_domain.into()),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `GATE_COOKIE_DOMAIN`: domain attribute of the session cookie
    ///
    /// # Optional env vars
    /// - `GATE_COOKIE_NAME`: session cookie name (`session`, or `token` for the bearer variant)
    /// - `GATE_LOGIN_PATH`, `GATE_LANDING_PATH`: route overrides
    /// - `GATE_EXCHANGE_PARAM`: exchange-token query parameter
    /// - `GATE_PUBLIC_PATHS`: comma-separated path prefixes that bypass the gate
    /// - `GATE_CALL_TIMEOUT_MS`: deadline for each remote call
    /// - `DEV_AUTH`: set to `"1"` or `"true"` to disable secure cookies
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if a required var is missing or a value is invalid.
    pub fn from_env() -> Result<Self, GateError> {
        let domain = std::env::var("GATE_COOKIE_DOMAIN")
            .map_err(|_| GateError::Config("GATE_COOKIE_DOMAIN is required".into()))?;
        let mut config = Self::new(domain);

        if let Ok(name) = std::env::var("GATE_COOKIE_NAME") {
            config = config.with_cookie_name(name);
        }
        if let Ok(path) = std::env::var("GATE_LOGIN_PATH") {
            config = config.with_login_path(path);
        }
        if let Ok(path) = std::env::var("GATE_LANDING_PATH") {
            config = config.with_landing_path(path);
        }
        if let Ok(param) = std::env::var("GATE_EXCHANGE_PARAM") {
            config = config.with_exchange_param(param);
        }
        if let Ok(paths) = std::env::var("GATE_PUBLIC_PATHS") {
            for path in paths.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                config = config.with_public_path(path);
            }
        }
        if let Ok(ms) = std::env::var("GATE_CALL_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|e| GateError::Config(format!("GATE_CALL_TIMEOUT_MS: {e}")))?;
            config = config.with_call_timeout(StdDuration::from_millis(ms));
        }

        let dev_auth = matches!(
            std::env::var("DEV_AUTH").as_deref(),
            Ok("1") | Ok("true"),
        );

        config.settings.validate()?;
        Ok(config.with_secure_cookies(!dev_auth))
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.settings.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_landing_path(mut self, path: impl Into<String>) -> Self {
        self.settings.landing_path = path.into();
        self
    }

    #[must_use]
    pub fn with_exchange_param(mut self, param: impl Into<String>) -> Self {
        self.settings.exchange_param = param.into();
        self
    }

    /// Max-age of the cookie written right after exchange-token redemption.
    #[must_use]
    pub fn with_bootstrap_ttl(mut self, ttl: Duration) -> Self {
        self.settings.bootstrap_ttl = ttl;
        self
    }

    /// Max-age of the cookie after a successful authentication.
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.settings.session_ttl = ttl;
        self
    }

    /// Deadline applied to each remote call.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: StdDuration) -> Self {
        self.settings.call_timeout = timeout;
        self
    }

    /// Path prefix that bypasses the gate entirely (static assets, probes).
    ///
    /// Requests under it get an anonymous identity and the cookie is left alone.
    #[must_use]
    pub fn with_public_path(mut self, prefix: impl Into<String>) -> Self {
        self.settings.public_paths.push(prefix.into());
        self
    }
}

impl GateSettings {
    fn validate(&self) -> Result<(), GateError> {
        for (name, path) in [
            ("GATE_LOGIN_PATH", &self.login_path),
            ("GATE_LANDING_PATH", &self.landing_path),
        ] {
            if !path.starts_with('/') {
                return Err(GateError::Config(format!("{name} must start with '/'")));
            }
        }
        // A public landing page would let the root shortcut skip authentication.
        if self.is_public(&self.landing_path) {
            return Err(GateError::Config(
                "GATE_LANDING_PATH must not be under GATE_PUBLIC_PATHS".into(),
            ));
        }
        if self.cookie_name.is_empty() || self.exchange_param.is_empty() {
            return Err(GateError::Config(
                "cookie name and exchange parameter must be non-empty".into(),
            ));
        }
        Ok(())
    }
}

impl GateConfig {
    /// Check invariants the builder cannot enforce by construction.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] naming the offending setting.
    pub fn validate(&self) -> Result<(), GateError> {
        self.settings.validate()
    }
}
