use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use super::config::GateSettings;

/// Create the session cookie with the given max-age.
pub(super) fn session_cookie(
    settings: &GateSettings,
    value: String,
    max_age: Duration,
) -> Cookie<'static> {
    let mut builder = Cookie::build((settings.cookie_name.clone(), value))
        .http_only(true)
        .secure(settings.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(max_age);
    if !settings.cookie_domain.is_empty() {
        builder = builder.domain(settings.cookie_domain.clone());
    }
    builder.build()
}

/// Create the clearing cookie for the session (empty value, max-age 0).
pub(super) fn clear_session_cookie(settings: &GateSettings) -> Cookie<'static> {
    session_cookie(settings, String::new(), Duration::ZERO)
}

/// Read the session cookie value; an empty value counts as absent.
pub(super) fn get_session(
    jar: &axum_extra::extract::CookieJar,
    settings: &GateSettings,
) -> Option<String> {
    jar.get(&settings.cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
