use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::PrivateCookieJar;

use crate::error::LaunchError;
use crate::server::router::WebState;

/// Name of the encrypted session cookie.
pub const SESSION_COOKIE: &str = "modweb_session";

/// Extractor that admits only requests carrying a session cookie for an
/// existing admin account.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub String);

impl FromRequestParts<WebState> for RequireAdmin {
    type Rejection = LaunchError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &WebState,
    ) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar =
            match PrivateCookieJar::from_request_parts(parts, state).await {
                Ok(jar) => jar,
                Err(never) => match never {},
            };
        let email = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or(LaunchError::Unauthorized)?;

        match state.storage.find_admin(&email).await? {
            Some(admin) => Ok(Self(admin.email)),
            None => Err(LaunchError::Unauthorized),
        }
    }
}
