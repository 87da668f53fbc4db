use axum::{Json, extract::State};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::db::CatalogModule;
use crate::error::LaunchError;
use crate::server::auth::{RequireAdmin, SESSION_COOKIE};
use crate::server::router::WebState;
use crate::service::credentials::verify_password;

pub async fn health_handler(State(state): State<WebState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "development": state.mode.is_development(),
    }))
}

pub async fn modules_handler(
    State(state): State<WebState>,
) -> Result<Json<Vec<CatalogModule>>, LaunchError> {
    Ok(Json(state.storage.list_modules().await?))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login_handler(
    State(state): State<WebState>,
    jar: PrivateCookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(PrivateCookieJar, Json<Value>), LaunchError> {
    let Some(admin) = state.storage.find_admin(&req.email).await? else {
        warn!(email = %req.email, "login for unknown account");
        return Err(LaunchError::Unauthorized);
    };
    if !verify_password(&req.password, &admin.password_hash) {
        warn!(email = %req.email, "login with wrong password");
        return Err(LaunchError::Unauthorized);
    }

    let cookie = Cookie::build((SESSION_COOKIE, admin.email.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(!state.mode.is_development())
        .build();
    info!(email = %admin.email, "admin logged in");
    Ok((jar.add(cookie), Json(json!({ "email": admin.email }))))
}

pub async fn me_handler(
    State(state): State<WebState>,
    RequireAdmin(email): RequireAdmin,
) -> Json<Value> {
    Json(json!({
        "email": email,
        "admin": true,
        "default_admin": email == state.admin_email.as_ref(),
    }))
}
