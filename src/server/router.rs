use crate::db::Storage;
use crate::server::handlers::{health_handler, login_handler, me_handler, modules_handler};
use axum::{
    Router,
    extract::FromRef,
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use std::sync::Arc;

/// Whether the server runs for local development. Threaded explicitly through
/// the state instead of living in a process-wide flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Development,
    Production,
}

impl ServerMode {
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

#[derive(Clone)]
pub struct WebState {
    pub storage: Storage,
    pub mode: ServerMode,
    pub admin_email: Arc<str>,
    key: Key,
}

impl WebState {
    pub fn new(storage: Storage, mode: ServerMode, admin_email: Arc<str>, key: Key) -> Self {
        Self {
            storage,
            mode,
            admin_email,
            key,
        }
    }
}

impl FromRef<WebState> for Key {
    fn from_ref(state: &WebState) -> Self {
        state.key.clone()
    }
}

pub fn web_router(state: WebState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/modules", get(modules_handler))
        .route("/api/login", post(login_handler))
        .route("/api/me", get(me_handler))
        .with_state(state)
}
