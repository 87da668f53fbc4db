//! The primary web server: application factory and its blocking run loop.

pub mod auth;
pub mod handlers;
pub mod router;

pub use router::{ServerMode, WebState, web_router};

use crate::config::{Config, InitMode};
use crate::db::Storage;
use crate::error::LaunchError;
use crate::service::bootstrap::AppBootstrapper;
use axum::Router;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// A configured server, ready to bind `host:port`.
pub struct WebServer {
    host: String,
    port: u16,
    router: Router,
}

impl WebServer {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<F>(self, shutdown: F) -> Result<(), LaunchError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("HTTP server listening on {}", addr);
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("HTTP server stopped");
        Ok(())
    }
}

/// Cookie key derived from the configured secret key.
pub fn cookie_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

/// Application factory. With `init_mode = "eager"` this also runs the
/// idempotent initialization before returning.
pub async fn create_app(
    cfg: &Config,
    storage: Storage,
    mode: ServerMode,
) -> Result<WebServer, LaunchError> {
    let key = cookie_key(cfg.require_secret_key()?);

    if cfg.basic.init_mode == InitMode::Eager {
        let report = AppBootstrapper::from_config(cfg, storage.clone())?
            .initialize()
            .await?;
        report.announce();
    }

    let state = WebState::new(
        storage,
        mode,
        Arc::from(cfg.basic.admin_email.as_str()),
        key,
    );
    Ok(WebServer {
        host: cfg.basic.host.clone(),
        port: cfg.basic.port,
        router: web_router(state),
    })
}
