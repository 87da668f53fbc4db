use crate::config::Config;
use crate::error::LaunchError;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber. `RUST_LOG` wins over `loglevel`. A second
/// call keeps the subscriber that is already installed.
pub fn init_tracing(loglevel: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(loglevel));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_level(true)
                .with_target(false),
        )
        .try_init();
}

/// Load configuration and install logging at its level. When loading fails
/// logging falls back to `info` so the caller can still report the error.
pub fn load_config_with_tracing() -> Result<Config, LaunchError> {
    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            init_tracing("info");
            return Err(e);
        }
    };
    init_tracing(&cfg.basic.loglevel);
    info!(
        database_url = %cfg.basic.database_url,
        bind = %cfg.bind_addr(),
        init_mode = ?cfg.basic.init_mode,
        companion = %cfg.companion.program,
        reload = cfg.reload.enabled,
    );
    Ok(cfg)
}
