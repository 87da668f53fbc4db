use crate::config::Config;
use crate::db::Storage;
use crate::dispatch::Launcher;
use crate::error::LaunchError;
use crate::logging::load_config_with_tracing;
use crate::server::{ServerMode, WebServer, create_app};
use crate::service::bootstrap::AppBootstrapper;
use crate::service::migrations::{MigrationOp, MigrationRunner};
use crate::supervisor::reload::watch_for_changes;
use crate::supervisor::{
    CompanionGuard, CompanionSupervisor, ProcessEnv, RESTART_EXIT_CODE, ReloadRole,
    ReloadSupervisor, ShutdownSignal,
};
use crate::types::cli;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Production implementation of [`Launcher`]. The environment snapshot is
/// taken at construction; configuration is loaded by [`Launcher::prepare`].
pub struct AppLauncher {
    env: ProcessEnv,
    loaded: Option<Loaded>,
}

struct Loaded {
    cfg: Config,
    cwd: PathBuf,
}

impl AppLauncher {
    /// Launcher with configuration already in hand; `prepare` is a no-op.
    pub fn new(cfg: Config, env: ProcessEnv, cwd: PathBuf) -> Self {
        Self {
            env,
            loaded: Some(Loaded { cfg, cwd }),
        }
    }

    pub fn from_current_process() -> Self {
        Self {
            env: ProcessEnv::capture(),
            loaded: None,
        }
    }

    fn loaded(&self) -> Result<&Loaded, LaunchError> {
        self.loaded
            .as_ref()
            .ok_or_else(|| LaunchError::Configuration("configuration was not loaded".into()))
    }

    async fn serve_dev(
        &self,
        cfg: &Config,
        role: ReloadRole,
        shutdown: ShutdownSignal,
    ) -> Result<i32, LaunchError> {
        let storage = Storage::connect(&cfg.basic.database_url).await?;
        let server = create_app(cfg, storage, ServerMode::Development).await?;
        info!(
            host = server.host(),
            port = server.port(),
            ?role,
            "starting website in development mode"
        );

        if role == ReloadRole::Child && cfg.reload.enabled {
            return serve_with_watcher(cfg, server, shutdown).await;
        }
        server.run(shutdown.recv()).await?;
        Ok(0)
    }
}

/// Serve until interrupted or until a watched file changes; the latter
/// exits with the restart code so the parent re-executes us.
async fn serve_with_watcher(
    cfg: &Config,
    server: WebServer,
    shutdown: ShutdownSignal,
) -> Result<i32, LaunchError> {
    let watch = watch_for_changes(&cfg.reload.watch_paths, cfg.reload.debounce())?;
    let reload_requested = Arc::new(AtomicBool::new(false));
    let flag = reload_requested.clone();
    let stop = async move {
        tokio::select! {
            _ = shutdown.recv() => {}
            _ = watch => flag.store(true, Ordering::SeqCst),
        }
    };

    server.run(stop).await?;
    if reload_requested.load(Ordering::SeqCst) {
        Ok(RESTART_EXIT_CODE)
    } else {
        Ok(0)
    }
}

impl Launcher for AppLauncher {
    fn prepare(&mut self) -> Result<(), LaunchError> {
        if self.loaded.is_some() {
            return Ok(());
        }
        let cfg = load_config_with_tracing()?;
        let cwd = std::env::current_dir()?;
        self.loaded = Some(Loaded { cfg, cwd });
        Ok(())
    }

    async fn run_dev(&self) -> Result<i32, LaunchError> {
        let Loaded { cfg, cwd } = self.loaded()?;
        cfg.require_secret_key()?;
        let shutdown = ShutdownSignal::install()?;
        let role = self.env.role();

        let reloader = if role == ReloadRole::Parent && cfg.reload.enabled {
            Some(ReloadSupervisor::current_process()?)
        } else {
            None
        };

        let supervisor = CompanionSupervisor::new(cfg.companion.clone(), cwd);
        let guard = CompanionGuard::new(supervisor.start_if_owner(&self.env).await?);

        match reloader {
            Some(reloader) => {
                info!("reload enabled; serving from a supervised child process");
                guard.scope(reloader.supervise(shutdown.recv())).await
            }
            None => guard.scope(self.serve_dev(cfg, role, shutdown)).await,
        }
    }

    async fn db_init(&self) -> Result<(), LaunchError> {
        let Loaded { cfg, .. } = self.loaded()?;
        cfg.require_secret_key()?;
        let storage = Storage::connect(&cfg.basic.database_url).await?;
        let report = AppBootstrapper::from_config(cfg, storage)?
            .initialize()
            .await?;
        report.announce();
        Ok(())
    }

    async fn migrate(&self, op: MigrationOp) -> Result<(), LaunchError> {
        MigrationRunner::from_config(&self.loaded()?.cfg).run(op).await
    }

    fn print_help(&self) {
        cli::print_help();
    }
}
