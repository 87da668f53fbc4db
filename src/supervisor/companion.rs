use crate::config::{CompanionConfig, Readiness};
use crate::error::LaunchError;
use crate::supervisor::role::{EnvVars, ProcessEnv};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

const PROBE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Starting,
    Running,
    Terminated,
}

/// A companion process owned by this launcher.
#[derive(Debug)]
pub struct CompanionHandle {
    child: Child,
    pid: u32,
    env: EnvVars,
    workdir: PathBuf,
    state: Liveness,
    stop_timeout: Duration,
}

impl CompanionHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn env(&self) -> &EnvVars {
        &self.env
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn state(&self) -> Liveness {
        self.state
    }

    /// SIGTERM, wait up to the stop timeout, then SIGKILL. Safe to call twice.
    pub async fn stop(&mut self) -> Result<Option<ExitStatus>, LaunchError> {
        if self.state == Liveness::Terminated {
            return Ok(None);
        }
        if let Some(status) = self.child.try_wait()? {
            debug!(pid = self.pid, %status, "companion already exited");
            self.state = Liveness::Terminated;
            return Ok(Some(status));
        }

        info!(pid = self.pid, "stopping companion");
        send_sigterm(self.pid);
        let status = match timeout(self.stop_timeout, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    pid = self.pid,
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "companion ignored SIGTERM; killing"
                );
                self.child.kill().await?;
                self.child.wait().await?
            }
        };
        self.state = Liveness::Terminated;
        info!(pid = self.pid, %status, "companion stopped");
        Ok(Some(status))
    }

    /// Synchronous termination request for paths that cannot await.
    fn terminate_now(&mut self) {
        if self.state == Liveness::Terminated {
            return;
        }
        if let Ok(Some(_)) = self.child.try_wait() {
            self.state = Liveness::Terminated;
            return;
        }
        warn!(pid = self.pid, "companion still running at guard drop; sending SIGTERM");
        send_sigterm(self.pid);
        self.state = Liveness::Terminated;
    }
}

fn send_sigterm(pid: u32) {
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        warn!(pid, error = %std::io::Error::last_os_error(), "SIGTERM to companion failed");
    }
}

/// Spawns the companion when this process owns it.
pub struct CompanionSupervisor {
    cfg: CompanionConfig,
    workdir: PathBuf,
}

impl CompanionSupervisor {
    /// `cwd` is the launcher's working directory; the companion runs one level up
    /// unless `companion.workdir` is set.
    pub fn new(cfg: CompanionConfig, cwd: &Path) -> Self {
        let workdir = cfg.resolve_workdir(cwd);
        Self { cfg, workdir }
    }

    /// Spawn the companion and pass the readiness barrier, or return `None` when
    /// this process is a reload child or the companion is disabled.
    pub async fn start_if_owner(
        &self,
        env: &ProcessEnv,
    ) -> Result<Option<CompanionHandle>, LaunchError> {
        if !env.role().owns_companion() {
            debug!("reload child; companion is owned by the parent process");
            return Ok(None);
        }
        if !self.cfg.enabled {
            info!("companion disabled; running without modules server");
            return Ok(None);
        }

        let companion_env = env.without(&self.cfg.strip_env);
        info!(
            program = %self.cfg.program,
            args = ?self.cfg.args,
            workdir = %self.workdir.display(),
            "starting companion"
        );
        let child = Command::new(&self.cfg.program)
            .args(&self.cfg.args)
            .current_dir(&self.workdir)
            .env_clear()
            .envs(companion_env.iter().cloned())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| self.spawn_error(e.to_string()))?;
        let pid = child.id().ok_or_else(|| self.spawn_error("exited before reporting a pid"))?;

        let mut handle = CompanionHandle {
            child,
            pid,
            env: companion_env,
            workdir: self.workdir.clone(),
            state: Liveness::Starting,
            stop_timeout: self.cfg.stop_timeout(),
        };

        if let Err(e) = self.await_ready(&mut handle).await {
            if let Err(stop_err) = handle.stop().await {
                warn!(pid, error = %stop_err, "failed to stop companion after failed startup");
            }
            return Err(e);
        }
        handle.state = Liveness::Running;
        info!(pid, "companion running");
        Ok(Some(handle))
    }

    async fn await_ready(&self, handle: &mut CompanionHandle) -> Result<(), LaunchError> {
        let budget = self.cfg.readiness_delay();
        let barrier = async {
            match self.cfg.readiness {
                Readiness::Delay => sleep(budget).await,
                Readiness::Probe => self.probe(budget).await,
            }
        };
        tokio::select! {
            status = handle.child.wait() => {
                handle.state = Liveness::Terminated;
                let status = status?;
                Err(self.spawn_error(format!("exited during startup ({status})")))
            }
            _ = barrier => Ok(()),
        }
    }

    async fn probe(&self, budget: Duration) {
        let url = &self.cfg.url;
        let Some(host) = url.host_str() else {
            warn!(url = %url, "companion url has no host; falling back to fixed delay");
            sleep(budget).await;
            return;
        };
        let addr = format!("{}:{}", host, url.port_or_known_default().unwrap_or(80));
        let deadline = Instant::now() + budget;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            if matches!(timeout(remaining, TcpStream::connect(&addr)).await, Ok(Ok(_))) {
                debug!(%addr, "companion port accepting connections");
                return;
            }
            sleep(PROBE_INTERVAL.min(remaining)).await;
        }
        warn!(%addr, budget_ms = budget.as_millis() as u64, "companion port not ready; continuing");
    }

    fn spawn_error(&self, reason: impl Into<String>) -> LaunchError {
        LaunchError::Spawn {
            program: self.cfg.program.clone(),
            reason: reason.into(),
        }
    }
}

/// Scoped owner of an optional companion: whatever runs inside `scope` is
/// followed by a stop, and dropping the guard early still sends SIGTERM.
#[derive(Debug, Default)]
pub struct CompanionGuard {
    handle: Option<CompanionHandle>,
}

impl CompanionGuard {
    pub fn new(handle: Option<CompanionHandle>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> Option<&CompanionHandle> {
        self.handle.as_ref()
    }

    /// Await `fut`, then stop the companion regardless of its outcome.
    pub async fn scope<F: Future>(mut self, fut: F) -> F::Output {
        let out = fut.await;
        self.stop().await;
        out
    }

    pub async fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take()
            && let Err(e) = handle.stop().await
        {
            warn!(pid = handle.pid(), error = %e, "failed to stop companion");
        }
    }
}

impl Drop for CompanionGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.terminate_now();
        }
    }
}
