//! Hot-reload split: the parent re-executes the launcher as a child carrying
//! [`RELOAD_MARKER`], and restarts it whenever it exits with
//! [`RESTART_EXIT_CODE`]. The child watches source paths and asks for a
//! restart by exiting with that code.

use crate::error::LaunchError;
use crate::service::migrations::exit_code_of;
use crate::supervisor::role::RELOAD_MARKER;
use notify::RecursiveMode;
use notify_debouncer_full::{DebounceEventResult, new_debouncer};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Exit code a reload child uses to request a restart.
pub const RESTART_EXIT_CODE: i32 = 3;

/// Parent side of the reload split.
pub struct ReloadSupervisor {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ReloadSupervisor {
    pub fn new(program: PathBuf, args: Vec<OsString>) -> Self {
        Self { program, args }
    }

    /// Supervisor that re-executes the running binary with its own arguments.
    pub fn current_process() -> Result<Self, LaunchError> {
        let program = std::env::current_exe()?;
        let args = std::env::args_os().skip(1).collect();
        Ok(Self::new(program, args))
    }

    /// Run children until one exits with something other than
    /// [`RESTART_EXIT_CODE`], or `shutdown` resolves. Returns the exit code
    /// the launcher should finish with.
    pub async fn supervise<S>(&self, shutdown: S) -> Result<i32, LaunchError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut generation: u32 = 0;
        loop {
            generation += 1;
            let mut child = Command::new(&self.program)
                .args(&self.args)
                .env(RELOAD_MARKER, "true")
                .spawn()?;
            let pid = child.id();
            info!(generation, pid, "started reload child");

            tokio::select! {
                status = child.wait() => {
                    let code = exit_code_of(status?);
                    if code == RESTART_EXIT_CODE {
                        info!(generation, "reload child requested restart");
                        continue;
                    }
                    info!(generation, code, "reload child exited");
                    return Ok(code);
                }
                _ = &mut shutdown => {
                    if let Some(pid) = child.id() {
                        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
                        if rc != 0 {
                            warn!(pid, error = %std::io::Error::last_os_error(), "SIGTERM to reload child failed");
                        }
                    }
                    let status = child.wait().await?;
                    info!(generation, %status, "reload child stopped on shutdown");
                    return Ok(0);
                }
            }
        }
    }
}

/// Arm a debounced watcher over `paths` and return a future that resolves on
/// the first batch of changes. Paths that do not exist are skipped.
///
/// The watcher is registered before this returns, so changes made after the
/// call are never missed.
pub fn watch_for_changes(
    paths: &[PathBuf],
    debounce: Duration,
) -> Result<impl Future<Output = ()> + Send + 'static, LaunchError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
        // receiver gone means the server already stopped
        let _ = tx.send(result);
    })?;

    let mut watched = 0usize;
    for path in paths {
        if !path.exists() {
            debug!(path = %path.display(), "reload watch path missing; skipped");
            continue;
        }
        debouncer.watch(path, RecursiveMode::Recursive)?;
        watched += 1;
    }
    debug!(paths = watched, debounce_ms = debounce.as_millis() as u64, "reload watcher armed");

    Ok(async move {
        let _debouncer = debouncer;
        while let Some(result) = rx.recv().await {
            match result {
                Ok(events) => {
                    let changed: Vec<&Path> = events
                        .iter()
                        .filter(|e| !e.kind.is_access())
                        .flat_map(|e| e.paths.iter().map(PathBuf::as_path))
                        .collect();
                    if let Some(first) = changed.first() {
                        info!(path = %first.display(), files = changed.len(), "source change detected; reloading");
                        return;
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "reload watcher error");
                    }
                }
            }
        }
        // debouncer thread ended; nothing left to watch
        std::future::pending::<()>().await
    })
}
