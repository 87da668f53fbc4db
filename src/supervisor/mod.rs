//! Companion ownership and the hot-reload process split.
//!
//! Layout:
//! - `role.rs`: environment snapshot and the parent/child `ReloadRole`
//! - `companion.rs`: spawn, readiness barrier, and guaranteed stop of the companion
//! - `reload.rs`: parent re-exec loop and the child's change watcher

pub mod companion;
pub mod reload;
pub mod role;

pub use companion::{CompanionGuard, CompanionHandle, CompanionSupervisor, Liveness};
pub use reload::{RESTART_EXIT_CODE, ReloadSupervisor};
pub use role::{ProcessEnv, RELOAD_MARKER, ReloadRole};

use crate::error::LaunchError;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::info;

/// SIGINT/SIGTERM listeners, installed before the companion starts. A signal
/// that arrives before `recv` is polled is held until then.
pub struct ShutdownSignal {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignal {
    pub fn install() -> Result<Self, LaunchError> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Resolves on the first SIGINT or SIGTERM.
    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("interrupt received; shutting down"),
            _ = self.terminate.recv() => info!("terminate received; shutting down"),
        }
    }
}
