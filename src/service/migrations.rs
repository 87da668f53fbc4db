use crate::config::{Config, MigrationConfig};
use crate::error::LaunchError;
use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOp {
    /// Generate a new migration.
    Migrate,
    /// Apply pending migrations.
    Upgrade,
    /// Revert the latest migration.
    Downgrade,
}

impl MigrationOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Migrate => "migrate",
            Self::Upgrade => "upgrade",
            Self::Downgrade => "downgrade",
        }
    }
}

/// Runs the external migration tool once, forwarding its stdio.
pub struct MigrationRunner {
    program: String,
    migrations: MigrationConfig,
    database_url: String,
}

impl MigrationRunner {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            program: cfg.migrations.program.clone(),
            migrations: cfg.migrations.clone(),
            database_url: cfg.basic.database_url.clone(),
        }
    }

    fn args(&self, op: MigrationOp) -> &[String] {
        match op {
            MigrationOp::Migrate => &self.migrations.migrate_args,
            MigrationOp::Upgrade => &self.migrations.upgrade_args,
            MigrationOp::Downgrade => &self.migrations.downgrade_args,
        }
    }

    /// Run `op` to completion. A non-zero exit becomes `ExternalTool` with the
    /// tool's own code.
    pub async fn run(&self, op: MigrationOp) -> Result<(), LaunchError> {
        let args = self.args(op);
        info!(op = op.as_str(), program = %self.program, ?args, "running migration tool");

        let status = Command::new(&self.program)
            .args(args)
            .env("DATABASE_URL", &self.database_url)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    LaunchError::ExternalTool {
                        tool: self.program.clone(),
                        code: None,
                    }
                } else {
                    LaunchError::Io(e)
                }
            })?;

        if status.success() {
            return Ok(());
        }
        let code = exit_code_of(status);
        error!(op = op.as_str(), program = %self.program, code, "migration tool failed");
        Err(LaunchError::ExternalTool {
            tool: self.program.clone(),
            code: Some(code),
        })
    }
}

/// Shell-style exit code: the status code, or 128 + signal number.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1)
}
