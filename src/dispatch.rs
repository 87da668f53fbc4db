use crate::error::LaunchError;
use crate::service::migrations::MigrationOp;
use crate::types::cli::{Command, parse_command};
use std::ffi::OsString;
use tracing::{debug, error};

/// The side effects a command can trigger. Exactly one runs per invocation.
pub trait Launcher {
    /// Load whatever the non-help commands need. Never called for `Help` or
    /// for a rejected command line.
    fn prepare(&mut self) -> Result<(), LaunchError>;
    /// Development run; resolves to the exit code.
    fn run_dev(&self) -> impl Future<Output = Result<i32, LaunchError>>;
    fn db_init(&self) -> impl Future<Output = Result<(), LaunchError>>;
    fn migrate(&self, op: MigrationOp) -> impl Future<Output = Result<(), LaunchError>>;
    fn print_help(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchState {
    ParsingArgs(Vec<OsString>),
    Running(Command),
    Done(i32),
}

pub struct Dispatcher<L> {
    launcher: L,
    state: DispatchState,
}

impl<L: Launcher> Dispatcher<L> {
    /// `args` is the full argument list, program name first.
    pub fn new(launcher: L, args: Vec<OsString>) -> Self {
        Self {
            launcher,
            state: DispatchState::ParsingArgs(args),
        }
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    /// Advance one transition. No-op once `Done`.
    pub async fn step(&mut self) {
        let next = match self.state.clone() {
            DispatchState::ParsingArgs(args) => match parse_command(args) {
                Ok(command) => {
                    debug!(?command, "command selected");
                    DispatchState::Running(command)
                }
                Err(usage) => DispatchState::Done(report(None, usage.into())),
            },
            DispatchState::Running(command) => DispatchState::Done(self.execute(command).await),
            done @ DispatchState::Done(_) => done,
        };
        self.state = next;
    }

    /// Drive the machine to `Done` and return the exit code.
    pub async fn run(mut self) -> i32 {
        loop {
            if let DispatchState::Done(code) = self.state {
                return code;
            }
            self.step().await;
        }
    }

    async fn execute(&mut self, command: Command) -> i32 {
        if command == Command::Help {
            self.launcher.print_help();
            return 0;
        }
        if let Err(e) = self.launcher.prepare() {
            return report(Some(command), e);
        }
        let result = match command {
            Command::Help => Ok(0),
            Command::RunDev => self.launcher.run_dev().await,
            Command::DbInit => self.launcher.db_init().await.map(|()| 0),
            Command::DbMigrate => self.launcher.migrate(MigrationOp::Migrate).await.map(|()| 0),
            Command::DbUpgrade => self.launcher.migrate(MigrationOp::Upgrade).await.map(|()| 0),
            Command::DbDowngrade => self
                .launcher
                .migrate(MigrationOp::Downgrade)
                .await
                .map(|()| 0),
        };
        result.unwrap_or_else(|e| report(Some(command), e))
    }
}

/// Surface a failure to the operator and map it to the process exit code.
fn report(command: Option<Command>, e: LaunchError) -> i32 {
    match &e {
        LaunchError::Usage(usage) => usage.print(),
        other => error!(?command, error = %other, "command failed"),
    }
    e.exit_code()
}
