use clap::{ArgGroup, CommandFactory, Parser};
use std::ffi::OsString;
use thiserror::Error as ThisError;

/// Operator flags. At most one may be given.
#[derive(Debug, Parser)]
#[command(name = "modweb", version, about = "Modules website CLI")]
#[command(group(
    ArgGroup::new("command")
        .args(["dev", "db_init", "db_migrate", "db_upgrade", "db_downgrade"])
        .multiple(false)
))]
pub struct Cli {
    /// Run the modules server and the website in development mode
    #[arg(long)]
    pub dev: bool,
    /// Initialize the database
    #[arg(long)]
    pub db_init: bool,
    /// Generate a new database migration
    #[arg(long)]
    pub db_migrate: bool,
    /// Apply database migrations
    #[arg(long)]
    pub db_upgrade: bool,
    /// Revert the latest database migration
    #[arg(long)]
    pub db_downgrade: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RunDev,
    DbInit,
    DbMigrate,
    DbUpgrade,
    DbDowngrade,
    Help,
}

impl From<Cli> for Command {
    fn from(cli: Cli) -> Self {
        match cli {
            Cli { dev: true, .. } => Self::RunDev,
            Cli { db_init: true, .. } => Self::DbInit,
            Cli {
                db_migrate: true, ..
            } => Self::DbMigrate,
            Cli {
                db_upgrade: true, ..
            } => Self::DbUpgrade,
            Cli {
                db_downgrade: true,
                ..
            } => Self::DbDowngrade,
            _ => Self::Help,
        }
    }
}

/// Rejected command line, or an explicit `--help`/`--version` request.
#[derive(Debug, ThisError)]
#[error("{0}")]
pub struct UsageError(clap::Error);

impl UsageError {
    /// 0 for `--help`/`--version`, 2 for invalid usage.
    pub fn exit_code(&self) -> i32 {
        self.0.exit_code()
    }

    /// Render clap's message (with usage) to the matching stream.
    pub fn print(&self) {
        let _ = self.0.print();
    }
}

/// Parse the full argument list (including the program name).
pub fn parse_command<I, T>(args: I) -> Result<Command, UsageError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map(Command::from).map_err(UsageError)
}

pub fn print_help() {
    let _ = Cli::command().print_help();
    println!();
}
