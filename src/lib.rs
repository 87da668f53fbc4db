pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod server;
pub mod service;
pub mod supervisor;
pub mod types;

pub use error::LaunchError;
pub use types::cli::Command;
