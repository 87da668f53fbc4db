pub mod bootstrap;
pub mod catalog;
pub mod credentials;
pub mod migrations;
