//! CLI command handlers
//!
//! Each subcommand of the `learou` binary is implemented in its own module.

pub mod config;
pub mod helpers;
pub mod init;
pub mod kinds;
pub mod seed;
pub mod serve;
