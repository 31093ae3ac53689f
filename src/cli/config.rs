//! Configuration inspection command

use clap::Subcommand;
use learou_core::{error::Result, LearouConfig};

use super::helpers::get_db_path;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Print the resolved database path
    DbPath,
}

pub fn handle(action: ConfigAction, config: &LearouConfig, cli_db_path: Option<String>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", config.to_toml()?);
        }
        ConfigAction::DbPath => {
            println!("{}", get_db_path(cli_db_path, config));
        }
    }
    Ok(())
}
