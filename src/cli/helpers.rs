//! Shared helper functions for CLI commands

use learou_core::{error::Result, LearouConfig, LibsqlStorage, Registry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub const DB_PATH_ENV: &str = "LEAROU_DB_PATH";

/// Get the default database path using XDG_DATA_HOME standard
pub fn get_default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("learou")
        .join("learou.db")
}

/// Get the database path from CLI arg, env var, config file, or default
pub fn get_db_path(cli_path: Option<String>, config: &LearouConfig) -> String {
    cli_path
        .or_else(|| std::env::var(DB_PATH_ENV).ok().filter(|p| !p.is_empty()))
        .or_else(|| config.database.path.clone())
        .unwrap_or_else(|| get_default_db_path().to_string_lossy().to_string())
}

/// Open the store with the Learou registry
pub async fn open_storage(
    db_path: &str,
    create_if_missing: bool,
) -> Result<(Arc<Registry>, Arc<LibsqlStorage>)> {
    debug!("Opening database at {}", db_path);
    let registry = Arc::new(Registry::learou()?);
    let storage =
        LibsqlStorage::new_with_validation(db_path, create_if_missing, registry.clone()).await?;
    Ok((registry, Arc::new(storage)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_db_path_precedence() {
        std::env::remove_var(DB_PATH_ENV);
        let mut config = LearouConfig::default();
        assert!(get_db_path(None, &config).ends_with("learou.db"));

        config.database.path = Some("/from/config.db".to_string());
        assert_eq!(get_db_path(None, &config), "/from/config.db");

        std::env::set_var(DB_PATH_ENV, "/from/env.db");
        assert_eq!(get_db_path(None, &config), "/from/env.db");
        assert_eq!(
            get_db_path(Some("/from/cli.db".to_string()), &config),
            "/from/cli.db"
        );
        std::env::remove_var(DB_PATH_ENV);
    }
}
