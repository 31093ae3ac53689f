//! Settings for the Learou server and CLI
//!
//! Loaded in layers: built-in defaults, then an optional TOML file
//! (`learou.toml` in the working directory, or the `--config` path), then
//! `LEAROU_`-prefixed environment variables with `__` between sections.
//!
//! ```toml
//! log_level = "info"
//!
//! [server]
//! addr = "127.0.0.1:8000"
//!
//! [database]
//! path = "/var/lib/learou/learou.db"
//!
//! [auth]
//! user_header = "x-forwarded-user"
//! ```

use crate::error::{LearouError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "learou.toml";
pub const ENV_PREFIX: &str = "LEAROU";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearouConfig {
    /// Log level used when `--log-level` is not given
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_addr")]
    pub addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file; the platform data directory is used when unset
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Header set by the fronting proxy for authenticated users
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            user_header: default_user_header(),
        }
    }
}

fn default_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_user_header() -> String {
    crate::api::gate::DEFAULT_USER_HEADER.to_string()
}

impl LearouConfig {
    /// Load settings from defaults, the config file and the environment
    ///
    /// An explicit `path` must exist; the default `learou.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(LearouError::Configuration(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                debug!("Loading config file {}", path.display());
                builder.add_source(File::from(path.to_path_buf()).required(true))
            }
            None => builder.add_source(File::from(PathBuf::from(DEFAULT_CONFIG_FILE)).required(false)),
        };

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: LearouConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.auth.user_header.trim().is_empty() {
            return Err(LearouError::Configuration(
                "auth.user_header must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.server.addr.parse().map_err(|e| {
            LearouError::Configuration(format!(
                "invalid server.addr '{}': {}",
                self.server.addr, e
            ))
        })
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| LearouError::Other(format!("Failed to serialize config: {}", e)))
    }
}
