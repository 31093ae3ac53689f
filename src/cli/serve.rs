//! HTTP server startup command

use learou_core::{error::Result, ApiServer, ApiServerConfig, LearouConfig, LearouError};
use std::net::SocketAddr;
use tracing::info;

use super::helpers::open_storage;

/// Handle server startup command
///
/// Controller binding errors abort before the listener is bound.
pub async fn handle(db_path: String, addr: Option<String>, config: &LearouConfig) -> Result<()> {
    let addr: SocketAddr = match addr {
        Some(addr) => addr
            .parse()
            .map_err(|e| LearouError::Configuration(format!("invalid --addr '{}': {}", addr, e)))?,
        None => config.socket_addr()?,
    };

    let (registry, storage) = open_storage(&db_path, true).await?;
    info!("Serving {} entity kinds from {}", registry.len(), db_path);

    let server = ApiServer::new(
        ApiServerConfig {
            addr,
            user_header: config.auth.user_header.clone(),
        },
        registry,
        storage,
    )?;

    server.serve().await?;
    Ok(())
}
