//! Database initialization command

use learou_core::error::Result;
use tracing::debug;

use super::helpers::open_storage;

/// Create the database if needed and apply migrations
pub async fn handle(db_path: String) -> Result<()> {
    debug!("Initializing database...");
    debug!("Database path: {}", db_path);

    // Opening with create_if_missing runs the migrations
    let (registry, _storage) = open_storage(&db_path, true).await?;

    println!("Database initialized: {} ({} entity kinds)", db_path, registry.len());
    Ok(())
}
