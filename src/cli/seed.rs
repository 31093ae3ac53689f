//! Base data seeding command

use learou_core::{error::Result, seed_base_records};
use tracing::debug;

use super::helpers::open_storage;

pub async fn handle(db_path: String) -> Result<()> {
    debug!("Seeding base records into {}", db_path);
    let (registry, storage) = open_storage(&db_path, true).await?;
    let report = seed_base_records(storage.as_ref(), &registry).await?;

    println!(
        "Seeded {} records ({} already present)",
        report.created, report.existing
    );
    Ok(())
}
