//! Base lookup records every fresh database starts with

use crate::error::{LearouError, Result};
use crate::registry::Registry;
use crate::storage::{KindRepository, Repository};
use crate::types::{FieldInput, FieldValue};
use tracing::{debug, info};

/// Kind slug and the record names created for it
pub const BASE_RECORDS: &[(&str, &[&str])] = &[
    ("task_type", &["Feature", "Documentation", "Improvement", "Fix"]),
    ("task_status", &["New", "In progress", "Done", "Blocked"]),
    (
        "bibliography_type",
        &["Book", "Article", "Paper", "Web page", "Video"],
    ),
    (
        "project_status",
        &["New", "In progress", "Finished", "Under maintainment", "Abandoned"],
    ),
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub created: usize,
    pub existing: usize,
}

/// Create any missing base records; running it again changes nothing
pub async fn seed_base_records(repo: &dyn Repository, registry: &Registry) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for (slug, names) in BASE_RECORDS {
        let kind = registry.get(slug).ok_or_else(|| {
            LearouError::Configuration(format!("seed kind '{}' is not registered", slug))
        })?;
        let kind_repo = KindRepository::new(repo, kind);

        for name in names.iter() {
            let mut fields = FieldInput::new();
            fields.insert("name".to_string(), FieldValue::text(*name));
            fields.insert("description".to_string(), FieldValue::text(*name));
            let (_, created) = kind_repo.get_or_create(&fields).await?;
            if created {
                debug!("Seeded {} '{}'", slug, name);
                report.created += 1;
            } else {
                report.existing += 1;
            }
        }
    }

    info!(
        "Seeding finished: {} created, {} already present",
        report.created, report.existing
    );
    Ok(report)
}
