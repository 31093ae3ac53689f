//! Storage layer for Learou records
//!
//! Provides the generic repository contract used by the CRUD controller and
//! its libSQL implementation.

pub mod libsql;
pub mod seed;

use crate::error::Result;
use crate::registry::EntityKind;
use crate::types::{EntityRecord, FieldInput, RecordId};
use async_trait::async_trait;

/// Storage backend trait defining all required operations
///
/// Every operation is scoped to one entity kind; a record fetched through the
/// wrong kind is reported as not found.
#[async_trait]
pub trait Repository: Send + Sync {
    /// All records of a kind in creation order
    async fn list_all(&self, kind: &EntityKind) -> Result<Vec<EntityRecord>>;

    /// Retrieve one record
    async fn get(&self, kind: &EntityKind, id: RecordId) -> Result<EntityRecord>;

    /// Create a record from validated field input
    async fn create(&self, kind: &EntityKind, fields: &FieldInput) -> Result<EntityRecord>;

    /// Replace the provided fields of an existing record
    async fn update(
        &self,
        kind: &EntityKind,
        id: RecordId,
        fields: &FieldInput,
    ) -> Result<EntityRecord>;

    /// Delete a record, applying cascade and orphan rules for to-one references
    async fn delete(&self, kind: &EntityKind, id: RecordId) -> Result<()>;

    /// Look up a record by its unique name
    async fn find_by_name(&self, kind: &EntityKind, name: &str) -> Result<Option<EntityRecord>>;

    /// Name of any record, regardless of kind
    async fn label_of(&self, id: RecordId) -> Result<Option<String>>;

    /// Records of `kind` whose relation `field` points at `target`
    async fn referrers(
        &self,
        kind: &EntityKind,
        field: &str,
        target: RecordId,
    ) -> Result<Vec<EntityRecord>>;

    /// Display alias for a kind from the active naming override collection
    async fn display_alias(&self, slug: &str) -> Result<Option<String>>;

    /// Number of records of a kind
    async fn count(&self, kind: &EntityKind) -> Result<usize>;
}

/// A repository bound to one entity kind
pub struct KindRepository<'a> {
    repo: &'a dyn Repository,
    kind: &'a EntityKind,
}

impl<'a> KindRepository<'a> {
    pub fn new(repo: &'a dyn Repository, kind: &'a EntityKind) -> Self {
        Self { repo, kind }
    }

    pub async fn list_all(&self) -> Result<Vec<EntityRecord>> {
        self.repo.list_all(self.kind).await
    }

    pub async fn get(&self, id: RecordId) -> Result<EntityRecord> {
        self.repo.get(self.kind, id).await
    }

    pub async fn create(&self, fields: &FieldInput) -> Result<EntityRecord> {
        self.repo.create(self.kind, fields).await
    }

    pub async fn update(&self, id: RecordId, fields: &FieldInput) -> Result<EntityRecord> {
        self.repo.update(self.kind, id, fields).await
    }

    pub async fn delete(&self, id: RecordId) -> Result<()> {
        self.repo.delete(self.kind, id).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.repo.count(self.kind).await
    }

    /// Fetch by name, creating the record with the given fields when absent
    pub async fn get_or_create(&self, fields: &FieldInput) -> Result<(EntityRecord, bool)> {
        let name = EntityKind::name_of(fields).unwrap_or_default();
        if let Some(existing) = self.repo.find_by_name(self.kind, name).await? {
            return Ok((existing, false));
        }
        Ok((self.create(fields).await?, true))
    }
}
