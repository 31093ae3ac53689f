//! Core data types for Learou records
//!
//! Records of every entity kind share one shape: an identifier, a unique
//! `name`, and a map of declared field values. The field descriptors in
//! [`crate::registry`] give the values their meaning.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for records
///
/// Identifiers are assigned by the store, never reused, and stable for the
/// lifetime of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Parse a record ID from a path segment or form value
    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse::<i64>().ok().filter(|v| *v > 0).map(Self)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum FieldValue {
    /// No value (optional field left empty, or cleared to-one reference)
    Null,
    /// Text, long text, URL, image reference and choice values
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
    /// To-one reference
    Ref(RecordId),
    /// To-many membership, kept sorted and deduplicated
    Refs(Vec<RecordId>),
}

impl FieldValue {
    /// Build a to-many value with canonical ordering
    pub fn refs(ids: impl IntoIterator<Item = RecordId>) -> Self {
        let mut ids: Vec<RecordId> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        FieldValue::Refs(ids)
    }

    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// True for values that render as the empty placeholder
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Refs(ids) => ids.is_empty(),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

static NULL_VALUE: FieldValue = FieldValue::Null;

/// Field values submitted to create or update a record, keyed by field name
pub type FieldInput = BTreeMap<String, FieldValue>;

/// One stored instance of an entity kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub id: RecordId,
    /// Slug of the owning entity kind
    pub kind: String,
    pub name: String,
    /// Values for every declared field except `name`
    pub values: BTreeMap<String, FieldValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    /// Value of a declared field, `Null` when unset
    pub fn value(&self, field: &str) -> &FieldValue {
        self.values.get(field).unwrap_or(&NULL_VALUE)
    }

    pub fn description(&self) -> Option<&str> {
        self.value("description").as_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_parse() {
        assert_eq!(RecordId::parse("5"), Some(RecordId(5)));
        assert_eq!(RecordId::parse(" 12 "), Some(RecordId(12)));
        assert_eq!(RecordId::parse("0"), None);
        assert_eq!(RecordId::parse("-3"), None);
        assert_eq!(RecordId::parse("abc"), None);
    }

    #[test]
    fn test_refs_are_canonical() {
        let value = FieldValue::refs([RecordId(3), RecordId(1), RecordId(3)]);
        assert_eq!(value, FieldValue::Refs(vec![RecordId(1), RecordId(3)]));
    }

    #[test]
    fn test_empty_values() {
        assert!(FieldValue::Null.is_empty());
        assert!(FieldValue::text("  ").is_empty());
        assert!(FieldValue::refs([]).is_empty());
        assert!(!FieldValue::Bool(false).is_empty());
        assert!(!FieldValue::Ref(RecordId(1)).is_empty());
    }
}
