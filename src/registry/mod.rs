//! Entity registry
//!
//! A static catalog of entity kinds. Each kind carries an explicit, ordered
//! list of field descriptors built at registration time; the repository
//! validates against it and the CRUD controller presents records through it.

pub mod kinds;

use crate::error::{LearouError, Result, ValidationErrors};
use crate::types::{FieldInput, FieldValue, RecordId};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Maximum length of the `name` field
pub const NAME_MAX_LEN: usize = 255;

/// Direction and cardinality of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Directed reference owned by the referencing record
    ToOne,
    /// Unordered set membership
    ToMany,
}

/// Relation to another entity kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationDescriptor {
    pub kind: RelationKind,
    /// Slug of the target kind
    pub target: &'static str,
    /// Label under which the target's detail view lists referrers
    pub reverse_label: Option<&'static str>,
}

/// Semantic type of a field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FieldType {
    Text,
    LongText,
    Number,
    Date,
    Url,
    Boolean,
    /// Path or URL of an uploaded image
    Image,
    Choice { options: &'static [&'static str] },
    Relation(RelationDescriptor),
}

/// Declared field of an entity kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldDescriptor {
    fn new(name: &'static str, label: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            label,
            field_type,
            required: false,
        }
    }

    pub fn text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldType::Text)
    }

    pub fn long_text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldType::LongText)
    }

    pub fn number(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldType::Number)
    }

    pub fn date(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldType::Date)
    }

    pub fn url(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldType::Url)
    }

    pub fn boolean(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldType::Boolean)
    }

    pub fn image(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldType::Image)
    }

    pub fn choice(
        name: &'static str,
        label: &'static str,
        options: &'static [&'static str],
    ) -> Self {
        Self::new(name, label, FieldType::Choice { options })
    }

    pub fn to_one(name: &'static str, label: &'static str, target: &'static str) -> Self {
        Self::new(
            name,
            label,
            FieldType::Relation(RelationDescriptor {
                kind: RelationKind::ToOne,
                target,
                reverse_label: None,
            }),
        )
    }

    pub fn to_many(name: &'static str, label: &'static str, target: &'static str) -> Self {
        Self::new(
            name,
            label,
            FieldType::Relation(RelationDescriptor {
                kind: RelationKind::ToMany,
                target,
                reverse_label: None,
            }),
        )
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Expose referrers on the target's detail view under `label`
    pub fn reverse(mut self, label: &'static str) -> Self {
        if let FieldType::Relation(ref mut relation) = self.field_type {
            relation.reverse_label = Some(label);
        }
        self
    }

    pub fn relation(&self) -> Option<&RelationDescriptor> {
        match &self.field_type {
            FieldType::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    pub fn is_to_one(&self) -> bool {
        matches!(self.relation(), Some(r) if r.kind == RelationKind::ToOne)
    }

    pub fn is_to_many(&self) -> bool {
        matches!(self.relation(), Some(r) if r.kind == RelationKind::ToMany)
    }

    /// Check one value against the declared type
    fn check_value(&self, value: &FieldValue, errors: &mut ValidationErrors) {
        if value.is_empty() {
            if self.required {
                errors.add(self.name, "This field is required.");
            }
            if matches!(self.field_type, FieldType::Boolean) {
                errors.add(self.name, "Must be true or false.");
            }
            return;
        }

        match (&self.field_type, value) {
            (FieldType::Text | FieldType::LongText | FieldType::Image, FieldValue::Text(s)) => {
                if self.name == "name" && s.trim().chars().count() > NAME_MAX_LEN {
                    errors.add(
                        self.name,
                        format!("Ensure this value has at most {} characters.", NAME_MAX_LEN),
                    );
                }
            }
            (FieldType::Url, FieldValue::Text(s)) => {
                if !is_valid_url(s) {
                    errors.add(self.name, "Enter a valid URL.");
                }
            }
            (FieldType::Choice { options }, FieldValue::Text(s)) => {
                if !options.contains(&s.as_str()) {
                    errors.add(self.name, format!("'{}' is not one of the available choices.", s));
                }
            }
            (FieldType::Number, FieldValue::Number(n)) => {
                if !n.is_finite() {
                    errors.add(self.name, "Enter a number.");
                }
            }
            (FieldType::Date, FieldValue::Date(_)) | (FieldType::Boolean, FieldValue::Bool(_)) => {}
            (FieldType::Relation(r), FieldValue::Ref(_)) if r.kind == RelationKind::ToOne => {}
            (FieldType::Relation(r), FieldValue::Refs(_)) if r.kind == RelationKind::ToMany => {}
            _ => errors.add(self.name, "Value has the wrong type for this field."),
        }
    }

    /// Parse submitted form values for this field
    ///
    /// Returns `None` when the field was not submitted and the form is partial.
    fn parse_raw(
        &self,
        raw: Option<&Vec<String>>,
        complete: bool,
        errors: &mut ValidationErrors,
    ) -> Option<FieldValue> {
        let Some(values) = raw else {
            if !complete {
                return None;
            }
            // Unchecked checkboxes and empty multi-selects are not submitted
            return Some(match self.field_type {
                FieldType::Boolean => FieldValue::Bool(false),
                _ if self.is_to_many() => FieldValue::Refs(Vec::new()),
                _ => FieldValue::Null,
            });
        };

        if self.is_to_many() {
            let mut ids = Vec::new();
            for raw in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
                match RecordId::parse(raw) {
                    Some(id) => ids.push(id),
                    None => errors.add(
                        self.name,
                        format!("Select a valid choice. {} is not one of the available choices.", raw),
                    ),
                }
            }
            return Some(FieldValue::refs(ids));
        }

        let raw = values.last().map(|v| v.trim()).unwrap_or_default();
        if raw.is_empty() {
            return Some(match self.field_type {
                FieldType::Boolean => FieldValue::Bool(false),
                _ => FieldValue::Null,
            });
        }

        let parsed = match &self.field_type {
            FieldType::Text
            | FieldType::LongText
            | FieldType::Url
            | FieldType::Image
            | FieldType::Choice { .. } => Some(FieldValue::text(raw)),
            FieldType::Number => raw.parse::<f64>().ok().map(FieldValue::Number),
            FieldType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(FieldValue::Date),
            FieldType::Boolean => match raw.to_ascii_lowercase().as_str() {
                "on" | "true" | "1" | "yes" => Some(FieldValue::Bool(true)),
                "off" | "false" | "0" | "no" => Some(FieldValue::Bool(false)),
                _ => None,
            },
            FieldType::Relation(_) => RecordId::parse(raw).map(FieldValue::Ref),
        };

        if parsed.is_none() {
            let message = match self.field_type {
                FieldType::Number => "Enter a number.",
                FieldType::Date => "Enter a valid date.",
                FieldType::Boolean => "Must be true or false.",
                _ => "Select a valid choice.",
            };
            errors.add(self.name, message);
        }
        parsed
    }
}

/// Absolute http(s) URL with a host
fn is_valid_url(s: &str) -> bool {
    match Url::parse(s) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Declared entity kind
#[derive(Debug, Clone, Serialize)]
pub struct EntityKind {
    /// URL-safe identifier, also the base of the route names
    pub slug: &'static str,
    pub display_name: &'static str,
    pub fields: Vec<FieldDescriptor>,
    /// Field combinations that must be unique across records of the kind
    pub unique_together: Vec<&'static [&'static str]>,
    /// Boolean field that may be true on at most one record
    pub single_active: Option<&'static str>,
    /// Show created/updated timestamps on the detail view
    pub show_timestamps: bool,
}

impl EntityKind {
    /// Declare a kind with the `name` and `description` fields every kind has
    pub fn new(slug: &'static str, display_name: &'static str) -> Self {
        Self {
            slug,
            display_name,
            fields: vec![
                FieldDescriptor::text("name", "Name").required(),
                FieldDescriptor::long_text("description", "Description"),
            ],
            unique_together: Vec::new(),
            single_active: None,
            show_timestamps: false,
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn unique_together(mut self, fields: &'static [&'static str]) -> Self {
        self.unique_together.push(fields);
        self
    }

    pub fn single_active(mut self, field: &'static str) -> Self {
        self.single_active = Some(field);
        self
    }

    pub fn with_timestamps(mut self) -> Self {
        self.show_timestamps = true;
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&FieldDescriptor, &RelationDescriptor)> {
        self.fields
            .iter()
            .filter_map(|f| f.relation().map(|r| (f, r)))
    }

    /// Parse urlencoded form pairs into typed field input
    ///
    /// A complete form replaces every field: omitted booleans become false,
    /// omitted to-many relations become empty and other omitted fields null.
    /// A partial form only carries the fields that were submitted. Keys that
    /// name no declared field are ignored.
    pub fn parse_form(&self, pairs: &[(String, String)], complete: bool) -> Result<FieldInput> {
        let mut grouped: HashMap<&str, Vec<String>> = HashMap::new();
        for (key, value) in pairs {
            grouped.entry(key.as_str()).or_default().push(value.clone());
        }

        let mut errors = ValidationErrors::new();
        let mut input = FieldInput::new();
        for field in &self.fields {
            if let Some(value) = field.parse_raw(grouped.get(field.name), complete, &mut errors) {
                input.insert(field.name.to_string(), value);
            }
        }

        errors.into_result()?;
        Ok(input)
    }

    /// Validate input shape: known fields, types, required values
    ///
    /// Checks that need the store (uniqueness, reference targets) are done by
    /// the repository.
    pub fn check_fields(&self, input: &FieldInput, creating: bool) -> Result<()> {
        let mut errors = ValidationErrors::new();

        for key in input.keys() {
            if self.get_field(key).is_none() {
                errors.add(key.as_str(), format!("Unknown field for {}.", self.display_name));
            }
        }

        for field in &self.fields {
            match input.get(field.name) {
                Some(value) => field.check_value(value, &mut errors),
                None if creating && field.required => {
                    errors.add(field.name, "This field is required.")
                }
                None => {}
            }
        }

        errors.into_result()
    }

    /// Extract the `name` value from input
    pub fn name_of(input: &FieldInput) -> Option<&str> {
        input
            .get("name")
            .and_then(FieldValue::as_text)
            .map(str::trim)
    }
}

/// The set of registered entity kinds
#[derive(Debug)]
pub struct Registry {
    kinds: Vec<Arc<EntityKind>>,
    by_slug: HashMap<&'static str, usize>,
}

impl Registry {
    /// Build and validate a registry
    ///
    /// Fails with a configuration error on empty slugs or display names,
    /// duplicate slugs or field names, dangling relation targets, and
    /// constraint declarations naming unknown fields.
    pub fn new(kinds: Vec<EntityKind>) -> Result<Self> {
        let mut by_slug = HashMap::new();
        for (index, kind) in kinds.iter().enumerate() {
            if kind.slug.trim().is_empty() {
                return Err(LearouError::Configuration(format!(
                    "entity kind #{} has no slug",
                    index
                )));
            }
            if kind.display_name.trim().is_empty() {
                return Err(LearouError::Configuration(format!(
                    "entity kind '{}' has no display name",
                    kind.slug
                )));
            }
            if by_slug.insert(kind.slug, index).is_some() {
                return Err(LearouError::Configuration(format!(
                    "entity kind '{}' is registered twice",
                    kind.slug
                )));
            }
        }

        for kind in &kinds {
            let mut seen = HashSet::new();
            for field in &kind.fields {
                if !seen.insert(field.name) {
                    return Err(LearouError::Configuration(format!(
                        "field '{}' declared twice on '{}'",
                        field.name, kind.slug
                    )));
                }
                if let Some(relation) = field.relation() {
                    if !by_slug.contains_key(relation.target) {
                        return Err(LearouError::Configuration(format!(
                            "relation '{}.{}' targets unknown kind '{}'",
                            kind.slug, field.name, relation.target
                        )));
                    }
                }
                if let FieldType::Choice { options } = field.field_type {
                    if options.is_empty() {
                        return Err(LearouError::Configuration(format!(
                            "choice field '{}.{}' has no options",
                            kind.slug, field.name
                        )));
                    }
                }
            }

            for group in &kind.unique_together {
                if let Some(missing) = group.iter().find(|name| kind.get_field(name).is_none()) {
                    return Err(LearouError::Configuration(format!(
                        "unique constraint on '{}' names unknown field '{}'",
                        kind.slug, missing
                    )));
                }
            }

            if let Some(flag) = kind.single_active {
                let is_boolean = kind
                    .get_field(flag)
                    .map(|f| f.field_type == FieldType::Boolean)
                    .unwrap_or(false);
                if !is_boolean {
                    return Err(LearouError::Configuration(format!(
                        "single-active flag '{}.{}' must be a boolean field",
                        kind.slug, flag
                    )));
                }
            }
        }

        debug!("Entity registry built with {} kinds", kinds.len());

        Ok(Self {
            kinds: kinds.into_iter().map(Arc::new).collect(),
            by_slug,
        })
    }

    /// The registry of all Learou entity kinds
    pub fn learou() -> Result<Self> {
        Self::new(kinds::catalog())
    }

    pub fn get(&self, slug: &str) -> Option<&Arc<EntityKind>> {
        self.by_slug.get(slug).map(|&index| &self.kinds[index])
    }

    /// Kinds in declaration order
    pub fn kinds(&self) -> impl Iterator<Item = &Arc<EntityKind>> {
        self.kinds.iter()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Relations declared on any kind that point at `target`
    pub fn incoming(&self, target: &str) -> Vec<(Arc<EntityKind>, FieldDescriptor)> {
        self.kinds
            .iter()
            .flat_map(|kind| {
                kind.relations()
                    .filter(|(_, relation)| relation.target == target)
                    .map(|(field, _)| (kind.clone(), field.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn registry() -> Registry {
        Registry::learou().unwrap()
    }

    #[test]
    fn test_catalog_builds() {
        let registry = registry();
        assert!(registry.get("task").is_some());
        assert!(registry.get("diary_entry").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.len(), kinds::KIND_SLUGS.len());
    }

    #[test]
    fn test_missing_display_name_is_configuration_error() {
        let err = Registry::new(vec![EntityKind::new("broken", "")]).unwrap_err();
        assert!(matches!(err, LearouError::Configuration(_)));
    }

    #[test]
    fn test_dangling_relation_is_configuration_error() {
        let kind = EntityKind::new("orphan", "Orphan")
            .field(FieldDescriptor::to_one("owner", "Owner", "missing"));
        let err = Registry::new(vec![kind]).unwrap_err();
        assert!(err.to_string().contains("unknown kind 'missing'"));
    }

    #[test]
    fn test_duplicate_slug_is_configuration_error() {
        let err = Registry::new(vec![
            EntityKind::new("link", "Link"),
            EntityKind::new("link", "Link again"),
        ])
        .unwrap_err();
        assert!(matches!(err, LearouError::Configuration(_)));
    }

    /// Kind covering number, date and boolean fields
    fn measured_kind() -> EntityKind {
        EntityKind::new("reading", "Reading")
            .field(FieldDescriptor::to_one("project", "Project", "project"))
            .field(FieldDescriptor::date("due_date", "Due date"))
            .field(FieldDescriptor::number("progress", "Progress"))
            .field(FieldDescriptor::boolean("completed", "Completed"))
    }

    #[test]
    fn test_parse_complete_form_fills_defaults() {
        let reading = measured_kind();
        let input = reading
            .parse_form(&pairs(&[("name", "  Beta  "), ("progress", "0.5")]), true)
            .unwrap();

        assert_eq!(input["name"], FieldValue::text("Beta"));
        assert_eq!(input["progress"], FieldValue::Number(0.5));
        assert_eq!(input["completed"], FieldValue::Bool(false));
        assert_eq!(input["project"], FieldValue::Null);
        assert_eq!(input["description"], FieldValue::Null);
    }

    #[test]
    fn test_parse_partial_form_skips_missing() {
        let registry = registry();
        let task = registry.get("task").unwrap();
        let input = task.parse_form(&pairs(&[("status", "3")]), false).unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input["status"], FieldValue::Ref(RecordId(3)));
    }

    #[test]
    fn test_parse_repeated_keys_for_to_many() {
        let registry = registry();
        let bibliography = registry.get("bibliography").unwrap();
        let input = bibliography
            .parse_form(
                &pairs(&[("name", "SICP"), ("authors", "4"), ("authors", "2"), ("authors", "")]),
                true,
            )
            .unwrap();
        assert_eq!(
            input["authors"],
            FieldValue::Refs(vec![RecordId(2), RecordId(4)])
        );
        assert_eq!(input["review"], FieldValue::Refs(vec![]));
    }

    #[test]
    fn test_parse_reports_every_bad_field() {
        let reading = measured_kind();
        let err = reading
            .parse_form(
                &pairs(&[("name", "x"), ("due_date", "31/12/2025"), ("progress", "lots")]),
                true,
            )
            .unwrap_err();
        match err {
            LearouError::Validation(errors) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors.for_field("due_date").count(), 1);
                assert_eq!(errors.for_field("progress").count(), 1);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_check_fields_required_on_create() {
        let registry = registry();
        let task = registry.get("task").unwrap();
        let mut input = FieldInput::new();
        input.insert("name".into(), FieldValue::text("Write spec"));

        let err = task.check_fields(&input, true).unwrap_err();
        match err {
            LearouError::Validation(errors) => {
                assert_eq!(errors.for_field("status").count(), 1);
                assert_eq!(errors.for_field("task_type").count(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        // The same input is a valid partial update
        assert!(task.check_fields(&input, false).is_ok());
    }

    #[test]
    fn test_check_fields_rejects_unknown_and_bad_url() {
        let registry = registry();
        let link = registry.get("link").unwrap();
        let mut input = FieldInput::new();
        input.insert("name".into(), FieldValue::text("Docs"));
        input.insert("url".into(), FieldValue::text("not a url"));
        input.insert("colour".into(), FieldValue::text("red"));

        let err = link.check_fields(&input, true).unwrap_err();
        let LearouError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.for_field("url").count(), 1);
        assert_eq!(errors.for_field("colour").count(), 1);
    }

    #[test]
    fn test_choice_field_validates_options() {
        let registry = registry();
        let alias = registry.get("custom_model_name").unwrap();
        let mut input = FieldInput::new();
        input.insert("model".into(), FieldValue::text("spaceship"));
        assert!(alias.check_fields(&input, false).is_err());

        input.insert("model".into(), FieldValue::text("task"));
        assert!(alias.check_fields(&input, false).is_ok());
    }

    #[test]
    fn test_incoming_relations() {
        let registry = registry();
        let incoming = registry.incoming("project");
        let names: Vec<(&str, &str)> = incoming
            .iter()
            .map(|(kind, field)| (kind.slug, field.name))
            .collect();
        assert!(names.contains(&("project", "parent")));
        assert!(names.contains(&("diary_entry", "project")));
        assert!(names.contains(&("diary", "project")));
    }

    #[test]
    fn test_url_check() {
        assert!(is_valid_url("https://doc.rust-lang.org/book/"));
        assert!(is_valid_url("http://localhost:8000"));
        assert!(!is_valid_url("ftp://example.com"));
        assert!(!is_valid_url("https://"));
        assert!(!is_valid_url("https://exa mple.com"));
        assert!(is_valid_url("HTTPS://EXAMPLE.COM"));
        assert!(!is_valid_url("https://exa<mple>.com"));
        assert!(!is_valid_url("http://[::1"));
        assert!(!is_valid_url("https://host:notaport/"));
    }

    #[test]
    fn test_name_limit_ignores_surrounding_whitespace() {
        let registry = registry();
        let review = registry.get("review").unwrap();
        let mut input = FieldInput::new();
        input.insert("name".into(), FieldValue::text(format!("{} ", "n".repeat(NAME_MAX_LEN))));
        assert!(review.check_fields(&input, true).is_ok());

        input.insert("name".into(), FieldValue::text("n".repeat(NAME_MAX_LEN + 1)));
        assert!(review.check_fields(&input, true).is_err());
    }

    proptest! {
        #[test]
        fn prop_name_length_limit(len in 1usize..400) {
            let registry = registry();
            let review = registry.get("review").unwrap();
            let mut input = FieldInput::new();
            input.insert("name".into(), FieldValue::text("n".repeat(len)));
            let result = review.check_fields(&input, true);
            prop_assert_eq!(result.is_ok(), len <= NAME_MAX_LEN);
        }
    }
}
