//! Generic CRUD controller
//!
//! One controller type bound to an entity kind descriptor serves list,
//! detail, form, create, update and delete for every kind in the registry.

pub mod routes;

pub use routes::{RouteAction, RouteSet};

use crate::error::{LearouError, Result};
use crate::registry::{EntityKind, FieldDescriptor, FieldType, Registry};
use crate::storage::{KindRepository, Repository};
use crate::types::{EntityRecord, FieldValue, RecordId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Fields never shown in the detail field map
pub const EXCLUDED_FIELDS: &[&str] = &["id", "name", "description"];

/// Rendered in place of empty values
pub const EMPTY_PLACEHOLDER: &str = "-";

/// The identity of the requester as reported by the identity provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    user: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self {
            user: Some(name.into()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn require_authenticated(&self) -> Result<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(LearouError::PermissionDenied(
                "You must be logged in to edit".to_string(),
            ))
        }
    }
}

/// Row of a list page
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub id: RecordId,
    pub name: String,
    pub description: Option<String>,
    pub detail_url: String,
}

impl RecordSummary {
    fn new(record: &EntityRecord, routes: &RouteSet) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            description: record.description().map(str::to_string),
            detail_url: routes.detail(record.id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListPage {
    pub slug: String,
    pub display_name: String,
    pub records: Vec<RecordSummary>,
    pub create_url: String,
}

/// One entry of the detail field map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailField {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailPage {
    pub slug: String,
    pub display_name: String,
    pub record: RecordSummary,
    /// Ordered label and value pairs
    pub fields: Vec<DetailField>,
    pub update_url: String,
    pub delete_url: String,
    pub list_url: String,
}

impl DetailPage {
    /// Value shown for a label
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.label == label)
            .map(|f| f.value.as_str())
    }
}

/// Selectable option of a relation or choice field
#[derive(Debug, Clone, Serialize)]
pub struct FormChoice {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    /// Widget hint: text, textarea, number, date, url, checkbox, image, select, multiselect
    pub widget: &'static str,
    pub required: bool,
    /// Current values as submitted form strings
    pub values: Vec<String>,
    pub choices: Vec<FormChoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormPage {
    pub slug: String,
    pub display_name: String,
    pub action: String,
    pub record: Option<RecordSummary>,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletePage {
    pub slug: String,
    pub display_name: String,
    pub record: RecordSummary,
    pub action: String,
    pub cancel_url: String,
}

fn widget_for(field: &FieldDescriptor) -> &'static str {
    match &field.field_type {
        FieldType::Text => "text",
        FieldType::LongText => "textarea",
        FieldType::Number => "number",
        FieldType::Date => "date",
        FieldType::Url => "url",
        FieldType::Boolean => "checkbox",
        FieldType::Image => "image",
        FieldType::Choice { .. } => "select",
        FieldType::Relation(_) if field.is_to_many() => "multiselect",
        FieldType::Relation(_) => "select",
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Form string representation of a stored value
fn form_values(value: &FieldValue) -> Vec<String> {
    match value {
        FieldValue::Null => Vec::new(),
        FieldValue::Text(s) => vec![s.clone()],
        FieldValue::Number(n) => vec![format_number(*n)],
        FieldValue::Date(d) => vec![d.format("%Y-%m-%d").to_string()],
        FieldValue::Bool(b) => {
            if *b {
                vec!["on".to_string()]
            } else {
                Vec::new()
            }
        }
        FieldValue::Ref(id) => vec![id.to_string()],
        FieldValue::Refs(ids) => ids.iter().map(ToString::to_string).collect(),
    }
}

/// CRUD controller bound to one entity kind
pub struct CrudController {
    kind: Arc<EntityKind>,
    routes: RouteSet,
    registry: Arc<Registry>,
    repo: Arc<dyn Repository>,
}

impl std::fmt::Debug for CrudController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudController")
            .field("kind", &self.kind.slug)
            .finish()
    }
}

impl CrudController {
    /// Bind a controller to a kind
    ///
    /// A missing kind or display name is a configuration error.
    pub fn bind(
        kind: Option<Arc<EntityKind>>,
        registry: Arc<Registry>,
        repo: Arc<dyn Repository>,
    ) -> Result<Self> {
        let kind = kind.ok_or_else(|| {
            LearouError::Configuration("CRUD controller bound to no entity kind".to_string())
        })?;
        if kind.display_name.trim().is_empty() {
            return Err(LearouError::Configuration(format!(
                "CRUD controller for '{}' has no display name",
                kind.slug
            )));
        }
        if registry.get(kind.slug).is_none() {
            return Err(LearouError::Configuration(format!(
                "entity kind '{}' is not registered",
                kind.slug
            )));
        }

        Ok(Self {
            routes: RouteSet::new(kind.slug),
            kind,
            registry,
            repo,
        })
    }

    pub fn kind(&self) -> &Arc<EntityKind> {
        &self.kind
    }

    pub fn routes(&self) -> &RouteSet {
        &self.routes
    }

    fn repository(&self) -> KindRepository<'_> {
        KindRepository::new(self.repo.as_ref(), &self.kind)
    }

    /// Display name, replaced by the active naming override when one exists
    pub async fn display_name(&self) -> Result<String> {
        Ok(self
            .repo
            .display_alias(self.kind.slug)
            .await?
            .unwrap_or_else(|| self.kind.display_name.to_string()))
    }

    pub async fn list(&self) -> Result<ListPage> {
        let records = self.repository().list_all().await?;
        debug!("Listing {} {} records", records.len(), self.kind.slug);

        Ok(ListPage {
            slug: self.kind.slug.to_string(),
            display_name: self.display_name().await?,
            records: records
                .iter()
                .map(|r| RecordSummary::new(r, &self.routes))
                .collect(),
            create_url: self.routes.create(),
        })
    }

    pub async fn detail(&self, id: RecordId) -> Result<DetailPage> {
        let record = self.repository().get(id).await?;
        let fields = self.field_map(&record).await?;

        Ok(DetailPage {
            slug: self.kind.slug.to_string(),
            display_name: self.display_name().await?,
            record: RecordSummary::new(&record, &self.routes),
            fields,
            update_url: self.routes.update(id),
            delete_url: self.routes.delete(id),
            list_url: self.routes.list(),
        })
    }

    /// Label and presentation value for every shown field
    async fn field_map(&self, record: &EntityRecord) -> Result<Vec<DetailField>> {
        let mut fields = Vec::new();

        for field in self
            .kind
            .fields
            .iter()
            .filter(|f| !EXCLUDED_FIELDS.contains(&f.name))
        {
            let value = self.present(record.value(field.name)).await?;
            fields.push(DetailField {
                label: field.label.to_string(),
                value,
            });
        }

        for (source, field) in self.registry.incoming(self.kind.slug) {
            let Some(label) = field.relation().and_then(|r| r.reverse_label) else {
                continue;
            };
            let referrers = self.repo.referrers(&source, field.name, record.id).await?;
            let names: Vec<&str> = referrers.iter().map(|r| r.name.as_str()).collect();
            fields.push(DetailField {
                label: label.to_string(),
                value: if names.is_empty() {
                    EMPTY_PLACEHOLDER.to_string()
                } else {
                    names.join(", ")
                },
            });
        }

        if self.kind.show_timestamps {
            fields.push(DetailField {
                label: "Created at".to_string(),
                value: record.created_at.format("%Y-%m-%d %H:%M").to_string(),
            });
            fields.push(DetailField {
                label: "Updated at".to_string(),
                value: record.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            });
        }

        Ok(fields)
    }

    async fn present(&self, value: &FieldValue) -> Result<String> {
        let text = match value {
            FieldValue::Null => EMPTY_PLACEHOLDER.to_string(),
            FieldValue::Text(s) if s.trim().is_empty() => EMPTY_PLACEHOLDER.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Bool(true) => "Yes".to_string(),
            FieldValue::Bool(false) => "No".to_string(),
            FieldValue::Ref(id) => self
                .repo
                .label_of(*id)
                .await?
                .unwrap_or_else(|| EMPTY_PLACEHOLDER.to_string()),
            FieldValue::Refs(ids) => {
                let mut names = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(name) = self.repo.label_of(*id).await? {
                        names.push(name);
                    }
                }
                if names.is_empty() {
                    EMPTY_PLACEHOLDER.to_string()
                } else {
                    names.join(", ")
                }
            }
        };
        Ok(text)
    }

    /// Editable fields for the create page, or the update page when `id` is set
    pub async fn form(&self, id: Option<RecordId>) -> Result<FormPage> {
        let record = match id {
            Some(id) => Some(self.repository().get(id).await?),
            None => None,
        };

        let mut fields = Vec::with_capacity(self.kind.fields.len());
        for field in &self.kind.fields {
            let choices = match (&field.field_type, field.relation()) {
                (_, Some(relation)) => {
                    let target = self.registry.get(relation.target).ok_or_else(|| {
                        LearouError::Configuration(format!(
                            "relation target '{}' is not registered",
                            relation.target
                        ))
                    })?;
                    self.repo
                        .list_all(target)
                        .await?
                        .into_iter()
                        .map(|r| FormChoice {
                            value: r.id.to_string(),
                            label: r.name,
                        })
                        .collect()
                }
                (FieldType::Choice { options }, None) => options
                    .iter()
                    .map(|o| FormChoice {
                        value: o.to_string(),
                        label: self
                            .registry
                            .get(o)
                            .map(|k| k.display_name)
                            .unwrap_or(*o)
                            .to_string(),
                    })
                    .collect(),
                _ => Vec::new(),
            };

            let values = match &record {
                Some(record) if field.name == "name" => vec![record.name.clone()],
                Some(record) => form_values(record.value(field.name)),
                None => Vec::new(),
            };

            fields.push(FormField {
                name: field.name,
                label: field.label,
                widget: widget_for(field),
                required: field.required,
                values,
                choices,
            });
        }

        Ok(FormPage {
            slug: self.kind.slug.to_string(),
            display_name: self.display_name().await?,
            action: match &record {
                Some(record) => self.routes.update(record.id),
                None => self.routes.create(),
            },
            record: record.as_ref().map(|r| RecordSummary::new(r, &self.routes)),
            fields,
        })
    }

    pub async fn confirm_delete(&self, id: RecordId) -> Result<DeletePage> {
        let record = self.repository().get(id).await?;
        Ok(DeletePage {
            slug: self.kind.slug.to_string(),
            display_name: self.display_name().await?,
            record: RecordSummary::new(&record, &self.routes),
            action: self.routes.delete(id),
            cancel_url: self.routes.detail(id),
        })
    }

    /// Create a record from submitted form pairs
    pub async fn create(
        &self,
        caller: &Caller,
        form: &[(String, String)],
    ) -> Result<EntityRecord> {
        caller.require_authenticated()?;
        let input = self.kind.parse_form(form, true)?;
        let record = self.repository().create(&input).await?;
        info!(
            "{} created {} {}",
            caller.username().unwrap_or_default(),
            self.kind.slug,
            record.id
        );
        Ok(record)
    }

    /// Replace every editable field of an existing record
    pub async fn update(
        &self,
        caller: &Caller,
        id: RecordId,
        form: &[(String, String)],
    ) -> Result<EntityRecord> {
        caller.require_authenticated()?;
        let repo = self.repository();
        repo.get(id).await?;
        let input = self.kind.parse_form(form, true)?;
        let record = repo.update(id, &input).await?;
        info!(
            "{} updated {} {}",
            caller.username().unwrap_or_default(),
            self.kind.slug,
            id
        );
        Ok(record)
    }

    pub async fn delete(&self, caller: &Caller, id: RecordId) -> Result<()> {
        caller.require_authenticated()?;
        self.repository().delete(id).await?;
        info!(
            "{} deleted {} {}",
            caller.username().unwrap_or_default(),
            self.kind.slug,
            id
        );
        Ok(())
    }
}

/// Controllers for every registered kind, built once at startup
#[derive(Debug, Default)]
pub struct Controllers {
    ordered: Vec<Arc<CrudController>>,
    by_slug: HashMap<String, Arc<CrudController>>,
}

impl Controllers {
    pub fn from_registry(registry: Arc<Registry>, repo: Arc<dyn Repository>) -> Result<Self> {
        let mut controllers = Self::default();
        for kind in registry.kinds() {
            let controller = Arc::new(CrudController::bind(
                Some(kind.clone()),
                registry.clone(),
                repo.clone(),
            )?);
            controllers
                .by_slug
                .insert(kind.slug.to_string(), controller.clone());
            controllers.ordered.push(controller);
        }
        info!("Bound {} CRUD controllers", controllers.ordered.len());
        Ok(controllers)
    }

    pub fn get(&self, slug: &str) -> Option<&Arc<CrudController>> {
        self.by_slug.get(slug)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CrudController>> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
