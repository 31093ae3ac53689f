//! The Learou entity catalog

use super::{EntityKind, FieldDescriptor as F};

/// Slugs of every registered kind, in declaration order
pub const KIND_SLUGS: &[&str] = &[
    "task_type",
    "task_status",
    "task",
    "link_type",
    "link",
    "review",
    "author",
    "bibliography_type",
    "bibliography",
    "cheatsheet",
    "technology",
    "project_type",
    "project_status",
    "project",
    "diary",
    "diary_entry",
    "custom_model_name_collection",
    "custom_model_name",
];

/// Kind holding naming override collections
pub const NAMING_COLLECTION: &str = "custom_model_name_collection";
/// Kind holding the individual aliases
pub const NAMING_ALIAS: &str = "custom_model_name";

/// Lookup tables such as task statuses: name, description, icon
fn type_kind(slug: &'static str, display_name: &'static str) -> EntityKind {
    EntityKind::new(slug, display_name).field(F::image("icon", "Image"))
}

pub fn catalog() -> Vec<EntityKind> {
    vec![
        type_kind("task_type", "Task Type"),
        type_kind("task_status", "Task Status"),
        EntityKind::new("task", "Task")
            .field(F::to_one("status", "Status", "task_status").required())
            .field(F::to_one("task_type", "Type", "task_type").required()),
        type_kind("link_type", "Link Type"),
        EntityKind::new("link", "Link").field(F::url("url", "Link").required()),
        EntityKind::new("review", "Review").with_timestamps(),
        type_kind("author", "Author").field(F::to_many("review", "Review", "review")),
        type_kind("bibliography_type", "Bibliography Type"),
        EntityKind::new("bibliography", "Bibliography")
            .field(F::to_many("authors", "Authors", "author"))
            .field(F::date("publication_date", "Publication date"))
            .field(F::long_text("extra_data", "Extra data"))
            .field(F::to_many("review", "Review", "review"))
            .field(F::to_many("link", "Link", "link")),
        EntityKind::new("cheatsheet", "Cheat Sheet")
            .field(F::to_many("bibliography", "Bibliography", "bibliography"))
            .field(F::to_many("review", "Review", "review"))
            .field(F::to_many("link", "Link", "link")),
        EntityKind::new("technology", "Technology")
            .field(F::to_many("bibliography", "Bibliography", "bibliography"))
            .field(F::to_many("review", "Review", "review"))
            .field(F::to_many("link", "Link", "link"))
            .field(F::to_many("cheat_sheet", "Cheat Sheet", "cheatsheet")),
        type_kind("project_type", "Project Type"),
        type_kind("project_status", "Project Status"),
        EntityKind::new("project", "Project")
            .field(F::to_one("project_type", "Project Type", "project_type").required())
            .field(F::to_one("project_status", "Project Status", "project_status").required())
            .field(F::to_one("parent", "Parent project", "project").reverse("Subprojects"))
            .field(F::to_many("review", "Review", "review"))
            .field(F::to_many("link", "Link", "link"))
            .field(F::to_many("bibliography", "Bibliography", "bibliography"))
            .field(F::to_many("tasks", "Task", "task"))
            .with_timestamps(),
        EntityKind::new("diary", "Diary")
            .field(F::to_many("review", "Review", "review"))
            .field(F::to_many("link", "Link", "link"))
            .field(F::to_many("bibliography", "Bibliography", "bibliography"))
            .field(F::to_many("tasks", "Task", "task"))
            .field(F::to_many("project", "Project", "project"))
            .with_timestamps(),
        EntityKind::new("diary_entry", "Diary Entry")
            .field(F::to_many("diary", "Diary", "diary"))
            .field(F::to_many("review", "Review", "review"))
            .field(F::to_many("link", "Link", "link"))
            .field(F::to_many("bibliography", "Bibliography", "bibliography"))
            .field(F::to_many("tasks", "Task", "task"))
            .field(F::to_many("project", "Project", "project"))
            .with_timestamps(),
        EntityKind::new(NAMING_COLLECTION, "Custom Model Name Collection")
            .field(F::boolean("active", "Active"))
            .single_active("active"),
        EntityKind::new(NAMING_ALIAS, "Custom Model Name")
            .field(F::to_one("collection", "Collection", NAMING_COLLECTION).required())
            .field(F::choice("model", "Model", KIND_SLUGS).required())
            .field(F::text("custom_name", "Custom name").required())
            .unique_together(&["model", "collection"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugs_match_catalog() {
        let slugs: Vec<&str> = catalog().iter().map(|k| k.slug).collect();
        assert_eq!(slugs, KIND_SLUGS);
    }
}
