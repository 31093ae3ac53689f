//! Named routes generated per entity kind

use crate::types::RecordId;
use serde::Serialize;

/// Route operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    List,
    Detail,
    Create,
    Update,
    Delete,
}

impl RouteAction {
    pub const ALL: [RouteAction; 5] = [
        RouteAction::List,
        RouteAction::Detail,
        RouteAction::Create,
        RouteAction::Update,
        RouteAction::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteAction::List => "list",
            RouteAction::Detail => "detail",
            RouteAction::Create => "create",
            RouteAction::Update => "update",
            RouteAction::Delete => "delete",
        }
    }

    /// Mutating routes sit behind the permission gate
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            RouteAction::Create | RouteAction::Update | RouteAction::Delete
        )
    }
}

/// The five routes of one kind: `{slug}_list`, `{slug}_detail`, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSet {
    slug: String,
}

impl RouteSet {
    pub fn new(slug: impl Into<String>) -> Self {
        Self { slug: slug.into() }
    }

    pub fn name(&self, action: RouteAction) -> String {
        format!("{}_{}", self.slug, action.as_str())
    }

    pub fn list(&self) -> String {
        format!("/{}/", self.slug)
    }

    pub fn create(&self) -> String {
        format!("/{}/create/", self.slug)
    }

    pub fn detail(&self, id: RecordId) -> String {
        format!("/{}/detail/{}/", self.slug, id)
    }

    pub fn update(&self, id: RecordId) -> String {
        format!("/{}/update/{}/", self.slug, id)
    }

    pub fn delete(&self, id: RecordId) -> String {
        format!("/{}/delete/{}/", self.slug, id)
    }

    /// Path pattern for the router, with `:id` for record routes
    pub fn pattern(&self, action: RouteAction) -> String {
        match action {
            RouteAction::List => self.list(),
            RouteAction::Create => self.create(),
            other => format!("/{}/{}/:id/", self.slug, other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_names_and_paths() {
        let routes = RouteSet::new("task");
        assert_eq!(
            RouteAction::ALL.map(|a| routes.name(a)),
            ["task_list", "task_detail", "task_create", "task_update", "task_delete"]
        );
        assert_eq!(routes.list(), "/task/");
        assert_eq!(routes.detail(RecordId(5)), "/task/detail/5/");
        assert_eq!(routes.delete(RecordId(5)), "/task/delete/5/");
        assert_eq!(routes.pattern(RouteAction::Update), "/task/update/:id/");
    }

    #[test]
    fn test_mutations() {
        let mutating: Vec<_> = RouteAction::ALL
            .iter()
            .filter(|a| a.is_mutation())
            .collect();
        assert_eq!(mutating.len(), 3);
    }
}
