//! Common test utilities and helpers

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request};
use learou_core::{
    build_router, AppState, Caller, EntityKind, FieldInput, FieldValue, HeaderIdentity,
    LibsqlStorage, RecordId, Registry, Repository,
};
use std::sync::Arc;
use tempfile::TempDir;

pub const TEST_USER: &str = "ana";

/// Storage, registry and app state over a temporary database
///
/// A file is used instead of `:memory:` because libSQL's memory mode gives
/// every connection its own database, so migrations wouldn't persist.
pub struct TestApp {
    pub storage: Arc<LibsqlStorage>,
    pub registry: Arc<Registry>,
    pub state: AppState,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("learou_test.db");
        let registry = Arc::new(Registry::learou().expect("registry"));
        let storage = Arc::new(
            LibsqlStorage::new_with_validation(path.to_str().unwrap(), true, registry.clone())
                .await
                .expect("Failed to create test storage"),
        );
        let state = AppState::new(registry.clone(), storage.clone(), HeaderIdentity::default())
            .expect("app state");
        Self {
            storage,
            registry,
            state,
            _dir: dir,
        }
    }

    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    pub fn kind(&self, slug: &str) -> Arc<EntityKind> {
        self.registry.get(slug).expect("registered kind").clone()
    }

    pub async fn count(&self, slug: &str) -> usize {
        self.storage.count(&self.kind(slug)).await.unwrap()
    }

    /// Create a record directly through the repository
    pub async fn insert(&self, slug: &str, fields: &[(&str, FieldValue)]) -> RecordId {
        let mut input = FieldInput::new();
        for (name, value) in fields {
            input.insert(name.to_string(), value.clone());
        }
        self.storage
            .create(&self.kind(slug), &input)
            .await
            .expect("insert")
            .id
    }

    pub async fn insert_named(&self, slug: &str, name: &str) -> RecordId {
        self.insert(slug, &[("name", FieldValue::text(name))]).await
    }
}

pub fn caller() -> Caller {
    Caller::user(TEST_USER)
}

pub fn form_body(pairs: &[(&str, &str)]) -> String {
    serde_urlencoded::to_string(pairs).expect("urlencoded form")
}

/// Request builder with the options the CRUD routes care about
pub struct TestRequest {
    builder: axum::http::request::Builder,
}

impl TestRequest {
    pub fn get(uri: &str) -> Self {
        Self {
            builder: Request::builder().method(Method::GET).uri(uri),
        }
    }

    pub fn post(uri: &str) -> Self {
        Self {
            builder: Request::builder().method(Method::POST).uri(uri),
        }
    }

    pub fn authenticated(mut self) -> Self {
        self.builder = self.builder.header("x-forwarded-user", TEST_USER);
        self
    }

    pub fn htmx(mut self) -> Self {
        self.builder = self.builder.header("hx-request", "true");
        self
    }

    pub fn referer(mut self, referer: &str) -> Self {
        self.builder = self.builder.header(header::REFERER, referer);
        self
    }

    pub fn session(mut self, id: &str) -> Self {
        self.builder = self
            .builder
            .header(header::COOKIE, format!("learou_session={}", id));
        self
    }

    pub fn form(self, pairs: &[(&str, &str)]) -> Request<Body> {
        self.builder
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form_body(pairs)))
            .unwrap()
    }

    pub fn empty(self) -> Request<Body> {
        self.builder.body(Body::empty()).unwrap()
    }
}

pub async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).to_string()))
}
