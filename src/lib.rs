//! Learou - Personal Learning and Knowledge Tracker
//!
//! Projects, tasks, diaries, bibliographies and the other Learou entities are
//! served through one generic CRUD framework:
//! - **Registry**: the catalog of entity kinds and their typed fields
//! - **Storage**: a per-kind repository over a libSQL database
//! - **CRUD**: one controller type bound to each kind
//! - **API**: axum routes, HTMX-aware responses and the permission gate
//!
//! # Example
//!
//! ```ignore
//! use learou_core::{build_router, AppState, HeaderIdentity, LibsqlStorage, Registry};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(Registry::learou()?);
//!     let storage = LibsqlStorage::new_with_validation("learou.db", true, registry.clone()).await?;
//!     let state = AppState::new(registry, Arc::new(storage), HeaderIdentity::default())?;
//!     let router = build_router(state);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod crud;
pub mod error;
pub mod registry;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use api::{build_router, ApiServer, ApiServerConfig, AppState, HeaderIdentity};
pub use config::LearouConfig;
pub use crud::{Caller, Controllers, CrudController, RouteAction, RouteSet};
pub use error::{LearouError, Result, ValidationErrors};
pub use registry::{EntityKind, FieldDescriptor, FieldType, Registry};
pub use storage::{libsql::LibsqlStorage, seed::seed_base_records, KindRepository, Repository};
pub use types::{EntityRecord, FieldInput, FieldValue, RecordId};
