//! HTTP interface for the CRUD framework
//!
//! Provides:
//! - Per-kind list/detail/create/update/delete routes
//! - Full-page and HTMX fragment responses
//! - The permission gate in front of mutating routes
//! - Session-scoped notices

pub mod gate;
pub mod handlers;
pub mod notices;
pub mod render;
pub mod responder;
pub mod server;
pub mod session;

pub use gate::HeaderIdentity;
pub use notices::{Notice, NoticeBoard, NoticeLevel};
pub use render::{JsonRenderer, Renderer};
pub use responder::RequestMode;
pub use server::{build_router, ApiServer, ApiServerConfig, AppState};

use crate::error::LearouError;
use axum::{
    response::{IntoResponse, Response},
    Json,
};

impl IntoResponse for LearouError {
    fn into_response(self) -> Response {
        let status = responder::status_for(&self);
        let body = match &self {
            LearouError::Validation(errors) => {
                serde_json::json!({ "error": self.to_string(), "errors": errors })
            }
            _ if !self.is_client_error() => {
                tracing::error!("Request failed: {}", self);
                serde_json::json!({ "error": "internal error" })
            }
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
