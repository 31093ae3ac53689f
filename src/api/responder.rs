//! Full-page versus fragment responses
//!
//! Requests sent by the HTMX client carry `HX-Request: true` and are answered
//! with fragments or `HX-Redirect` instructions. Every other request gets
//! full pages and ordinary `303 See Other` redirects.

use super::notices::Notice;
use super::render;
use super::server::AppState;
use super::session::SessionId;
use crate::error::LearouError;
use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, warn};
use url::Url;

pub const HX_REQUEST: &str = "hx-request";
pub const HX_REDIRECT: &str = "hx-redirect";

pub const CREATED_NOTICE: &str = "Your item was successfully created!";
pub const UPDATED_NOTICE: &str = "Your item was successfully updated!";
pub const DELETED_NOTICE: &str = "The deletion was successful";
pub const SAVE_RETRY_NOTICE: &str = "Before trying again, check if your item was created or updated";
pub const DELETE_RETRY_NOTICE: &str = "Before trying again, check if your item was deleted";
pub const INTERNAL_WARNING: &str = "An error occurred and your request could not be completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    FullPage,
    Fragment,
}

impl RequestMode {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let fragment = headers
            .get(HX_REQUEST)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if fragment {
            RequestMode::Fragment
        } else {
            RequestMode::FullPage
        }
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self, RequestMode::Fragment)
    }
}

/// Mutation kinds, for picking the retry notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Update,
    Delete,
}

impl Mutation {
    fn retry_notice(&self) -> &'static str {
        match self {
            Mutation::Create | Mutation::Update => SAVE_RETRY_NOTICE,
            Mutation::Delete => DELETE_RETRY_NOTICE,
        }
    }
}

/// HTTP status for an error surfaced to the user
pub fn status_for(err: &LearouError) -> StatusCode {
    match err {
        LearouError::NotFound { .. } => StatusCode::NOT_FOUND,
        LearouError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LearouError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `303 See Other` to a location
pub fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::SEE_OTHER, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Client-side navigation instruction with an optional body
pub fn hx_redirect(location: &str, body: Option<Value>) -> Response {
    let Ok(value) = HeaderValue::from_str(location) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let mut response = match body {
        Some(body) => (StatusCode::OK, axum::Json(body)).into_response(),
        None => StatusCode::OK.into_response(),
    };
    response.headers_mut().insert(HX_REDIRECT, value);
    response
}

/// Same-origin path of the `Referer`, if any
///
/// Absolute referers are accepted only when their authority matches `Host`,
/// and are reduced to path and query.
pub fn referer(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())?;

    if raw.starts_with('/') {
        return (!raw.starts_with("//") && !raw.starts_with("/\\")).then(|| raw.to_string());
    }

    let url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let authority = match url.port() {
        Some(port) => format!("{}:{}", url.host_str()?, port),
        None => url.host_str()?.to_string(),
    };
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok())?;
    if !authority.eq_ignore_ascii_case(host) {
        return None;
    }

    Some(match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    })
}

/// Per-request response builder
pub struct Responder<'a> {
    state: &'a AppState,
    mode: RequestMode,
    session: &'a SessionId,
}

impl<'a> Responder<'a> {
    pub fn new(state: &'a AppState, headers: &HeaderMap, session: &'a SessionId) -> Self {
        Self {
            state,
            mode: RequestMode::from_headers(headers),
            session,
        }
    }

    pub fn mode(&self) -> RequestMode {
        self.mode
    }

    pub async fn notify(&self, notice: Notice) {
        self.state.notices.push(self.session.as_str(), notice).await;
    }

    /// Render a template, draining the session's notices into `messages`
    pub async fn page(
        &self,
        status: StatusCode,
        template: &str,
        context: impl Serialize,
    ) -> Response {
        let mut context = match serde_json::to_value(context) {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(other) => json!({ "data": other }),
            Err(e) => {
                error!("Failed to serialize context for {}: {}", template, e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };
        let messages = self.state.notices.drain(self.session.as_str()).await;
        context["messages"] = json!(messages);

        match self.state.renderer.render(template, self.mode, context) {
            Ok(body) => (
                status,
                [(header::CONTENT_TYPE, self.state.renderer.content_type())],
                body,
            )
                .into_response(),
            Err(e) => {
                error!("Failed to render {}: {}", template, e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /// Error page for read operations and full-page mutation failures
    pub async fn error_page(&self, err: &LearouError) -> Response {
        let status = status_for(err);
        if status.is_server_error() {
            error!("Request failed: {}", err);
        }
        let message = if status.is_server_error() {
            INTERNAL_WARNING.to_string()
        } else {
            err.to_string()
        };
        self.page(
            status,
            render::ERROR,
            json!({ "status": status.as_u16(), "message": message }),
        )
        .await
    }

    /// Fragment-mode mutation failure: warnings, retry notice, navigate back
    ///
    /// Validation failures keep their field errors in the notices and body;
    /// anything else collapses into one generic warning.
    pub async fn fragment_failure(
        &self,
        err: &LearouError,
        mutation: Mutation,
        headers: &HeaderMap,
        fallback: &str,
    ) -> Response {
        if let LearouError::PermissionDenied(_) = err {
            return (StatusCode::FORBIDDEN, err.to_string()).into_response();
        }

        let body = match err {
            LearouError::Validation(errors) => {
                for field_error in errors.iter() {
                    self.notify(Notice::warning(format!(
                        "{}: {}",
                        field_error.field, field_error.message
                    )))
                    .await;
                }
                Some(json!({ "errors": errors }))
            }
            other => {
                warn!("Mutation failed in fragment request: {}", other);
                self.notify(Notice::warning(INTERNAL_WARNING)).await;
                None
            }
        };
        self.notify(Notice::info(mutation.retry_notice())).await;

        let target = referer(headers).unwrap_or_else(|| fallback.to_string());
        hx_redirect(&target, body)
    }
}
