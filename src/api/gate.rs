//! Identity lookup and the permission gate for mutating routes

use super::server::AppState;
use crate::crud::Caller;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

pub const DEFAULT_USER_HEADER: &str = "x-forwarded-user";
pub const FORBIDDEN_MESSAGE: &str = "You must be logged in to edit";

/// Identity supplied by the fronting proxy in a trusted header
#[derive(Debug, Clone)]
pub struct HeaderIdentity {
    header: HeaderName,
}

impl HeaderIdentity {
    pub fn new(header: &str) -> crate::Result<Self> {
        let header = HeaderName::from_bytes(header.trim().to_ascii_lowercase().as_bytes())
            .map_err(|e| {
                crate::LearouError::Configuration(format!(
                    "invalid identity header '{}': {}",
                    header, e
                ))
            })?;
        Ok(Self { header })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    pub fn caller(&self, headers: &HeaderMap) -> Caller {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Caller::user)
            .unwrap_or_else(Caller::anonymous)
    }
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(DEFAULT_USER_HEADER),
        }
    }
}

/// Reject unauthenticated callers before a mutating handler runs
///
/// Authenticated requests continue with the [`Caller`] as an extension.
pub async fn permission_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let caller = state.identity.caller(request.headers());
    if !caller.is_authenticated() {
        warn!(
            "Rejected unauthenticated {} {}",
            request.method(),
            request.uri().path()
        );
        return (StatusCode::FORBIDDEN, FORBIDDEN_MESSAGE).into_response();
    }

    debug!(
        "Caller {} passed the permission gate",
        caller.username().unwrap_or_default()
    );
    request.extensions_mut().insert(caller);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_identity() {
        let identity = HeaderIdentity::default();
        let mut headers = HeaderMap::new();
        assert!(!identity.caller(&headers).is_authenticated());

        headers.insert(DEFAULT_USER_HEADER, HeaderValue::from_static("  "));
        assert!(!identity.caller(&headers).is_authenticated());

        headers.insert(DEFAULT_USER_HEADER, HeaderValue::from_static("ana"));
        assert_eq!(identity.caller(&headers), Caller::user("ana"));
    }

    #[test]
    fn test_custom_header() {
        let identity = HeaderIdentity::new("X-Remote-User").unwrap();
        assert_eq!(identity.header().as_str(), "x-remote-user");
        assert!(HeaderIdentity::new("bad header").is_err());
    }
}
