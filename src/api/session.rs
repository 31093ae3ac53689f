//! Session cookie middleware
//!
//! Every request gets a [`SessionId`] extension. Requests without the cookie
//! are assigned a fresh id and the response sets it.

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

pub const SESSION_COOKIE: &str = "learou_session";

/// Identifier of the browser session that notices are queued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Read the session cookie from request headers
pub fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| SessionId(value.to_string()))
}

pub async fn session_middleware(mut request: Request, next: Next) -> Response {
    let (session, issued) = match session_from_headers(request.headers()) {
        Some(session) => (session, false),
        None => (SessionId(uuid::Uuid::new_v4().simple().to_string()), true),
    };
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    if issued {
        debug!("Issued session {}", session.as_str());
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE,
            session.as_str()
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!("Could not encode session cookie: {}", e),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; learou_session=abc123"),
        );
        assert_eq!(
            session_from_headers(&headers),
            Some(SessionId("abc123".to_string()))
        );

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("learou_session="));
        assert_eq!(session_from_headers(&headers), None);
    }
}
