//! Per-browser sessions, identified by a cookie.

use std::fmt;

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "analyzer_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Reads the session cookie from the request headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
            .map(Self)
    }

    fn set_cookie(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
            self.0
        ))
        .ok()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Attaches a `SessionId` extension to every request, issuing a cookie when
/// the browser has none.
pub async fn ensure_session(mut request: Request, next: Next) -> Response {
    let existing = SessionId::from_headers(request.headers());
    let session = existing.unwrap_or_default();
    request.extensions_mut().insert(session);

    let mut response = next.run(request).await;
    if existing.is_none() {
        tracing::debug!(%session, "new session");
        if let Some(cookie) = session.set_cookie() {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookie: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        map
    }

    #[test]
    fn finds_session_among_other_cookies() {
        let id = SessionId::new();
        let found = SessionId::from_headers(&headers(&format!(
            "theme=dark; {SESSION_COOKIE}={id}; lang=en"
        )));
        assert_eq!(found, Some(id));
    }

    #[test]
    fn rejects_missing_or_malformed_cookie() {
        assert_eq!(SessionId::from_headers(&HeaderMap::new()), None);
        assert_eq!(SessionId::from_headers(&headers("theme=dark")), None);
        assert_eq!(
            SessionId::from_headers(&headers(&format!("{SESSION_COOKIE}=not-a-uuid"))),
            None
        );
    }

    #[test]
    fn set_cookie_round_trips() {
        let id = SessionId::new();
        let cookie = id.set_cookie().unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.contains("HttpOnly"));
        let name_value = value.split(';').next().unwrap();
        assert_eq!(SessionId::from_headers(&headers(name_value)), Some(id));
    }
}
