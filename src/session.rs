//! Server-side session registry.
//!
//! The browser holds only an opaque id in a cookie; the id-to-user mapping
//! lives in this process. Sessions do not survive a restart and are not
//! shared across processes.

use axum::http::{header, HeaderMap};
use dashmap::DashMap;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session_id";

/// `Set-Cookie` value that removes the session cookie.
pub const EXPIRED_COOKIE: &str = "session_id=deleted; HttpOnly; SameSite=Lax; Path=/; Max-Age=0";

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<Uuid, i64>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Mint a fresh session for the user and return its opaque id.
    pub fn create(&self, user_id: i64) -> Uuid {
        let token = Uuid::new_v4();
        self.sessions.insert(token, user_id);
        token
    }

    pub fn user_id(&self, token: &Uuid) -> Option<i64> {
        self.sessions.get(token).map(|entry| *entry.value())
    }

    pub fn destroy(&self, token: &Uuid) -> bool {
        self.sessions.remove(token).is_some()
    }
}

/// Pull the session id out of the request's `Cookie` header, if any.
pub fn session_token(headers: &HeaderMap) -> Option<Uuid> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        if name == SESSION_COOKIE {
            Uuid::parse_str(value).ok()
        } else {
            None
        }
    })
}

/// `Set-Cookie` value carrying a freshly minted session id.
pub fn session_cookie(token: &Uuid) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn created_session_resolves_to_its_user() {
        let store = SessionStore::new();
        let token = store.create(42);
        assert_eq!(store.user_id(&token), Some(42));
    }

    #[test]
    fn destroyed_session_is_gone() {
        let store = SessionStore::new();
        let token = store.create(42);
        assert!(store.destroy(&token));
        assert_eq!(store.user_id(&token), None);
        assert!(!store.destroy(&token));
    }

    #[test]
    fn unknown_token_resolves_to_nobody() {
        let store = SessionStore::new();
        store.create(42);
        assert_eq!(store.user_id(&Uuid::new_v4()), None);
    }

    #[test]
    fn token_is_parsed_out_of_the_cookie_header() {
        let token = Uuid::new_v4();
        let headers = headers_with_cookie(&format!("theme=dark; session_id={token}; lang=en"));
        assert_eq!(session_token(&headers), Some(token));
    }

    #[test]
    fn missing_or_malformed_cookie_yields_no_token() {
        assert_eq!(session_token(&HeaderMap::new()), None);
        assert_eq!(
            session_token(&headers_with_cookie("session_id=not-a-uuid")),
            None
        );
        assert_eq!(session_token(&headers_with_cookie("theme=dark")), None);
    }

    #[test]
    fn set_cookie_values_carry_the_expected_attributes() {
        let token = Uuid::new_v4();
        let cookie = session_cookie(&token);
        assert!(cookie.starts_with(&format!("session_id={token}")));
        assert!(cookie.contains("HttpOnly"));
        assert!(EXPIRED_COOKIE.contains("Max-Age=0"));
    }
}
