//! The `websocketid` session cookie.

use axum::extract::FromRequestParts;
use axum::http::header::SET_COOKIE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::warn;
use wsrpc_protocol::control::SESSION_COOKIE;

use crate::connection::ClientId;
use crate::error::TransportError;

/// Read the session token from the request's `Cookie` headers.
pub fn session_cookie(headers: &HeaderMap) -> Option<ClientId> {
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().trim_matches('"').to_owned())
        .filter(|value| !value.is_empty())
        .map(ClientId::from)
}

/// `Set-Cookie` value issuing `client_id` for the whole site.
pub fn set_cookie_header(client_id: &ClientId) -> Option<HeaderValue> {
    let cookie = Cookie::build((SESSION_COOKIE, client_id.as_str().to_owned()))
        .path("/")
        .same_site(SameSite::Strict)
        .build();
    HeaderValue::from_str(&cookie.to_string()).ok()
}

pub(crate) fn insert_set_cookie(headers: &mut HeaderMap, client_id: &ClientId) {
    if let Some(value) = set_cookie_header(client_id) {
        headers.append(SET_COOKIE, value);
    }
}

/// Application handlers take `ClientId` to address the browser that sent
/// the request.
impl<S: Send + Sync> FromRequestParts<S> for ClientId {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_cookie(&parts.headers).ok_or_else(|| {
            warn!("{} on {}: try reloading the page", TransportError::MissingSessionCookie, parts.uri.path());
            (StatusCode::BAD_REQUEST, "missing websocketid cookie; reload the page")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;

    fn headers(cookies: &[&str]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for c in cookies {
            h.append(COOKIE, HeaderValue::from_str(c).unwrap());
        }
        h
    }

    #[test]
    fn finds_cookie_among_others() {
        let h = headers(&["theme=dark; websocketid=abc-123; lang=en"]);
        assert_eq!(session_cookie(&h), Some(ClientId::from("abc-123")));
    }

    #[test]
    fn finds_cookie_in_second_header() {
        let h = headers(&["theme=dark", "websocketid=xyz"]);
        assert_eq!(session_cookie(&h), Some(ClientId::from("xyz")));
    }

    #[test]
    fn missing_or_empty_cookie() {
        assert_eq!(session_cookie(&headers(&[])), None);
        assert_eq!(session_cookie(&headers(&["websocketid="])), None);
        assert_eq!(session_cookie(&headers(&["websocketidx=1"])), None);
    }

    #[test]
    fn quoted_value_is_unwrapped() {
        let h = headers(&["websocketid=\"q-1\""]);
        assert_eq!(session_cookie(&h), Some(ClientId::from("q-1")));
    }

    #[test]
    fn set_cookie_is_site_wide() {
        let v = set_cookie_header(&ClientId::from("tok")).unwrap();
        assert_eq!(v.to_str().unwrap(), "websocketid=tok; SameSite=Strict; Path=/");
    }
}
