//! Handshake credential extraction.
//!
//! Browsers cannot set headers on a WebSocket upgrade, so the token may
//! arrive either as `Authorization: Bearer <token>` or as a `token` query
//! parameter. The header wins when both are present.

use axum::http::{header, HeaderMap};
use chatter_core::Handshake;

/// Extract a bearer token from the `Authorization` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Build a [`Handshake`] from an upgrade request's headers and query token.
#[must_use]
pub fn handshake_from_request(headers: &HeaderMap, query_token: Option<&str>) -> Handshake {
    match bearer_token(headers).or(query_token) {
        Some(token) => Handshake::with_token(token),
        None => Handshake::anonymous(),
    }
}
