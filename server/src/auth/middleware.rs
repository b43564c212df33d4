use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::error::ChatError;
use crate::presence::UserId;
use crate::state::AppState;

/// Name of the cookie the web client stores its access token in.
pub const TOKEN_COOKIE: &str = "jwt";

/// Authenticated caller of an HTTP route.
/// Resolved from `Authorization: Bearer <token>` or the `jwt` cookie.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ChatError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credential = credential_from_headers(&parts.headers).unwrap_or_default();
        let user_id = state.resolver.resolve(&credential)?;
        Ok(AuthUser(user_id))
    }
}

/// Extract an access token from request headers: bearer header first, then cookie.
pub fn credential_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.to_string())
}
