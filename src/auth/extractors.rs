use std::{convert::Infallible, net::SocketAddr, time::Duration};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use tracing::warn;
use uuid::Uuid;

use super::jwt::JwtKeys;
use crate::{
    accounts::{
        repo,
        repo_types::{Role, User},
    },
    error::AppError,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "session";

/// The authenticated caller, reloaded from the database on every request so
/// that a disabled account loses access immediately.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

impl From<&User> for CurrentUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            role: u.role,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // already resolved by a role gate
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let token = session_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("authentication required".into()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_access(token).map_err(|e| {
            warn!(error = %e, "invalid or expired session");
            AppError::Unauthorized("invalid or expired session".into())
        })?;

        let user = repo::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("user not found".into()))?;
        if !user.is_active {
            warn!(user_id = %user.id, "disabled account presented a session");
            return Err(AppError::Unauthorized("account is disabled".into()));
        }

        let current = CurrentUser::from(&user);
        parts.extensions.insert(current.clone());
        Ok(current)
    }
}

/// Caller address recorded in the operation log.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(client_ip(&parts.headers, peer)))
    }
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let ip = forwarded
        .or(real)
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    // operation_logs.ip_address is VARCHAR(50)
    ip.chars().take(50).collect()
}

/// Session token from `Authorization: Bearer` or the `session` cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value)
}

pub fn session_cookie(token: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", Duration::ZERO, secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        h.insert(header::COOKIE, HeaderValue::from_static("session=xyz"));
        assert_eq!(session_token(&h), Some("abc"));
    }

    #[test]
    fn reads_session_cookie_among_others() {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=tok.en.value; lang=zh"));
        assert_eq!(session_token(&h), Some("tok.en.value"));
    }

    #[test]
    fn no_token_when_cookie_cleared() {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(session_token(&h), None);
        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn cookie_flags() {
        let c = session_cookie("t", Duration::from_secs(3600), true);
        assert_eq!(c, "session=t; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600; Secure");
        assert_eq!(
            clear_session_cookie(false),
            "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        );
    }

    #[test]
    fn client_ip_precedence() {
        let peer: SocketAddr = "192.168.1.9:5555".parse().unwrap();
        let mut h = HeaderMap::new();
        assert_eq!(client_ip(&h, Some(peer)), "192.168.1.9");
        assert_eq!(client_ip(&h, None), "unknown");

        h.insert("x-real-ip", HeaderValue::from_static("10.1.1.1"));
        assert_eq!(client_ip(&h, Some(peer)), "10.1.1.1");

        h.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.5, 10.0.0.1"));
        assert_eq!(client_ip(&h, Some(peer)), "203.0.113.5");
    }
}
