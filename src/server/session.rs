//! Request authentication.
//!
//! Web clients authenticate with the opaque `session_token` cookie, mobile clients with
//! a bearer access JWT. Both resolve to the user row as currently stored, so premium
//! status is always read from the database.

use super::errors::ApiError;
use super::state::ServerState;
use crate::user::auth::AuthTokenValue;
use crate::user::{AccessClaims, User};

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::time::Duration;
use tracing::{debug, error};

pub const COOKIE_SESSION_TOKEN_KEY: &str = "session_token";
pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";
const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionKind {
    Web { token: AuthTokenValue },
    Bearer,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub kind: SessionKind,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn email(&self) -> &str {
        &self.user.email
    }

    pub fn is_premium(&self) -> bool {
        self.user.is_premium
    }

    pub fn web_token(&self) -> Option<&AuthTokenValue> {
        match &self.kind {
            SessionKind::Web { token } => Some(token),
            SessionKind::Bearer => None,
        }
    }
}

/// A request authenticated by a bearer access token only.
#[derive(Debug, Clone)]
pub struct BearerSession {
    pub user: User,
    pub claims: AccessClaims,
}

pub enum SessionExtractionError {
    Unauthorized,
    InternalError,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> Response {
        match self {
            SessionExtractionError::Unauthorized => {
                ApiError::unauthorized("Unauthorized").into_response()
            }
            SessionExtractionError::InternalError => {
                ApiError::Internal("Failed to authenticate request".to_string()).into_response()
            }
        }
    }
}

/// Builds the HttpOnly web session cookie.
pub fn session_cookie(token: &AuthTokenValue, max_age: Duration) -> Cookie<'static> {
    Cookie::build(Cookie::new(COOKIE_SESSION_TOKEN_KEY, token.0.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age.as_secs() as i64))
        .build()
}

pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build(Cookie::new(COOKIE_SESSION_TOKEN_KEY, ""))
        .path("/")
        .http_only(true)
        .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1)) // Expire it in the past
        .same_site(SameSite::Lax)
        .build()
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn extract_session_token_from_cookies(
    parts: &mut Parts,
    ctx: &ServerState,
) -> Option<String> {
    // The rejection is Infallible.
    let jar = CookieJar::from_request_parts(parts, ctx).await.ok()?;
    jar.get(COOKIE_SESSION_TOKEN_KEY)
        .map(Cookie::value)
        .filter(|v| !v.is_empty())
        .map(|s| s.to_string())
}

fn extract_session_token_from_headers(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(HEADER_SESSION_TOKEN_KEY)?.to_str().ok()?;
    let value = value.strip_prefix(BEARER_PREFIX).unwrap_or(value).trim();
    (!value.is_empty()).then(|| value.to_string())
}

async fn extract_session_from_request_parts(
    parts: &mut Parts,
    ctx: &ServerState,
) -> Result<Option<Session>, SessionExtractionError> {
    if let Some(claims) = bearer_token(&parts.headers).and_then(|t| ctx.jwt.verify_access_token(t))
    {
        debug!("Bearer token for user_id={}", claims.user_id);
        return match ctx.user_manager.store().get_user(&claims.user_id) {
            Ok(user) => Ok(user.map(|user| Session {
                user,
                kind: SessionKind::Bearer,
            })),
            Err(err) => {
                error!("Failed to load user {}: {}", claims.user_id, err);
                Err(SessionExtractionError::InternalError)
            }
        };
    }

    let token = match extract_session_token_from_cookies(parts, ctx).await {
        Some(token) => token,
        None => match extract_session_token_from_headers(parts) {
            Some(token) => token,
            None => {
                debug!("No token in cookies nor headers.");
                return Ok(None);
            }
        },
    };

    let value = AuthTokenValue(token);
    match ctx.user_manager.get_session_user(&value) {
        Ok(Some((auth_token, user))) => {
            debug!("Found session for user_id={}", auth_token.user_id);
            Ok(Some(Session {
                user,
                kind: SessionKind::Web {
                    token: auth_token.value,
                },
            }))
        }
        Ok(None) => {
            debug!("Session token not found or expired");
            Ok(None)
        }
        Err(err) => {
            error!("Failed to get session from database: {}", err);
            Err(SessionExtractionError::InternalError)
        }
    }
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx)
            .await?
            .ok_or(SessionExtractionError::Unauthorized)
    }
}

impl FromRequestParts<ServerState> for Option<Session> {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx).await
    }
}

impl FromRequestParts<ServerState> for BearerSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let token =
            bearer_token(&parts.headers).ok_or_else(|| ApiError::unauthorized("No token provided"))?;
        let claims = ctx
            .jwt
            .verify_access_token(token)
            .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;
        let user = ctx
            .user_manager
            .store()
            .get_user(&claims.user_id)
            .map_err(|err| ApiError::internal("bearer session", "Failed to load user", err))?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        Ok(BearerSession { user, claims })
    }
}

/// Rejects requests that don't carry a valid bearer access token.
pub async fn require_bearer_token(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return ApiError::unauthorized("Missing or invalid token").into_response();
    };
    if state.jwt.verify_access_token(token).is_none() {
        return ApiError::unauthorized("Invalid token").into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_bearer_tokens_only_with_prefix() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie(
            &AuthTokenValue("tok".to_string()),
            Duration::from_secs(30 * 24 * 60 * 60),
        );
        let rendered = cookie.to_string();
        assert!(rendered.starts_with("session_token=tok"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("SameSite=Lax"));
        assert!(rendered.contains("Path=/"));
        assert!(rendered.contains("Max-Age=2592000"));
    }
}
