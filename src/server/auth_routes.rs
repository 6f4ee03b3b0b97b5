//! `/api/auth`: web sessions, mobile token issuance and premium sync.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::errors::{non_empty, ApiError, ApiJson, ApiResult};
use super::metrics::record_login_attempt;
use super::session::{expired_session_cookie, session_cookie, BearerSession, Session};
use super::state::{GuardedAuthStateStore, GuardedJwtIssuer, GuardedUserManager, ServerState};
use crate::user::User;

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct SignupBody {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CredentialsBody {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
struct RefreshBody {
    refresh_token: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
struct GoogleBody {
    email: Option<String>,
    name: Option<String>,
    id_token: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
struct PremiumSyncBody {
    is_premium: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct AuthErrorQuery {
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OidcCallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn password(value: Option<String>) -> Option<String> {
    value.filter(|p| !p.is_empty())
}

fn token_user(user: &User) -> serde_json::Value {
    json!({ "id": user.id, "email": user.email, "isPremium": user.is_premium })
}

/// Starts a web session and answers with the cookie set.
fn start_web_session(
    user_manager: &GuardedUserManager,
    user: &User,
    endpoint: &str,
) -> ApiResult<(String, header::HeaderValue)> {
    let token = user_manager
        .create_session(&user.id)
        .map_err(|err| ApiError::internal(endpoint, "Failed to create session", err))?;
    let cookie = session_cookie(&token.value, user_manager.session_max_age());
    let cookie = header::HeaderValue::from_str(&cookie.to_string())
        .map_err(|err| ApiError::internal(endpoint, "Failed to create session", err))?;
    Ok((token.value.0, cookie))
}

async fn signup(
    State(user_manager): State<GuardedUserManager>,
    ApiJson(body): ApiJson<SignupBody>,
) -> ApiResult<Response> {
    let user = user_manager
        .register_user(
            body.name.as_deref().unwrap_or_default(),
            body.email.as_deref().unwrap_or_default(),
            body.password.as_deref().unwrap_or_default(),
        )
        .map_err(|err| ApiError::from_store("signup", "An error occurred during registration", err))?;
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))).into_response())
}

async fn login(
    State(user_manager): State<GuardedUserManager>,
    ApiJson(body): ApiJson<CredentialsBody>,
) -> ApiResult<Response> {
    let (Some(email), Some(password)) = (non_empty(body.email), password(body.password)) else {
        return Err(ApiError::bad_request("Email and password are required"));
    };
    let user = match user_manager.authenticate(&email, &password) {
        Ok(Some(user)) => user,
        Ok(None) => {
            record_login_attempt("failure");
            debug!("Failed login for {}", email);
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
        Err(err) => return Err(ApiError::internal("login", "Failed to log in", err)),
    };
    let (token, cookie) = start_web_session(&user_manager, &user, "login")?;
    record_login_attempt("success");
    info!("User {} logged in", user.id);
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "token": token, "user": user })),
    )
        .into_response())
}

async fn logout(
    State(user_manager): State<GuardedUserManager>,
    session: Session,
) -> ApiResult<Response> {
    if let Some(token) = session.web_token() {
        user_manager
            .delete_session(token)
            .map_err(|err| ApiError::internal("logout", "Failed to log out", err))?;
    }
    Ok((
        [(header::SET_COOKIE, expired_session_cookie().to_string())],
        Json(json!({ "success": true })),
    )
        .into_response())
}

async fn get_session(session: Session) -> Response {
    Json(json!({ "user": session.user })).into_response()
}

async fn update_session(
    State(user_manager): State<GuardedUserManager>,
    session: Session,
) -> ApiResult<Response> {
    let Some(token) = session.web_token() else {
        return Err(ApiError::unauthorized("No token found"));
    };
    match user_manager.extend_session(token) {
        Ok(Some(_)) => {
            let cookie = session_cookie(token, user_manager.session_max_age());
            Ok((
                [(header::SET_COOKIE, cookie.to_string())],
                Json(json!({ "success": true })),
            )
                .into_response())
        }
        Ok(None) => Err(ApiError::unauthorized("No token found")),
        Err(err) => Err(ApiError::internal(
            "session/update",
            "Failed to update session",
            err,
        )),
    }
}

fn auth_error_status(kind: Option<&str>) -> (StatusCode, &'static str) {
    match kind {
        Some("Configuration") => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "There is a problem with the server configuration.",
        ),
        Some("AccessDenied") => (
            StatusCode::FORBIDDEN,
            "Access denied. You do not have permission to access this resource.",
        ),
        Some("Verification") => (
            StatusCode::UNAUTHORIZED,
            "The token has expired or is invalid.",
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "An unexpected error occurred.",
        ),
    }
}

async fn auth_error(Query(query): Query<AuthErrorQuery>) -> Response {
    let (status, message) = auth_error_status(query.error.as_deref());
    (status, Json(json!({ "error": message }))).into_response()
}

async fn generate_token(
    State(user_manager): State<GuardedUserManager>,
    State(jwt): State<GuardedJwtIssuer>,
    ApiJson(body): ApiJson<CredentialsBody>,
) -> ApiResult<Response> {
    let (Some(email), Some(password)) = (non_empty(body.email), password(body.password)) else {
        return Err(ApiError::bad_request("Email and password are required"));
    };
    let user = match user_manager.authenticate(&email, &password) {
        Ok(Some(user)) => user,
        Ok(None) => {
            record_login_attempt("failure");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
        Err(err) => return Err(ApiError::internal("generate-token", "Internal server error", err)),
    };
    record_login_attempt("success");
    let pair = jwt
        .issue_token_pair(&user)
        .map_err(|err| ApiError::internal("generate-token", "Internal server error", err))?;
    Ok(Json(json!({
        "token": pair.access_token,
        "refreshToken": pair.refresh_token,
        "user": token_user(&user),
    }))
    .into_response())
}

async fn refresh(
    State(user_manager): State<GuardedUserManager>,
    State(jwt): State<GuardedJwtIssuer>,
    ApiJson(body): ApiJson<RefreshBody>,
) -> ApiResult<Response> {
    let Some(refresh_token) = non_empty(body.refresh_token) else {
        return Err(ApiError::bad_request("Refresh token is required"));
    };
    let claims = jwt
        .verify_refresh_token(&refresh_token)
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired refresh token"))?;
    let user = user_manager
        .store()
        .get_user(&claims.user_id)
        .map_err(|err| ApiError::internal("refresh", "Internal server error", err))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if user.token_version != claims.token_version {
        debug!(
            "Refresh token version {} is stale for user {} (now {})",
            claims.token_version, user.id, user.token_version
        );
        return Err(ApiError::unauthorized("Token version mismatch"));
    }
    let access_token = jwt
        .issue_access_token(&user)
        .map_err(|err| ApiError::internal("refresh", "Failed to generate new access token", err))?;
    Ok(Json(json!({ "accessToken": access_token, "user": token_user(&user) })).into_response())
}

async fn google(
    State(state): State<ServerState>,
    ApiJson(body): ApiJson<GoogleBody>,
) -> ApiResult<Response> {
    let (Some(email), Some(name)) = (non_empty(body.email), non_empty(body.name)) else {
        return Err(ApiError::bad_request("Email and name are required"));
    };
    // With Google configured the claimed identity must be backed by a valid ID token.
    if let Some(oidc_client) = &state.oidc_client {
        let id_token = non_empty(body.id_token)
            .ok_or_else(|| ApiError::bad_request("ID token is required"))?;
        match oidc_client.verify_id_token(&id_token) {
            Ok(identity) if identity.email.eq_ignore_ascii_case(&email) => {}
            Ok(identity) => {
                warn!("ID token for {} presented for {}", identity.email, email);
                return Err(ApiError::unauthorized("Invalid ID token"));
            }
            Err(err) => {
                warn!("Rejected Google ID token: {:#}", err);
                return Err(ApiError::unauthorized("Invalid ID token"));
            }
        }
    }

    let user = state
        .user_manager
        .find_or_create_oauth_user(&email, &name)
        .map_err(|err| ApiError::internal("google", "Internal server error", err))?;
    let pair = state
        .jwt
        .issue_token_pair(&user)
        .map_err(|err| ApiError::internal("google", "Internal server error", err))?;
    info!("Google sign in for user {}", user.id);
    Ok(Json(json!({
        "token": pair.access_token,
        "refreshToken": pair.refresh_token,
        "user": {
            "id": user.id,
            "email": user.email,
            "name": user.name,
            "isPremium": user.is_premium,
        },
    }))
    .into_response())
}

async fn get_premium_sync(session: BearerSession) -> Response {
    // The claim inside the token may be stale, only the stored flag is reported.
    let user = session.user;
    Json(json!({
        "isPremium": user.is_premium,
        "userId": user.id,
        "email": user.email,
        "stripeCustomerId": user.stripe_customer_id,
        "synced": true,
    }))
    .into_response()
}

async fn post_premium_sync(
    State(user_manager): State<GuardedUserManager>,
    session: BearerSession,
    ApiJson(body): ApiJson<PremiumSyncBody>,
) -> ApiResult<Response> {
    let Some(is_premium) = body.is_premium else {
        return Err(ApiError::bad_request("isPremium is required"));
    };
    let store = user_manager.store();
    let user = store
        .set_user_premium(&session.user.id, is_premium)
        .and_then(|_| user_manager.require_user(&session.user.id))
        .map_err(|err| {
            ApiError::internal("premium/sync", "Failed to update premium status", err)
        })?;
    info!("Premium for user {} set to {}", user.id, user.is_premium);
    Ok(Json(json!({
        "isPremium": user.is_premium,
        "userId": user.id,
        "email": user.email,
        "stripeCustomerId": user.stripe_customer_id,
        "updated": true,
    }))
    .into_response())
}

async fn oidc_login(
    State(state): State<ServerState>,
    State(auth_state_store): State<GuardedAuthStateStore>,
) -> ApiResult<Response> {
    let Some(oidc_client) = state.oidc_client.as_ref() else {
        return Err(ApiError::not_found("Google sign-in is not configured"));
    };
    let removed = auth_state_store.cleanup_expired().await;
    if removed > 0 {
        debug!("Dropped {} expired authorization states", removed);
    }
    let (url, auth_state) = oidc_client.authorize_url();
    auth_state_store.store(auth_state).await;
    Ok(Redirect::to(&url).into_response())
}

async fn oidc_callback(
    State(state): State<ServerState>,
    Query(query): Query<OidcCallbackQuery>,
) -> ApiResult<Response> {
    let Some(oidc_client) = state.oidc_client.as_ref() else {
        return Err(ApiError::not_found("Google sign-in is not configured"));
    };
    if let Some(error) = query.error {
        warn!("Identity provider returned error: {}", error);
        return Ok(Redirect::to("/api/auth/error?error=AccessDenied").into_response());
    }
    let (Some(code), Some(csrf)) = (query.code, query.state) else {
        return Err(ApiError::bad_request("Missing code or state"));
    };
    let Some(stored_state) = state.auth_state_store.take(&csrf).await else {
        return Err(ApiError::bad_request("Invalid or expired state"));
    };
    let identity = match oidc_client.exchange_code(&code, &csrf, &stored_state).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!("OIDC code exchange failed: {:#}", err);
            record_login_attempt("failure");
            return Err(ApiError::unauthorized("Authentication failed"));
        }
    };

    let user = state
        .user_manager
        .find_or_create_oauth_user(&identity.email, &identity.name)
        .map_err(|err| ApiError::internal("oidc/callback", "Failed to sign in", err))?;
    let (_, cookie) = start_web_session(&state.user_manager, &user, "oidc/callback")?;
    record_login_attempt("success");
    info!("User {} signed in with Google", user.id);
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

pub fn make_auth_routes(state: ServerState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/session", get(get_session))
        .route("/session/update", post(update_session))
        .route("/error", get(auth_error))
        .route("/generate-token", post(generate_token))
        .route("/refresh", post(refresh))
        .route("/google", post(google))
        .route("/premium/sync", get(get_premium_sync).post(post_premium_sync))
        .route("/oidc/login", get(oidc_login))
        .route("/oidc/callback", get(oidc_callback))
        .with_state(state)
}
