//! `/api/mobile`: bearer-token endpoints for the mobile apps.

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::errors::{ApiError, ApiJson, ApiResult};
use super::session::{require_bearer_token, BearerSession};
use super::state::{GuardedJwtIssuer, GuardedUserManager, ServerState};
use crate::user::PremiumStatus;

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct RegisterBody {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
struct CheckPremiumBody {
    user_id: Option<String>,
    email: Option<String>,
}

async fn register(
    State(user_manager): State<GuardedUserManager>,
    State(jwt): State<GuardedJwtIssuer>,
    ApiJson(body): ApiJson<RegisterBody>,
) -> ApiResult<Response> {
    let user = user_manager
        .register_user(
            body.name.as_deref().unwrap_or_default(),
            body.email.as_deref().unwrap_or_default(),
            body.password.as_deref().unwrap_or_default(),
        )
        .map_err(|err| {
            ApiError::from_store(
                "mobile/auth/register",
                "An error occurred during registration",
                err,
            )
        })?;
    let token = jwt.issue_long_term_token(&user).map_err(|err| {
        ApiError::internal(
            "mobile/auth/register",
            "An error occurred during registration",
            err,
        )
    })?;
    info!("Registered mobile user {}", user.id);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": token,
            "user": {
                "id": user.id,
                "email": user.email,
                "name": user.name,
                "isPremium": user.is_premium,
            },
        })),
    )
        .into_response())
}

async fn refresh(
    State(jwt): State<GuardedJwtIssuer>,
    session: BearerSession,
) -> ApiResult<Response> {
    let user = session.user;
    let token = jwt
        .issue_long_term_token(&user)
        .map_err(|err| ApiError::internal("mobile/auth/refresh", "Failed to refresh token", err))?;
    debug!("Refreshed mobile token of {}", user.id);
    Ok(Json(json!({
        "token": token,
        "user": {
            "id": user.id,
            "email": user.email,
            "isPremium": user.is_premium,
            "stripeCustomerId": user.stripe_customer_id,
            "stripeSubscriptionId": user.stripe_subscription_id,
        },
    }))
    .into_response())
}

async fn logout(
    State(user_manager): State<GuardedUserManager>,
    session: BearerSession,
) -> ApiResult<Response> {
    let version = user_manager
        .store()
        .bump_token_version(&session.user.id)
        .map_err(|err| ApiError::internal("mobile/auth/logout", "Failed to log out", err))?;
    info!(
        "Revoked refresh tokens of {} (token version {:?})",
        session.user.id, version
    );
    Ok(Json(json!({ "success": true })).into_response())
}

async fn get_check_premium(session: BearerSession) -> Json<PremiumStatus> {
    Json(PremiumStatus::from_user(&session.user))
}

async fn post_check_premium(
    session: BearerSession,
    ApiJson(body): ApiJson<CheckPremiumBody>,
) -> ApiResult<Json<PremiumStatus>> {
    let matches = body.user_id.as_deref() == Some(session.claims.user_id.as_str())
        && body.email.as_deref() == Some(session.claims.email.as_str());
    if !matches {
        return Err(ApiError::forbidden("Token does not match user"));
    }
    Ok(Json(PremiumStatus::from_user(&session.user)))
}

pub fn make_mobile_routes(state: ServerState) -> Router {
    let guarded = Router::new()
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route(
            "/check-premium",
            get(get_check_premium).post(post_check_premium),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer_token,
        ));
    Router::new()
        .route("/auth/register", post(register))
        .merge(guarded)
        .with_state(state)
}
