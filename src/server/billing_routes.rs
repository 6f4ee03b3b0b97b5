//! Checkout, subscription management and the Stripe webhook.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::errors::{non_empty, ApiError, ApiJson, ApiResult};
use super::metrics::record_webhook_event;
use super::session::{session_cookie, Session};
use super::state::ServerState;
use crate::billing::{apply_event, verify_signature, StripeGateway, WebhookEvent, WebhookOutcome};
use crate::config::StripeSettings;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
const MOCK_PERIOD_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
struct VerifySubscriptionBody {
    session_id: Option<String>,
}

fn payments(state: &ServerState) -> ApiResult<(&Arc<dyn StripeGateway>, &StripeSettings)> {
    match (&state.stripe, &state.config.stripe) {
        (Some(gateway), Some(settings)) => Ok((gateway, settings)),
        _ => Err(ApiError::ServiceUnavailable(
            "Payments are not configured".to_string(),
        )),
    }
}

fn rfc3339(secs: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

async fn create_checkout_session(
    State(state): State<ServerState>,
    session: Session,
) -> ApiResult<Response> {
    let (gateway, _) = payments(&state)?;
    let checkout = gateway
        .create_checkout_session(session.user_id(), session.email())
        .await
        .map_err(|err| {
            ApiError::internal(
                "create-checkout-session",
                "Failed to create checkout session",
                err,
            )
        })?;
    debug!("Checkout {} started for {}", checkout.id, session.user_id());
    Ok(Json(json!({ "sessionId": checkout.id })).into_response())
}

async fn verify_subscription(
    State(state): State<ServerState>,
    session: Session,
    ApiJson(body): ApiJson<VerifySubscriptionBody>,
) -> ApiResult<Response> {
    let endpoint = "verify-subscription";
    let message = "Failed to verify subscription";
    let (gateway, _) = payments(&state)?;
    let Some(session_id) = non_empty(body.session_id) else {
        return Err(ApiError::bad_request("Session ID is required"));
    };
    let checkout = gateway
        .retrieve_checkout_session(&session_id)
        .await
        .map_err(|err| ApiError::internal(endpoint, message, err))?;
    if !checkout.is_paid() {
        return Err(ApiError::bad_request("Payment not completed"));
    }
    if let Some(owner) = checkout.metadata.get("userId") {
        if owner != session.user_id() {
            warn!(
                "User {} tried to claim checkout {} of {}",
                session.user_id(),
                checkout.id,
                owner
            );
            return Err(ApiError::forbidden("Checkout session belongs to another user"));
        }
    }

    let store = state.user_manager.store();
    let user_id = session.user_id();
    store
        .set_user_premium(user_id, true)
        .and_then(|_| match &checkout.customer {
            Some(customer) => store.set_user_stripe_customer(user_id, customer),
            None => Ok(true),
        })
        .and_then(|_| match &checkout.subscription {
            Some(subscription) => store.set_user_stripe_subscription(user_id, Some(subscription)),
            None => Ok(true),
        })
        .map_err(|err| ApiError::internal(endpoint, message, err))?;
    let user = state
        .user_manager
        .require_user(user_id)
        .map_err(|err| ApiError::internal(endpoint, message, err))?;
    info!("User {} verified checkout {}", user.id, checkout.id);

    let body = Json(json!({ "success": true, "user": user }));
    // Web sessions get a fresh 30 day cookie, bearer clients keep their token.
    match session.web_token() {
        Some(token) => {
            if let Err(err) = state.user_manager.extend_session(token) {
                warn!("Failed to extend session of {}: {}", user.id, err);
            }
            let cookie = session_cookie(token, state.user_manager.session_max_age());
            Ok(([(header::SET_COOKIE, cookie.to_string())], body).into_response())
        }
        None => Ok(body.into_response()),
    }
}

async fn cancel_subscription(
    State(state): State<ServerState>,
    session: Session,
) -> ApiResult<Response> {
    let (gateway, _) = payments(&state)?;
    let Some(subscription_id) = session.user.stripe_subscription_id.as_deref() else {
        return Err(ApiError::not_found("No subscription found"));
    };
    gateway
        .cancel_subscription_at_period_end(subscription_id)
        .await
        .map_err(|err| {
            ApiError::internal("subscription/cancel", "Failed to cancel subscription", err)
        })?;
    info!(
        "User {} cancelled subscription {} at period end",
        session.user_id(),
        subscription_id
    );
    Ok(Json(json!({ "success": true })).into_response())
}

async fn subscription_details(
    State(state): State<ServerState>,
    session: Session,
) -> ApiResult<Response> {
    let (gateway, _) = payments(&state)?;
    let user = &session.user;
    let Some(subscription_id) = user.stripe_subscription_id.as_deref() else {
        if user.is_premium {
            // Premium granted without Stripe, e.g. through the sync endpoint.
            let period_end = chrono::Utc::now().timestamp() + MOCK_PERIOD_SECS;
            return Ok(Json(json!({
                "status": "active",
                "currentPeriodEnd": rfc3339(period_end),
                "cancelAtPeriodEnd": false,
                "mock": true,
                "note": "This is a mock subscription for dev/testing only.",
            }))
            .into_response());
        }
        return Err(ApiError::not_found("No subscription found"));
    };
    let subscription = gateway
        .retrieve_subscription(subscription_id)
        .await
        .map_err(|err| {
            ApiError::internal(
                "subscription/details",
                "Failed to fetch subscription details",
                err,
            )
        })?;
    Ok(Json(json!({
        "status": subscription.status,
        "currentPeriodEnd": rfc3339(subscription.current_period_end),
        "cancelAtPeriodEnd": subscription.cancel_at_period_end,
    }))
    .into_response())
}

async fn stripe_webhook(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let (gateway, settings) = payments(&state)?;
    let Some(signature) = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        warn!("Webhook without {} header", STRIPE_SIGNATURE_HEADER);
        return Err(ApiError::bad_request("Webhook signature verification failed"));
    };
    let now = chrono::Utc::now().timestamp();
    if let Err(err) = verify_signature(&body, signature, &settings.webhook_secret, now) {
        warn!("Webhook signature verification failed: {}", err);
        return Err(ApiError::bad_request("Webhook signature verification failed"));
    }
    let event = WebhookEvent::parse(&body).map_err(|err| {
        warn!("Unparseable webhook: {:#}", err);
        ApiError::bad_request("Invalid webhook payload")
    })?;
    record_webhook_event(&event.event_type);

    let outcome = apply_event(&event, &state.user_manager, gateway.as_ref())
        .await
        .map_err(|err| ApiError::internal("webhooks/stripe", "Webhook handler failed", err))?;
    match outcome {
        WebhookOutcome::PremiumSet {
            user_id,
            is_premium,
        } => debug!(
            "Event {} set premium of {} to {}",
            event.id, user_id, is_premium
        ),
        WebhookOutcome::Ignored => debug!("Event {} ({}) ignored", event.id, event.event_type),
    }
    Ok(Json(json!({ "received": true })).into_response())
}

/// Routes mounted directly under `/api`.
pub fn make_billing_routes(state: ServerState) -> Router {
    Router::new()
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/verify-subscription", post(verify_subscription))
        .route("/subscription/cancel", post(cancel_subscription))
        .route("/subscription/details", get(subscription_details))
        .route("/webhooks/stripe", post(stripe_webhook))
        .with_state(state)
}
