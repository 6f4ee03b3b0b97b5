//! Stripe webhook signature verification and event handling.

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::stripe::StripeGateway;
use crate::user::UserManager;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age, in seconds, of a signed payload.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Malformed signature header")]
    MalformedHeader,
    #[error("Signature timestamp outside of tolerance")]
    TimestampOutOfTolerance,
    #[error("No signature matches the payload")]
    NoMatchingSignature,
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac)
}

/// Hex encoded `v1` signature of `payload` signed at `timestamp`.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Option<String> {
    let mac = mac_for(secret, timestamp, payload)?;
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Builds a full `stripe-signature` header value.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> Option<String> {
    let signature = compute_signature(secret, timestamp, payload)?;
    Some(format!("t={},v1={}", timestamp, signature))
}

/// Checks a `t=<ts>,v1=<hex>[,v1=<hex>...]` header against the payload.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = vec![];
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(SignatureError::MalformedHeader);
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                )
            }
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let matches = signatures.iter().any(|candidate| {
        let (Ok(bytes), Some(mac)) = (hex::decode(candidate), mac_for(secret, timestamp, payload))
        else {
            return false;
        };
        mac.verify_slice(&bytes).is_ok()
    });
    if matches {
        Ok(())
    } else {
        Err(SignatureError::NoMatchingSignature)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> Result<WebhookEvent> {
        serde_json::from_slice(payload).context("Failed to parse webhook event")
    }

    fn object_str(&self, key: &str) -> Option<&str> {
        self.data.object.get(key).and_then(|v| v.as_str())
    }

    fn metadata_user_id(&self) -> Option<&str> {
        self.data
            .object
            .get("metadata")
            .and_then(|m| m.get("userId"))
            .and_then(|v| v.as_str())
    }
}

/// What an event did to the user records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    PremiumSet { user_id: String, is_premium: bool },
    Ignored,
}

/// Applies a verified event. The database is updated, never read back from the event.
pub async fn apply_event(
    event: &WebhookEvent,
    users: &UserManager,
    gateway: &dyn StripeGateway,
) -> Result<WebhookOutcome> {
    let store = users.store();
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let Some(user_id) = event.metadata_user_id() else {
                warn!("Checkout session {} carries no userId", event.id);
                return Ok(WebhookOutcome::Ignored);
            };
            store.set_user_premium(user_id, true)?;
            if let Some(customer) = event.object_str("customer") {
                store.set_user_stripe_customer(user_id, customer)?;
            }
            if let Some(subscription) = event.object_str("subscription") {
                store.set_user_stripe_subscription(user_id, Some(subscription))?;
            }
            info!("User {} upgraded to premium", user_id);
            Ok(WebhookOutcome::PremiumSet {
                user_id: user_id.to_string(),
                is_premium: true,
            })
        }
        "customer.subscription.updated" => {
            let Some(user_id) = event.metadata_user_id() else {
                warn!("Subscription update {} carries no userId", event.id);
                return Ok(WebhookOutcome::Ignored);
            };
            let is_premium = event.object_str("status") == Some("active");
            store.set_user_premium(user_id, is_premium)?;
            info!("User {} subscription updated, premium: {}", user_id, is_premium);
            Ok(WebhookOutcome::PremiumSet {
                user_id: user_id.to_string(),
                is_premium,
            })
        }
        "customer.subscription.deleted" => {
            let Some(user_id) = event.metadata_user_id() else {
                warn!("Subscription deletion {} carries no userId", event.id);
                return Ok(WebhookOutcome::Ignored);
            };
            store.set_user_premium(user_id, false)?;
            store.set_user_stripe_subscription(user_id, None)?;
            info!("User {} subscription deleted", user_id);
            Ok(WebhookOutcome::PremiumSet {
                user_id: user_id.to_string(),
                is_premium: false,
            })
        }
        "invoice.payment_failed" => {
            let Some(subscription_id) = event.object_str("subscription") else {
                debug!("Failed invoice {} has no subscription", event.id);
                return Ok(WebhookOutcome::Ignored);
            };
            let subscription = gateway.retrieve_subscription(subscription_id).await?;
            let Some(user_id) = subscription.user_id() else {
                warn!("Subscription {} carries no userId", subscription_id);
                return Ok(WebhookOutcome::Ignored);
            };
            store.set_user_premium(user_id, false)?;
            info!("User {} lost premium after a failed payment", user_id);
            Ok(WebhookOutcome::PremiumSet {
                user_id: user_id.to_string(),
                is_premium: false,
            })
        }
        other => {
            debug!("Unhandled event type {}", other);
            Ok(WebhookOutcome::Ignored)
        }
    }
}
