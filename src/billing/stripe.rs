//! Minimal Stripe REST client: checkout sessions and subscriptions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::StripeSettings;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: String,
    pub status: String,
    pub current_period_end: i64,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Subscription {
    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get("userId").map(String::as_str)
    }
}

#[async_trait]
pub trait StripeGateway: Send + Sync {
    /// Starts a subscription checkout for the user, tagging it with the user's id.
    async fn create_checkout_session(&self, user_id: &str, email: &str) -> Result<CheckoutSession>;

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription>;

    /// Schedules the subscription to end with the current billing period.
    async fn cancel_subscription_at_period_end(&self, subscription_id: &str)
        -> Result<Subscription>;
}

pub struct StripeClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    price_id: String,
    public_url: String,
}

impl StripeClient {
    pub fn new(settings: &StripeSettings, public_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            secret_key: settings.secret_key.clone(),
            price_id: settings.price_id.clone(),
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    async fn parse<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Stripe {} request failed with status {}: {}", what, status, body);
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse Stripe {} response", what))
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str, what: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .with_context(|| format!("Failed to reach Stripe for {}", what))?;
        Self::parse(response, what).await
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .with_context(|| format!("Failed to reach Stripe for {}", what))?;
        Self::parse(response, what).await
    }

    fn checkout_form(&self, user_id: &str, email: &str) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "subscription".to_string()),
            ("payment_method_types[]", "card".to_string()),
            ("line_items[0][price]", self.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "success_url",
                format!(
                    "{}/premium/success?session_id={{CHECKOUT_SESSION_ID}}",
                    self.public_url
                ),
            ),
            ("cancel_url", format!("{}/premium", self.public_url)),
            ("customer_email", email.to_string()),
            ("metadata[userId]", user_id.to_string()),
            // Copied onto the subscription so that later subscription events can be mapped back.
            ("subscription_data[metadata][userId]", user_id.to_string()),
        ]
    }
}

#[async_trait]
impl StripeGateway for StripeClient {
    async fn create_checkout_session(&self, user_id: &str, email: &str) -> Result<CheckoutSession> {
        let form = self.checkout_form(user_id, email);
        self.post("/checkout/sessions", &form, "checkout session creation")
            .await
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession> {
        self.get(
            &format!("/checkout/sessions/{}", urlencoding::encode(session_id)),
            "checkout session",
        )
        .await
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription> {
        self.get(
            &format!("/subscriptions/{}", urlencoding::encode(subscription_id)),
            "subscription",
        )
        .await
    }

    async fn cancel_subscription_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription> {
        self.post(
            &format!("/subscriptions/{}", urlencoding::encode(subscription_id)),
            &[("cancel_at_period_end", "true".to_string())],
            "subscription cancellation",
        )
        .await
    }
}
