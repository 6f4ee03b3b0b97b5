//! In-process stand-ins for Stripe, YouTube and Mixcloud
//!
//! The fakes are deterministic and derive their answers from the ids they
//! are given, so tests can steer them without extra setup.

use super::constants::*;
use anyhow::{bail, Result};
use async_trait::async_trait;
use karaoke_server::billing::{CheckoutSession, StripeGateway, Subscription};
use karaoke_server::search::{Show, ShowSearch, UpstreamError, Video, VideoSearch};
use std::collections::HashMap;
use std::sync::Mutex;

/// Fake Stripe that records cancelled subscriptions
#[derive(Default)]
pub struct FakeStripe {
    pub cancelled: Mutex<Vec<String>>,
}

fn user_metadata(user_id: &str) -> HashMap<String, String> {
    HashMap::from([("userId".to_string(), user_id.to_string())])
}

#[async_trait]
impl StripeGateway for FakeStripe {
    async fn create_checkout_session(&self, user_id: &str, _email: &str) -> Result<CheckoutSession> {
        Ok(CheckoutSession {
            id: format!("{}{}", UNPAID_CHECKOUT_PREFIX, user_id),
            url: Some("https://checkout.stripe.test/session".to_string()),
            payment_status: Some("unpaid".to_string()),
            customer: None,
            subscription: None,
            metadata: user_metadata(user_id),
        })
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession> {
        if let Some(user_id) = session_id.strip_prefix(PAID_CHECKOUT_PREFIX) {
            return Ok(CheckoutSession {
                id: session_id.to_string(),
                url: None,
                payment_status: Some("paid".to_string()),
                customer: Some(format!("cus_{}", user_id)),
                subscription: Some(format!("{}{}", SUBSCRIPTION_PREFIX, user_id)),
                metadata: user_metadata(user_id),
            });
        }
        if let Some(user_id) = session_id.strip_prefix(UNPAID_CHECKOUT_PREFIX) {
            return Ok(CheckoutSession {
                id: session_id.to_string(),
                url: None,
                payment_status: Some("unpaid".to_string()),
                customer: None,
                subscription: None,
                metadata: user_metadata(user_id),
            });
        }
        bail!("No such checkout session: {}", session_id)
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription> {
        let Some(user_id) = subscription_id.strip_prefix(SUBSCRIPTION_PREFIX) else {
            bail!("No such subscription: {}", subscription_id);
        };
        let cancelled = self
            .cancelled
            .lock()
            .unwrap()
            .iter()
            .any(|id| id == subscription_id);
        Ok(Subscription {
            id: subscription_id.to_string(),
            status: "active".to_string(),
            current_period_end: SUBSCRIPTION_PERIOD_END,
            cancel_at_period_end: cancelled,
            metadata: user_metadata(user_id),
        })
    }

    async fn cancel_subscription_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription> {
        self.cancelled
            .lock()
            .unwrap()
            .push(subscription_id.to_string());
        self.retrieve_subscription(subscription_id).await
    }
}

fn video(id: &str, title: &str) -> Video {
    Video {
        id: id.to_string(),
        title: title.to_string(),
        description: String::new(),
        thumbnail: None,
        channel_title: "Sing King".to_string(),
        duration: "3:32".to_string(),
        view_count: "1,234".to_string(),
        published_at: "2020-01-01".to_string(),
    }
}

/// Fake YouTube returning canned karaoke results for any query
pub struct FakeVideoSearch;

#[async_trait]
impl VideoSearch for FakeVideoSearch {
    async fn search_videos(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<Video>, UpstreamError> {
        if query.starts_with("fail") {
            return Err(UpstreamError::QuotaOrKey);
        }
        let videos = vec![
            video(KNOWN_VIDEO_ID, &format!("{} (Karaoke Version)", query)),
            video("abcdefghijk", &format!("{} Official Music Video", query)),
        ];
        Ok(videos.into_iter().take(max_results as usize).collect())
    }

    async fn popular_videos(&self, max_results: u32) -> Result<Vec<Video>, UpstreamError> {
        self.search_videos("popular", max_results).await
    }

    async fn video_details(&self, video_id: &str) -> Result<Option<Video>, UpstreamError> {
        Ok((video_id == KNOWN_VIDEO_ID).then(|| video(KNOWN_VIDEO_ID, "Never Gonna Give You Up")))
    }
}

/// Fake Mixcloud with a single show
pub struct FakeShowSearch;

fn show() -> Show {
    Show {
        key: "/dj/late-night-mix/".to_string(),
        url: "https://www.mixcloud.com/dj/late-night-mix/".to_string(),
        name: "Late Night Mix".to_string(),
        audio_length: 3725,
        play_count: 1500,
        user: None,
        pictures: Default::default(),
    }
}

#[async_trait]
impl ShowSearch for FakeShowSearch {
    async fn search(&self, _query: &str, limit: u32) -> Vec<Show> {
        vec![show()].into_iter().take(limit as usize).collect()
    }

    async fn popular(&self, limit: u32) -> Vec<Show> {
        vec![show()].into_iter().take(limit as usize).collect()
    }
}
