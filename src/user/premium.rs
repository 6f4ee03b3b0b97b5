//! Premium entitlement policy.
//!
//! The database row is the only source of truth: callers pass a freshly loaded [`User`],
//! never claims decoded from a token.

use serde::Serialize;
use thiserror::Error;

use super::User;

pub const FREE_USER_PLAYLIST_LIMIT: usize = 3;
pub const FREE_USER_SONG_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeTierLimits {
    pub playlists: usize,
    pub uploads: usize,
}

impl Default for FreeTierLimits {
    fn default() -> Self {
        FreeTierLimits {
            playlists: FREE_USER_PLAYLIST_LIMIT,
            uploads: FREE_USER_SONG_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LimitError {
    #[error("Free users can only create up to {0} playlists. Upgrade to Premium for unlimited playlists!")]
    PlaylistLimitReached(usize),
    #[error("Free users can only upload up to {0} songs.")]
    UploadLimitReached(usize),
}

pub fn check_playlist_limit(is_premium: bool, count: usize, limit: usize) -> Result<(), LimitError> {
    if !is_premium && count >= limit {
        return Err(LimitError::PlaylistLimitReached(limit));
    }
    Ok(())
}

pub fn check_upload_limit(is_premium: bool, count: usize, limit: usize) -> Result<(), LimitError> {
    if !is_premium && count >= limit {
        return Err(LimitError::UploadLimitReached(limit));
    }
    Ok(())
}

/// What the mobile premium check reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumStatus {
    pub is_premium: bool,
    pub user_id: String,
    pub email: String,
    pub has_active_subscription: bool,
    pub customer_id: Option<String>,
}

impl PremiumStatus {
    /// A user holding a subscription id counts as premium even if the flag lags behind
    /// a webhook that hasn't arrived yet.
    pub fn from_user(user: &User) -> PremiumStatus {
        let has_active_subscription = user.stripe_subscription_id.is_some();
        PremiumStatus {
            is_premium: user.is_premium || has_active_subscription,
            user_id: user.id.clone(),
            email: user.email.clone(),
            has_active_subscription,
            customer_id: user.stripe_customer_id.clone(),
        }
    }
}
