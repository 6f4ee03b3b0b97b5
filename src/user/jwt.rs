//! Bearer tokens for mobile clients.
//!
//! Access tokens carry the user's premium flag as a convenience for clients, but the
//! server never grants anything based on that claim: every handler reloads the user.
//! Refresh tokens carry the user's `token_version`, so bumping the version in the
//! database revokes all outstanding refresh tokens.

use anyhow::{Context, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::User;

pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const LONG_TERM_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct JwtSettings {
    pub secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub long_term_ttl: Duration,
}

impl JwtSettings {
    /// Settings with the default lifetimes; the refresh secret falls back to `<secret>_refresh`.
    pub fn with_secrets(secret: String, refresh_secret: Option<String>) -> JwtSettings {
        let refresh_secret = refresh_secret.unwrap_or_else(|| format!("{}_refresh", secret));
        JwtSettings {
            secret,
            refresh_secret,
            access_ttl: ACCESS_TOKEN_TTL,
            refresh_ttl: REFRESH_TOKEN_TTL,
            long_term_ttl: LONG_TERM_TOKEN_TTL,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub user_id: String,
    pub email: String,
    pub is_premium: bool,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshClaims {
    pub user_id: String,
    pub token_version: i64,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct JwtIssuer {
    settings: JwtSettings,
    header: Header,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    refresh_encoding_key: EncodingKey,
    refresh_decoding_key: DecodingKey,
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

impl JwtIssuer {
    pub fn new(settings: JwtSettings) -> JwtIssuer {
        JwtIssuer {
            header: Header::new(Algorithm::HS256),
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            refresh_encoding_key: EncodingKey::from_secret(settings.refresh_secret.as_bytes()),
            refresh_decoding_key: DecodingKey::from_secret(settings.refresh_secret.as_bytes()),
            settings,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation
    }

    fn access_claims(&self, user: &User, ttl: Duration) -> AccessClaims {
        let iat = now_secs();
        AccessClaims {
            user_id: user.id.clone(),
            email: user.email.clone(),
            is_premium: user.is_premium,
            iat,
            exp: iat + ttl.as_secs(),
        }
    }

    pub fn issue_access_token(&self, user: &User) -> Result<String> {
        let claims = self.access_claims(user, self.settings.access_ttl);
        encode(&self.header, &claims, &self.encoding_key).context("Failed to sign access token")
    }

    /// Access token used by clients that can't refresh, such as the mobile register flow.
    pub fn issue_long_term_token(&self, user: &User) -> Result<String> {
        let claims = self.access_claims(user, self.settings.long_term_ttl);
        encode(&self.header, &claims, &self.encoding_key).context("Failed to sign access token")
    }

    pub fn issue_refresh_token(&self, user: &User) -> Result<String> {
        let iat = now_secs();
        let claims = RefreshClaims {
            user_id: user.id.clone(),
            token_version: user.token_version,
            iat,
            exp: iat + self.settings.refresh_ttl.as_secs(),
        };
        encode(&self.header, &claims, &self.refresh_encoding_key)
            .context("Failed to sign refresh token")
    }

    pub fn issue_token_pair(&self, user: &User) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user)?,
            refresh_token: self.issue_refresh_token(user)?,
        })
    }

    pub fn verify_access_token(&self, token: &str) -> Option<AccessClaims> {
        match decode::<AccessClaims>(token, &self.decoding_key, &self.validation()) {
            Ok(data) => Some(data.claims),
            Err(err) => {
                debug!("Rejected access token: {}", err);
                None
            }
        }
    }

    pub fn verify_refresh_token(&self, token: &str) -> Option<RefreshClaims> {
        match decode::<RefreshClaims>(token, &self.refresh_decoding_key, &self.validation()) {
            Ok(data) => Some(data.claims),
            Err(err) => {
                debug!("Rejected refresh token: {}", err);
                None
            }
        }
    }
}
