mod file_config;

pub use file_config::{
    AdminConfig, FileConfig, GoogleConfig, JwtConfig, LimitsConfig, MixcloudConfig, StripeConfig,
    YoutubeConfig,
};

use crate::server::RequestsLoggingLevel;
use crate::user::{FreeTierLimits, JwtSettings};
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";
pub const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com/v1";
pub const DEFAULT_YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_MIXCLOUD_API_URL: &str = "https://api.mixcloud.com";
pub const GOOGLE_ISSUER_URL: &str = "https://accounts.google.com";
pub const DEFAULT_SESSION_MAX_AGE_DAYS: u64 = 30;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 50;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub uploads_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub public_url: Option<String>,
    pub session_prune_interval_hours: u64,
    pub jwt_secret: Option<String>,
    pub refresh_token_secret: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_price_id: Option<String>,
    pub youtube_api_key: Option<String>,
    pub admin_api_key: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub public_url: String,
    pub session_max_age: Duration,
    pub session_prune_interval_hours: u64,
    pub max_upload_bytes: usize,
    pub admin_api_key: Option<String>,
    pub limits: FreeTierLimits,

    // Auth
    pub jwt: JwtSettings,
    pub google: Option<OidcSettings>,

    // Third parties
    pub stripe: Option<StripeSettings>,
    pub youtube: YoutubeSettings,
    pub mixcloud_api_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_id: String,
    pub api_base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YoutubeSettings {
    pub api_key: Option<String>,
    pub api_base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OidcSettings {
    pub provider_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| anyhow!("db_dir must be specified via --db-dir or in config file"))?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let uploads_dir = file
            .uploads_dir
            .map(PathBuf::from)
            .or_else(|| cli.uploads_dir.clone())
            .unwrap_or_else(|| db_dir.join("uploads"));

        let port = file.port.unwrap_or(cli.port);
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());
        let public_url = file
            .public_url
            .or_else(|| cli.public_url.clone())
            .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let session_max_age = Duration::from_secs(
            file.session_max_age_days
                .unwrap_or(DEFAULT_SESSION_MAX_AGE_DAYS)
                * 24
                * 60
                * 60,
        );
        let session_prune_interval_hours = file
            .session_prune_interval_hours
            .unwrap_or(cli.session_prune_interval_hours);
        let max_upload_bytes = file.max_upload_mb.unwrap_or(DEFAULT_MAX_UPLOAD_MB) * 1024 * 1024;

        let jwt = resolve_jwt(cli, file.jwt.unwrap_or_default())?;
        let stripe = resolve_stripe(cli, file.stripe.unwrap_or_default())?;
        let google = resolve_google(cli, file.google.unwrap_or_default(), &public_url)?;

        let youtube_file = file.youtube.unwrap_or_default();
        let youtube = YoutubeSettings {
            api_key: youtube_file
                .api_key
                .or_else(|| cli.youtube_api_key.clone()),
            api_base_url: youtube_file
                .api_base_url
                .unwrap_or_else(|| DEFAULT_YOUTUBE_API_URL.to_string()),
        };
        let mixcloud_api_url = file
            .mixcloud
            .and_then(|m| m.api_base_url)
            .unwrap_or_else(|| DEFAULT_MIXCLOUD_API_URL.to_string());

        let admin_api_key = file
            .admin
            .and_then(|a| a.api_key)
            .or_else(|| cli.admin_api_key.clone());

        let limits_file = file.limits.unwrap_or_default();
        let defaults = FreeTierLimits::default();
        let limits = FreeTierLimits {
            playlists: limits_file.free_playlists.unwrap_or(defaults.playlists),
            uploads: limits_file.free_uploads.unwrap_or(defaults.uploads),
        };

        Ok(Self {
            db_dir,
            uploads_dir,
            port,
            logging_level,
            public_url,
            session_max_age,
            session_prune_interval_hours,
            max_upload_bytes,
            admin_api_key,
            limits,
            jwt,
            google,
            stripe,
            youtube,
            mixcloud_api_url,
        })
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join("karaoke.db")
    }
}

fn resolve_jwt(cli: &CliConfig, file: JwtConfig) -> Result<JwtSettings> {
    let secret = file
        .secret
        .or_else(|| cli.jwt_secret.clone())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            anyhow!("A JWT secret must be specified via --jwt-secret, JWT_SECRET or [jwt] in config file")
        })?;
    let refresh_secret = file
        .refresh_secret
        .or_else(|| cli.refresh_token_secret.clone());

    let mut settings = JwtSettings::with_secrets(secret, refresh_secret);
    if let Some(secs) = file.access_ttl_secs {
        settings.access_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = file.refresh_ttl_secs {
        settings.refresh_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = file.long_term_ttl_secs {
        settings.long_term_ttl = Duration::from_secs(secs);
    }
    Ok(settings)
}

fn resolve_stripe(cli: &CliConfig, file: StripeConfig) -> Result<Option<StripeSettings>> {
    let Some(secret_key) = file
        .secret_key
        .or_else(|| cli.stripe_secret_key.clone())
    else {
        return Ok(None);
    };
    let webhook_secret = file
        .webhook_secret
        .or_else(|| cli.stripe_webhook_secret.clone())
        .ok_or_else(|| anyhow!("Stripe webhook secret is required when Stripe is enabled"))?;
    let price_id = file
        .price_id
        .or_else(|| cli.stripe_price_id.clone())
        .ok_or_else(|| anyhow!("Stripe price id is required when Stripe is enabled"))?;
    Ok(Some(StripeSettings {
        secret_key,
        webhook_secret,
        price_id,
        api_base_url: file
            .api_base_url
            .unwrap_or_else(|| DEFAULT_STRIPE_API_URL.to_string()),
    }))
}

fn resolve_google(
    cli: &CliConfig,
    file: GoogleConfig,
    public_url: &str,
) -> Result<Option<OidcSettings>> {
    let client_id = file.client_id.or_else(|| cli.google_client_id.clone());
    let client_secret = file
        .client_secret
        .or_else(|| cli.google_client_secret.clone());
    match (client_id, client_secret) {
        (Some(client_id), Some(client_secret)) => Ok(Some(OidcSettings {
            provider_url: GOOGLE_ISSUER_URL.to_string(),
            client_id,
            client_secret,
            redirect_uri: format!("{}/api/auth/oidc/callback", public_url),
            scopes: vec!["email".to_string(), "profile".to_string()],
        })),
        (None, None) => Ok(None),
        _ => bail!("Both the Google client id and client secret must be provided together"),
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
