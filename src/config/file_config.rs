use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub uploads_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub public_url: Option<String>,
    pub session_max_age_days: Option<u64>,
    pub session_prune_interval_hours: Option<u64>,
    pub max_upload_mb: Option<usize>,

    // Feature configs
    pub jwt: Option<JwtConfig>,
    pub stripe: Option<StripeConfig>,
    pub youtube: Option<YoutubeConfig>,
    pub mixcloud: Option<MixcloudConfig>,
    pub google: Option<GoogleConfig>,
    pub admin: Option<AdminConfig>,
    pub limits: Option<LimitsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: Option<String>,
    pub refresh_secret: Option<String>,
    pub access_ttl_secs: Option<u64>,
    pub refresh_ttl_secs: Option<u64>,
    pub long_term_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub price_id: Option<String>,
    pub api_base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct YoutubeConfig {
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MixcloudConfig {
    pub api_base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AdminConfig {
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LimitsConfig {
    pub free_playlists: Option<usize>,
    pub free_uploads: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
port = 4000
logging_level = "headers"

[jwt]
secret = "from-toml"

[stripe]
secret_key = "sk_test_1"
price_id = "price_1"

[limits]
free_playlists = 5
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.port, Some(4000));
        assert_eq!(config.logging_level.as_deref(), Some("headers"));
        assert_eq!(config.jwt.unwrap().secret.as_deref(), Some("from-toml"));
        let stripe = config.stripe.unwrap();
        assert_eq!(stripe.secret_key.as_deref(), Some("sk_test_1"));
        assert!(stripe.webhook_secret.is_none());
        assert_eq!(config.limits.unwrap().free_playlists, Some(5));
        assert!(config.db_dir.is_none());
        assert!(config.google.is_none());
    }

    #[test]
    fn reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();
        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = FileConfig::load(Path::new("/nonexistent/karaoke.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
