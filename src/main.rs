use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt::Debug, path::PathBuf};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use karaoke_server::config::{AppConfig, CliConfig, FileConfig};
use karaoke_server::server::metrics;
use karaoke_server::{
    run_server, ExternalServices, RequestsLoggingLevel, SqliteUserStore, UserManager,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the SQLite database.
    #[clap(long, env = "DB_DIR", value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Directory where uploaded audio files are stored. Defaults to `<db_dir>/uploads`.
    #[clap(long, env = "UPLOADS_DIR", value_parser = parse_path)]
    pub uploads_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Public base URL, used for checkout and OAuth redirects.
    #[clap(long, env = "PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Interval in hours between expired session pruning runs. Set to 0 to disable pruning.
    #[clap(long, default_value_t = 1)]
    pub session_prune_interval_hours: u64,

    #[clap(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    #[clap(long, env = "REFRESH_TOKEN_SECRET", hide_env_values = true)]
    pub refresh_token_secret: Option<String>,

    #[clap(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    pub stripe_secret_key: Option<String>,

    #[clap(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    pub stripe_webhook_secret: Option<String>,

    #[clap(long, env = "STRIPE_PRICE_ID")]
    pub stripe_price_id: Option<String>,

    #[clap(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub youtube_api_key: Option<String>,

    /// Key expected in the `x-admin-api-key` header. Admin routes are disabled without it.
    #[clap(long, env = "ADMIN_API_KEY", hide_env_values = true)]
    pub admin_api_key: Option<String>,

    #[clap(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    #[clap(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: Option<String>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            uploads_dir: self.uploads_dir.clone(),
            port: self.port,
            logging_level: self.logging_level.clone(),
            public_url: self.public_url.clone(),
            session_prune_interval_hours: self.session_prune_interval_hours,
            jwt_secret: self.jwt_secret.clone(),
            refresh_token_secret: self.refresh_token_secret.clone(),
            stripe_secret_key: self.stripe_secret_key.clone(),
            stripe_webhook_secret: self.stripe_webhook_secret.clone(),
            stripe_price_id: self.stripe_price_id.clone(),
            youtube_api_key: self.youtube_api_key.clone(),
            admin_api_key: self.admin_api_key.clone(),
            google_client_id: self.google_client_id.clone(),
            google_client_secret: self.google_client_secret.clone(),
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down..."),
        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize tracing")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Opening SQLite database at {:?}...", config.user_db_path());
    let user_store = Arc::new(SqliteUserStore::new(config.user_db_path())?);

    if config.session_prune_interval_hours > 0 {
        let interval_hours = config.session_prune_interval_hours;
        let pruning_manager =
            UserManager::new(user_store.clone(), config.session_max_age, config.limits);

        info!(
            "Session pruning enabled: pruning every {} hours",
            interval_hours
        );

        tokio::spawn(async move {
            let interval = Duration::from_secs(interval_hours * 60 * 60);
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;

                match pruning_manager.prune_expired_sessions() {
                    Ok(count) => {
                        if count > 0 {
                            info!("Pruned {} expired sessions", count);
                        }
                    }
                    Err(e) => {
                        error!("Failed to prune expired sessions: {}", e);
                    }
                }
            }
        });
    } else {
        warn!("Session pruning is disabled");
    }

    let services = ExternalServices::from_config(&config).await?;

    info!("Ready to serve at port {}!", config.port);
    run_server(config, user_store, services, shutdown_signal()).await
}
