use anyhow::Result;
use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::billing::{StripeClient, StripeGateway};
use crate::config::AppConfig;
use crate::oidc::{AuthStateStore, OidcClient};
use crate::search::{MixcloudClient, ShowSearch, VideoSearch, YoutubeClient};
use crate::user::{FullUserStore, JwtIssuer, UserManager};

pub type GuardedConfig = Arc<AppConfig>;
pub type GuardedUserManager = Arc<UserManager>;
pub type GuardedJwtIssuer = Arc<JwtIssuer>;
pub type OptionalStripeGateway = Option<Arc<dyn StripeGateway>>;
pub type GuardedVideoSearch = Arc<dyn VideoSearch>;
pub type GuardedShowSearch = Arc<dyn ShowSearch>;
pub type OptionalOidcClient = Option<Arc<OidcClient>>;
pub type GuardedAuthStateStore = Arc<AuthStateStore>;

/// Clients of third-party services, built once at startup.
#[derive(Clone)]
pub struct ExternalServices {
    pub stripe: OptionalStripeGateway,
    pub youtube: GuardedVideoSearch,
    pub mixcloud: GuardedShowSearch,
    pub oidc_client: OptionalOidcClient,
}

impl ExternalServices {
    pub async fn from_config(config: &AppConfig) -> Result<ExternalServices> {
        let stripe: OptionalStripeGateway = match &config.stripe {
            Some(settings) => Some(Arc::new(StripeClient::new(settings, &config.public_url)?)),
            None => {
                info!("Stripe is not configured, payments are disabled");
                None
            }
        };
        if config.youtube.api_key.is_none() {
            warn!("YouTube API key is not configured, YouTube search will fail");
        }

        let oidc_client = match &config.google {
            Some(settings) => match OidcClient::new(settings).await {
                Ok(client) => Some(Arc::new(client)),
                Err(err) => {
                    warn!("Google sign-in disabled: {:#}", err);
                    None
                }
            },
            None => None,
        };

        Ok(ExternalServices {
            stripe,
            youtube: Arc::new(YoutubeClient::new(&config.youtube)?),
            mixcloud: Arc::new(MixcloudClient::new(&config.mixcloud_api_url)?),
            oidc_client,
        })
    }
}

#[derive(Clone)]
pub struct ServerState {
    pub config: GuardedConfig,
    pub start_time: Instant,
    pub user_manager: GuardedUserManager,
    pub jwt: GuardedJwtIssuer,
    pub stripe: OptionalStripeGateway,
    pub youtube: GuardedVideoSearch,
    pub mixcloud: GuardedShowSearch,
    pub oidc_client: OptionalOidcClient,
    pub auth_state_store: GuardedAuthStateStore,
    pub hash: String,
}

impl ServerState {
    pub fn new(
        config: AppConfig,
        user_store: Arc<dyn FullUserStore>,
        services: ExternalServices,
    ) -> ServerState {
        let user_manager =
            UserManager::new(user_store, config.session_max_age, config.limits);
        ServerState {
            jwt: Arc::new(JwtIssuer::new(config.jwt.clone())),
            config: Arc::new(config),
            start_time: Instant::now(),
            user_manager: Arc::new(user_manager),
            stripe: services.stripe,
            youtube: services.youtube,
            mixcloud: services.mixcloud,
            oidc_client: services.oidc_client,
            auth_state_store: Arc::new(AuthStateStore::new()),
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

impl FromRef<ServerState> for GuardedConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedUserManager {
    fn from_ref(input: &ServerState) -> Self {
        input.user_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedJwtIssuer {
    fn from_ref(input: &ServerState) -> Self {
        input.jwt.clone()
    }
}

impl FromRef<ServerState> for OptionalStripeGateway {
    fn from_ref(input: &ServerState) -> Self {
        input.stripe.clone()
    }
}

impl FromRef<ServerState> for GuardedVideoSearch {
    fn from_ref(input: &ServerState) -> Self {
        input.youtube.clone()
    }
}

impl FromRef<ServerState> for GuardedShowSearch {
    fn from_ref(input: &ServerState) -> Self {
        input.mixcloud.clone()
    }
}

impl FromRef<ServerState> for OptionalOidcClient {
    fn from_ref(input: &ServerState) -> Self {
        input.oidc_client.clone()
    }
}

impl FromRef<ServerState> for GuardedAuthStateStore {
    fn from_ref(input: &ServerState) -> Self {
        input.auth_state_store.clone()
    }
}
