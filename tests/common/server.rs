//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own database and uploads directory.

use super::constants::*;
use super::fakes::{FakeShowSearch, FakeStripe, FakeVideoSearch};
use super::fixtures::create_test_db_with_users;
use karaoke_server::billing::StripeGateway;
use karaoke_server::config::{AppConfig, CliConfig};
use karaoke_server::server::{make_app, ExternalServices, RequestsLoggingLevel};
use karaoke_server::user::{FullUserStore, SqliteUserStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with an isolated database
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// User store for direct database access in tests
    pub user_store: Arc<dyn FullUserStore>,

    /// The fake payment provider, to inspect what the server asked of it
    pub stripe: Arc<FakeStripe>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// This function:
    /// 1. Creates a temporary database with test users
    /// 2. Wires fake Stripe, YouTube and Mixcloud backends
    /// 3. Binds to a random port (127.0.0.1:0)
    /// 4. Spawns the server in a background task
    /// 5. Waits for the server to be ready
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - Database creation fails
    /// - Port binding fails
    /// - Server fails to start
    /// - Server doesn't become ready within timeout
    pub async fn spawn() -> Self {
        let temp_db_dir = create_test_db_with_users().expect("Failed to create test database");

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let cli = CliConfig {
            db_dir: Some(temp_db_dir.path().to_path_buf()),
            port,
            logging_level: RequestsLoggingLevel::None,
            public_url: Some(base_url.clone()),
            jwt_secret: Some(JWT_SECRET.to_string()),
            stripe_secret_key: Some("sk_test_e2e".to_string()),
            stripe_webhook_secret: Some(STRIPE_WEBHOOK_SECRET.to_string()),
            stripe_price_id: Some("price_e2e".to_string()),
            admin_api_key: Some(ADMIN_API_KEY.to_string()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).expect("Failed to resolve config");

        let user_store: Arc<dyn FullUserStore> = Arc::new(
            SqliteUserStore::new(config.user_db_path()).expect("Failed to open user store"),
        );
        let user_store_for_test = user_store.clone();

        let stripe = Arc::new(FakeStripe::default());
        let services = ExternalServices {
            stripe: Some(stripe.clone() as Arc<dyn StripeGateway>),
            youtube: Arc::new(FakeVideoSearch),
            mixcloud: Arc::new(FakeShowSearch),
            oidc_client: None,
        };

        let app = make_app(config, user_store, services).expect("Failed to build app");

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("Server failed");
        });

        // Wait for server to be ready
        let server = Self {
            base_url,
            port,
            user_store: user_store_for_test,
            stripe,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Looks up a user id by email, straight from the database
    pub fn user_id(&self, email: &str) -> String {
        self.user_store
            .get_user_by_email(email)
            .expect("Failed to query user")
            .expect("User not found")
            .id
    }

    /// Waits for the server to become ready by polling the / endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    // Server is ready
                    return;
                }
                _ => {
                    // Server not ready yet, wait and retry
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir will be cleaned up automatically
    }
}
