use anyhow::{Context, Result};
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{DefaultBodyLimit, State},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::services::ServeDir;
use tracing::info;

#[cfg(feature = "slowdown")]
use super::slowdown_request;
use super::{
    admin_routes::make_admin_routes, auth_routes::make_auth_routes,
    billing_routes::make_billing_routes, log_requests, metrics::metrics_handler,
    mobile_routes::make_mobile_routes, playlist_routes::make_playlist_routes,
    search_routes::make_search_routes, song_routes::make_song_routes,
    state::{ExternalServices, ServerState},
    user_routes::{make_library_routes, make_user_routes},
};
use crate::config::AppConfig;
use crate::user::FullUserStore;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

pub fn make_app(
    config: AppConfig,
    user_store: Arc<dyn FullUserStore>,
    services: ExternalServices,
) -> Result<Router> {
    std::fs::create_dir_all(&config.uploads_dir).with_context(|| {
        format!("Failed to create uploads directory {:?}", config.uploads_dir)
    })?;
    let uploads_dir = config.uploads_dir.clone();
    let max_upload_bytes = config.max_upload_bytes;
    let state = ServerState::new(config, user_store, services);

    let song_routes = make_song_routes(state.clone()).layer(DefaultBodyLimit::max(max_upload_bytes));
    let api_routes: Router = Router::new()
        .merge(make_billing_routes(state.clone()))
        .merge(make_admin_routes(state.clone()))
        .merge(make_search_routes(state.clone()));

    let home_router: Router = Router::new()
        .route("/", get(home))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone());

    let mut app: Router = home_router
        .nest("/api/auth", make_auth_routes(state.clone()))
        .nest("/api/mobile", make_mobile_routes(state.clone()))
        .nest("/api/playlists", make_playlist_routes(state.clone()))
        .nest("/api/songs", song_routes)
        .nest("/api/users", make_user_routes(state.clone()))
        .nest("/api/library", make_library_routes(state.clone()))
        .nest("/api", api_routes)
        .nest_service("/uploads", ServeDir::new(uploads_dir));

    #[cfg(feature = "slowdown")]
    {
        app = app.layer(middleware::from_fn(slowdown_request));
    }
    app = app.layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

pub async fn run_server<F>(
    config: AppConfig,
    user_store: Arc<dyn FullUserStore>,
    services: ExternalServices,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let port = config.port;
    let app = make_app(config, user_store, services)?;

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}
