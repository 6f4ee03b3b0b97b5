mod admin_routes;
mod auth_routes;
mod billing_routes;
pub mod errors;
mod http_layers;
pub mod metrics;
mod mobile_routes;
mod playlist_routes;
mod search_routes;
pub mod server;
pub mod session;
mod song_routes;
pub mod state;
mod user_routes;

pub use admin_routes::ADMIN_API_KEY_HEADER;
pub use billing_routes::STRIPE_SIGNATURE_HEADER;
pub use errors::{ApiError, ApiResult};
pub use http_layers::*;
#[allow(unused_imports)] // Used by main.rs
pub use server::{make_app, run_server};
pub use state::{ExternalServices, ServerState};
