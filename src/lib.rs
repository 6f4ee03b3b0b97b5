//! Karaoke Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod billing;
pub mod config;
pub mod oidc;
pub mod player;
pub mod search;
pub mod server;
pub mod sqlite_persistence;
pub mod user;

// Re-export commonly used types for convenience
pub use server::{make_app, run_server, ExternalServices, RequestsLoggingLevel};
pub use user::{FullUserStore, SqliteUserStore, UserManager};
