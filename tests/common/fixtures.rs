//! Test fixture creation for the database

use super::constants::*;
use anyhow::Result;
use karaoke_server::user::{
    FreeTierLimits, SqliteUserStore, UserManager, UserStore, DEFAULT_SESSION_MAX_AGE,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Creates a temporary database directory with a free and a premium user.
///
/// Returns the temp dir, which doubles as the server's `db_dir`.
pub fn create_test_db_with_users() -> Result<TempDir> {
    let dir = TempDir::new()?;
    let store = Arc::new(SqliteUserStore::new(dir.path().join("karaoke.db"))?);
    let user_manager = UserManager::new(
        store.clone(),
        DEFAULT_SESSION_MAX_AGE,
        FreeTierLimits::default(),
    );

    user_manager.register_user(TEST_USER, TEST_EMAIL, TEST_PASS)?;

    let premium = user_manager.register_user(PREMIUM_USER, PREMIUM_EMAIL, PREMIUM_PASS)?;
    store.set_user_premium(&premium.id, true)?;

    Ok(dir)
}
