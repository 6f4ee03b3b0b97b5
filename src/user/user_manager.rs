use super::{
    premium::{check_playlist_limit, check_upload_limit, FreeTierLimits},
    AuthToken, AuthTokenValue, FullUserStore, Playlist, User, UsernamePasswordCredentials,
};
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Name, email and password are required")]
    MissingFields,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Username already taken")]
    NameTaken,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

pub struct UserManager {
    store: Arc<dyn FullUserStore>,
    session_max_age: Duration,
    limits: FreeTierLimits,
}

impl UserManager {
    pub fn new(
        store: Arc<dyn FullUserStore>,
        session_max_age: Duration,
        limits: FreeTierLimits,
    ) -> Self {
        Self {
            store,
            session_max_age,
            limits,
        }
    }

    pub fn store(&self) -> &dyn FullUserStore {
        self.store.as_ref()
    }

    pub fn session_max_age(&self) -> Duration {
        self.session_max_age
    }

    /// Loads a user that is expected to exist, failing otherwise.
    pub fn require_user(&self, user_id: &str) -> Result<User> {
        self.store
            .get_user(user_id)?
            .with_context(|| format!("User {} not found", user_id))
    }

    /// Creates a user with password credentials.
    ///
    /// Validation failures are returned as [`RegistrationError`] inside the `anyhow::Error`.
    pub fn register_user(&self, name: &str, email: &str, password: &str) -> Result<User> {
        let (name, email) = (name.trim(), email.trim());
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(RegistrationError::MissingFields.into());
        }
        if !is_valid_email(email) {
            return Err(RegistrationError::InvalidEmail.into());
        }
        if self.store.get_user_by_email(email)?.is_some() {
            return Err(RegistrationError::EmailTaken.into());
        }
        if self.store.get_user_by_name(name)?.is_some() {
            return Err(RegistrationError::NameTaken.into());
        }

        let user_id = self.store.create_user(Some(name), email)?;
        let credentials = UsernamePasswordCredentials::create(&user_id, password)?;
        self.store.update_password_credentials(&credentials)?;
        info!("Registered user {}", user_id);
        self.require_user(&user_id)
    }

    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(user) = self.store.get_user_by_email(email.trim())? else {
            debug!("No user with email {}", email);
            return Ok(None);
        };
        let Some(credentials) = self.store.get_password_credentials(&user.id)? else {
            debug!("User {} has no password credentials", user.id);
            return Ok(None);
        };
        let valid = credentials.verify(password)?;
        if let Err(err) = self.store.record_password_attempt(&user.id, valid) {
            warn!("Failed to record login attempt for {}: {}", user.id, err);
        }
        Ok(valid.then_some(user))
    }

    /// Finds the user signing in through an identity provider, creating it on first sign in
    /// and keeping its display name in sync afterwards.
    pub fn find_or_create_oauth_user(&self, email: &str, name: &str) -> Result<User> {
        match self.store.get_user_by_email(email)? {
            Some(user) if user.name.as_deref() != Some(name) => self
                .store
                .update_user(&user.id, Some(name), None)?
                .with_context(|| format!("User {} vanished while updating", user.id)),
            Some(user) => Ok(user),
            None => {
                let user_id = self.store.create_user(Some(name), email)?;
                info!("Created user {} from identity provider sign in", user_id);
                self.require_user(&user_id)
            }
        }
    }

    pub fn create_session(&self, user_id: &str) -> Result<AuthToken> {
        let token = AuthToken::new(user_id, self.session_max_age);
        self.store.add_user_auth_token(&token)?;
        Ok(token)
    }

    /// Resolves a live session token into its user. Expired tokens are deleted.
    pub fn get_session_user(&self, value: &AuthTokenValue) -> Result<Option<(AuthToken, User)>> {
        let Some(token) = self.store.get_user_auth_token(value)? else {
            return Ok(None);
        };
        if token.is_expired() {
            debug!("Session of user {} expired", token.user_id);
            self.store.delete_user_auth_token(value)?;
            return Ok(None);
        }
        if let Err(err) = self.store.update_user_auth_token_last_used_timestamp(value) {
            debug!("Failed to update auth token last_used timestamp: {}", err);
        }
        Ok(self.store.get_user(&token.user_id)?.map(|user| (token, user)))
    }

    /// Pushes the session expiry to a full max-age from now.
    pub fn extend_session(&self, value: &AuthTokenValue) -> Result<Option<SystemTime>> {
        let expires = SystemTime::now() + self.session_max_age;
        Ok(self
            .store
            .extend_user_auth_token(value, expires)?
            .then_some(expires))
    }

    pub fn delete_session(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        self.store.delete_user_auth_token(value)
    }

    /// Drops web sessions past their expiry, returning how many were removed.
    pub fn prune_expired_sessions(&self) -> Result<usize> {
        self.store.prune_expired_auth_tokens()
    }

    /// Creates a playlist, enforcing the free tier limit on the given (freshly loaded) user.
    pub fn create_playlist_checked(
        &self,
        user: &User,
        name: &str,
        description: Option<&str>,
    ) -> Result<Playlist> {
        let count = self.store.count_user_playlists(&user.id)?;
        check_playlist_limit(user.is_premium, count, self.limits.playlists)?;
        self.store.create_playlist(&user.id, name, description)
    }

    pub fn ensure_upload_allowed(&self, user: &User) -> Result<()> {
        let count = self.store.count_local_songs(&user.id)?;
        check_upload_limit(user.is_premium, count, self.limits.uploads)?;
        Ok(())
    }
}
